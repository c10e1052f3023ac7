pub mod prelude;

pub mod messages;
