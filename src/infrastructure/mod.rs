pub mod database;
pub mod staging;
pub mod translator;
