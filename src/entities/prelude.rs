pub use super::messages::Entity as Messages;
