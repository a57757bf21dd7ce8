pub use super::subscriptions::Entity as Subscriptions;
pub use super::users::Entity as Users;
