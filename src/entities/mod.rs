pub mod prelude;

pub mod subscriptions;
pub mod users;
