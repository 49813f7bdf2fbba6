pub mod customers;
pub mod interactions;
pub mod subscriptions;
pub mod users;
pub mod videos;
