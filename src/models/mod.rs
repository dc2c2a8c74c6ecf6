pub mod account;
pub mod admin;
pub mod notification;
pub mod rental;
pub mod review;
pub mod settings;
pub mod user;
pub mod vehicle;
