pub mod auth;
pub mod dashboard;
pub mod files;
pub mod notifications;
pub mod profile;
pub mod rentals;
pub mod reviews;
pub mod settings;
pub mod users;
pub mod vehicles;
