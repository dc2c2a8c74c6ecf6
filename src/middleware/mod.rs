pub mod auth;

pub use auth::{Authentication, JwtKeys};
