//! Application services layer.

pub mod auth;
pub mod error;
pub mod repos;
pub mod tasks;
pub mod users;
