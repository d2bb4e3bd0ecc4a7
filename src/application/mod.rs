//! Application services layer.

pub mod auth;
pub mod error;
pub mod pagination;
pub mod repos;
pub mod travel_data;
pub mod upload_sessions;
