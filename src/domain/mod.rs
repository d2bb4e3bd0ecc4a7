//! Domain layer types and invariants.

pub mod travel_data;
pub mod upload_sessions;
pub mod users;
