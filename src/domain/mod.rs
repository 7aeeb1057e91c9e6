//! Domain layer: pure business logic and models.

pub mod errors;
pub mod models;
pub mod ports;
