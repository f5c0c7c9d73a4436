//! Axum HTTP API: the surface chat relays and the web frontend call.

mod server;
pub mod types;

pub use server::{ApiState, start_server};
