//! Inference gateway for recommendation models.
//!
//! Serves ranked item recommendations over HTTP from a hot-reloadable model.
//! Requests pass an optional API key gate, are validated and clamped, then ranked
//! against the currently published model snapshot.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use services::GatewayService;
