pub mod auth;

pub use auth::{ApiKeyAuth, AuthGate, API_KEY_HEADER};
