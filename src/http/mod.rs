//! Token server
//!
//! Keeps the long-lived API key on the server and hands clients ephemeral
//! realtime credentials instead:
//! - GET|POST /api/realtime-token - Create an upstream session, return its secret
//! - POST /api/validate-key - Check an API key upstream
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::{create_router, origin_matches};
pub use state::AppState;
