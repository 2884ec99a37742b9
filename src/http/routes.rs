use super::handlers;
use super::state::AppState;
use crate::config::CorsConfig;
use axum::{
    http::{request::Parts, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let api = Router::new()
        .route(
            "/api/realtime-token",
            get(handlers::realtime_token).post(handlers::realtime_token),
        )
        .route("/api/validate-key", post(handlers::validate_key))
        .layer(cors_layer(cors));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .merge(api)
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    // Entries may themselves be comma lists when set from the environment
    let patterns: Vec<String> = cors
        .allowed_origins
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _: &Parts| {
                origin
                    .to_str()
                    .map(|origin| patterns.iter().any(|p| origin_matches(p, origin)))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Match an origin against a pattern where `*` stands for any run of characters
pub fn origin_matches(pattern: &str, origin: &str) -> bool {
    let mut pieces = pattern.split('*');
    let head = pieces.next().unwrap_or_default();
    let Some(mut rest) = origin.strip_prefix(head) else {
        return false;
    };

    let pieces: Vec<&str> = pieces.collect();
    let Some((tail, middle)) = pieces.split_last() else {
        // No wildcard
        return rest.is_empty();
    };

    for piece in middle {
        match rest.find(piece) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }
    rest.ends_with(tail)
}
