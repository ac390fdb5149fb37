use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// CORS for the quiz frontend: JSON bodies and bearer tokens from any origin.
pub fn quiz_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}
