//! CORS layer built from the security config.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::SecurityConfig;
use crate::observability::correlation::CORRELATION_ID_HEADER;

/// Build the CORS layer. `"*"` among the origins allows any origin.
pub fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let methods: Vec<Method> = config
        .cors_allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .collect();

    let origin = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .cors_allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(CORRELATION_ID_HEADER)])
}
