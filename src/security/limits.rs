//! Request body size limit.
//!
//! # Design Decisions
//! - A declared `Content-Length` over the limit is rejected before any
//!   handler runs
//! - Bodies without a declared length are capped while they stream; the
//!   overflow surfaces as a [`LengthLimitError`] wherever the body is read
//! - Rejections use the uniform error body, so they carry the correlation id

use std::error::Error;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{LengthLimitError, Limited};

use crate::http::error::ApiError;

/// Maximum request body size in bytes.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

pub async fn body_limit_middleware(
    State(BodyLimit(limit)): State<BodyLimit>,
    request: Request,
    next: Next,
) -> Response {
    if declared_length(&request).is_some_and(|length| length > limit as u64) {
        return ApiError::PayloadTooLarge { limit }.into_response();
    }

    let request = request.map(|body| Body::new(Limited::new(body, limit)));
    next.run(request).await
}

fn declared_length(request: &Request) -> Option<u64> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Whether `error`, or anything in its source chain, is a body overflow.
pub fn exceeded_limit(error: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(error), |e: &&(dyn Error + 'static)| (*e).source()).any(|e| e.is::<LengthLimitError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::post, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn read_body(body: Body) -> StatusCode {
        match axum::body::to_bytes(body, usize::MAX).await {
            Ok(_) => StatusCode::OK,
            Err(e) if exceeded_limit(&e) => StatusCode::PAYLOAD_TOO_LARGE,
            Err(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn app(limit: usize) -> Router {
        Router::new()
            .route("/upload", post(read_body))
            .layer(middleware::from_fn_with_state(BodyLimit(limit), body_limit_middleware))
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected() {
        let response = app(8)
            .oneshot(
                axum::http::Request::post("/upload")
                    .header(header::CONTENT_LENGTH, "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_undeclared_body_is_capped_while_streaming() {
        let response = app(8)
            .oneshot(axum::http::Request::post("/upload").body(Body::from(vec![b'x'; 64])).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = app(8)
            .oneshot(axum::http::Request::post("/upload").body(Body::from("small")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
