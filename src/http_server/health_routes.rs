//! # Health Routes
//!
//! `GET /healthz` for install verifiers, load balancers and autoscalers.
//! Served from its own listener and never throttled, so it keeps answering
//! while the main listener is shedding load.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};

use crate::context::ServiceContext;

/// Build health routes
pub fn health_routes(ctx: Arc<ServiceContext>) -> Router {
    Router::new().route("/healthz", get(healthz)).with_state(ctx)
}

async fn healthz(State(ctx): State<Arc<ServiceContext>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        ctx.health_report().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accepted::AcceptedStats;
    use crate::admission_control::{QpsThrottler, ThrottleConfig};
    use crate::context::ServiceIdentity;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn context() -> Arc<ServiceContext> {
        let throttler = QpsThrottler::new(ThrottleConfig::default()).unwrap();
        Arc::new(
            ServiceContext::new(
                ServiceIdentity::new("clock", "1.0.0"),
                200.0,
                Arc::new(throttler),
                AcceptedStats::default(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_healthz_plain_text() {
        let app = health_routes(context());
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        for key in ["busyness=", "accepted=", "service=clock", "version=1.0.0", "uptime="] {
            assert!(text.lines().any(|l| l.starts_with(key)), "missing {} in {:?}", key, text);
        }
    }

    #[tokio::test]
    async fn test_healthz_is_not_counted() {
        let ctx = context();
        let app = health_routes(ctx.clone());
        for _ in 0..5 {
            let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
            app.clone().oneshot(request).await.unwrap();
        }
        assert_eq!(ctx.throttler().window_count(), 0);
        assert_eq!(ctx.accepted().total(), 0);
    }

    #[tokio::test]
    async fn test_other_paths_not_found() {
        let app = health_routes(context());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
