//! # Throttle Guard Middleware
//!
//! Sheds load in front of a router. Each request is run through the shared
//! `QpsThrottler`; rejected requests get `503 Service Unavailable` and never
//! reach the inner handler. Accepted requests are counted and, once per
//! reporting interval, summarized in a log line.
//!
//! The guard never looks at method, path, headers or body.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, info};

use crate::admission_control::AdmissionDecision;
use crate::context::ServiceContext;

/// Body of the 503 returned to shed requests
pub const TOO_BUSY_MESSAGE: &str = "Server too busy, try again later";

/// Mount the throttle guard on every route of `router`
pub fn apply_throttle<S>(router: Router<S>, ctx: Arc<ServiceContext>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(ctx, throttle_guard))
}

pub async fn throttle_guard(
    State(ctx): State<Arc<ServiceContext>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let AdmissionDecision::Rejected { qps, accept_probability } = ctx.throttler().decide() {
        debug!(qps, accept_probability, "request shed");
        return (StatusCode::SERVICE_UNAVAILABLE, TOO_BUSY_MESSAGE).into_response();
    }

    ctx.accepted().record_accept(|report| {
        info!(
            accepted = report.accepted,
            elapsed_secs = report.elapsed.as_secs_f64(),
            accepted_qps = %format!("{:.5}", report.accepted_qps()),
            total_qps = %format!("{:.5}", ctx.throttler().current_qps()),
            "accepted qps summary"
        );
    });

    next.run(request).await
}
