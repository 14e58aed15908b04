//! # HTTP Server
//!
//! Two listeners share one `ServiceContext`:
//!
//! - the application listener, every route behind the throttle guard
//! - the health listener, serving `/healthz` unthrottled
//!
//! The health listener is bound first so install verifiers can reach it
//! as soon as the process is up.

pub mod health_routes;
pub mod throttle_guard;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, routing::get, Router};
use chrono::{SecondsFormat, Utc};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::context::ServiceContext;
use crate::errors::{BusygateError, BusygateResult};

pub use health_routes::health_routes;
pub use throttle_guard::{apply_throttle, throttle_guard, TOO_BUSY_MESSAGE};

pub struct HttpServer {
    config: ServiceConfig,
    ctx: Arc<ServiceContext>,
}

impl HttpServer {
    /// Validate `config` and build the shared context
    pub fn new(config: ServiceConfig) -> BusygateResult<Self> {
        Self::started_at(config, Instant::now())
    }

    fn started_at(config: ServiceConfig, started_at: Instant) -> BusygateResult<Self> {
        let ctx = config.build_context_at(started_at)?;
        Ok(Self { config, ctx })
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Application router with the throttle guard mounted
    pub fn app(&self) -> Router {
        apply_throttle(app_routes(self.ctx.clone()), self.ctx.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Health router; not throttled
    pub fn health_app(&self) -> Router {
        health_routes(self.ctx.clone())
    }

    /// Bind both listeners from config and serve until Ctrl-C
    ///
    /// Startup order: start time, health listener, throttler, application
    /// listener.
    pub async fn start(config: ServiceConfig) -> BusygateResult<()> {
        config.validate()?;
        let started_at = Instant::now();
        let health_listener = bind(&config.health_addr()).await?;

        let server = Self::started_at(config, started_at)?;
        let listener = bind(&server.config.listen_addr()).await?;
        server.serve(listener, health_listener, shutdown_signal()).await
    }

    /// Serve on already-bound listeners until `shutdown` resolves
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        health_listener: TcpListener,
        shutdown: F,
    ) -> BusygateResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let identity = self.ctx.identity();
        info!(
            addr = %local_addr(&health_listener),
            service = %identity.service,
            version = %identity.version,
            "health listener started"
        );

        let (stop_tx, mut stop_rx) = watch::channel(());
        let health_app = self.health_app();
        let health_task = tokio::spawn(async move {
            axum::serve(health_listener, health_app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.changed().await;
                })
                .await
        });

        info!(
            addr = %local_addr(&listener),
            throttle_qps = self.ctx.throttler().limit_qps(),
            busy_qps = self.ctx.loaded_qps(),
            window_ms = self.ctx.throttler().window().as_millis() as u64,
            "application listener started"
        );
        let result = axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(BusygateError::Serve);

        // Dropping the sender stops the health listener.
        drop(stop_tx);
        let health_result = health_task.await;
        result?;

        match health_result {
            Ok(served) => served.map_err(BusygateError::Serve),
            Err(e) => {
                warn!(error = %e, "health listener task failed");
                Ok(())
            }
        }
    }
}

/// Routes served behind the throttle
fn app_routes(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/", get(current_time))
        .route("/version", get(version))
        .with_state(ctx)
}

async fn current_time() -> String {
    format!("{}\n", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

async fn version(State(ctx): State<Arc<ServiceContext>>) -> String {
    let identity = ctx.identity();
    format!("{} {}\n", identity.service, identity.version)
}

async fn bind(addr: &str) -> BusygateResult<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| BusygateError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    fn server(throttle_qps: f64) -> HttpServer {
        let mut config = ServiceConfig::default();
        config.service.name = "clock".into();
        config.service.version = "1.0.0".into();
        config.throttle.throttle_qps = throttle_qps;
        HttpServer::new(config).unwrap()
    }

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn raw_get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ServiceConfig::default();
        config.throttle.throttle_qps = 0.0;
        assert!(HttpServer::new(config).is_err());
    }

    #[tokio::test]
    async fn test_app_routes_are_throttled() {
        let server = server(1_000.0);
        let (status, body) = get_text(server.app(), "/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "clock 1.0.0\n");

        let (status, body) = get_text(server.app(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains('T'));

        assert_eq!(server.context().throttler().window_count(), 2);
        assert_eq!(server.context().accepted().total(), 2);
    }

    #[tokio::test]
    async fn test_health_app_reports_accepted() {
        let server = server(1_000.0);
        get_text(server.app(), "/").await;
        let (status, body) = get_text(server.health_app(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("accepted=1\n"));
        assert!(body.contains("service=clock\n"));
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let server = server(1_000.0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let health_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let health_addr = health_listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, health_listener, async move {
            let _ = rx.await;
        }));

        let response = raw_get(addr, "/version").await;
        assert!(response.starts_with("HTTP/1.1 200"), "got {}", response);

        let health = raw_get(health_addr, "/healthz").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.contains("content-type: text/plain"));
        assert!(health.contains("accepted=1"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_start_binds_health_listener_first() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let health_addr = taken.local_addr().unwrap();

        let mut config = ServiceConfig::default();
        config.server.ip = "127.0.0.1".into();
        config.server.health_port = health_addr.port();
        config.server.port = 1;

        // fails on the health port before the application port is touched
        match HttpServer::start(config).await {
            Err(BusygateError::Bind { addr, .. }) => assert_eq!(addr, health_addr.to_string()),
            other => panic!("expected bind error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config_before_binding() {
        let mut config = ServiceConfig::default();
        config.throttle.window_ms = 0;
        let err = HttpServer::start(config).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_bind_error_names_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = bind(&addr).await.unwrap_err();
        assert!(err.to_string().contains(&addr));
        assert_eq!(err.exit_code(), 1);
    }
}
