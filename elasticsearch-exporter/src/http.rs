//! HTTP server for the Prometheus metrics endpoint.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::exposition;
use crate::scrape::ScrapeCoordinator;

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    coordinator: Arc<ScrapeCoordinator>,
    landing_page: Arc<str>,
}

fn landing_page(metrics_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>Elasticsearch Exporter</title></head>\n\
         <body>\n\
         <h1>Elasticsearch Exporter</h1>\n\
         <p><a href=\"{metrics_path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n"
    )
}

/// Create the HTTP router.
fn create_router(coordinator: Arc<ScrapeCoordinator>, metrics_path: &str) -> Router {
    let state = AppState {
        coordinator,
        landing_page: landing_page(metrics_path).into(),
    };

    Router::new()
        .route("/", get(landing_handler))
        .route(metrics_path, get(metrics_handler))
        .with_state(state)
}

/// Handler for the landing page.
async fn landing_handler(State(state): State<AppState>) -> Html<String> {
    Html(state.landing_page.to_string())
}

/// Handler for the metrics endpoint. Every request runs a full scrape.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.coordinator.scrape().await {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, exposition::CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render metrics: {e}\n"),
            )
                .into_response()
        }
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    coordinator: Arc<ScrapeCoordinator>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(
        coordinator: Arc<ScrapeCoordinator>,
        listen_addr: SocketAddr,
        metrics_path: String,
    ) -> Self {
        Self {
            coordinator,
            listen_addr,
            metrics_path,
        }
    }

    /// Bind the listener without serving yet.
    pub async fn bind(self) -> io::Result<BoundServer> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        Ok(BoundServer {
            listener,
            router: create_router(self.coordinator, &self.metrics_path),
            local_addr,
        })
    }

    /// Bind and serve. Only a bind failure returns.
    pub async fn run(self) -> io::Result<()> {
        self.bind().await?.serve().await;
        Ok(())
    }
}

/// A server with a bound listener.
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl fmt::Debug for BoundServer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BoundServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl BoundServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever. Each connection is served on its own
    /// task. Accept and connection errors are logged and never stop the loop.
    pub async fn serve(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    if let Some(backoff) = accept_backoff(&err) {
                        warn!(
                            %err,
                            backoff_ms = backoff.as_millis() as u64,
                            "Failed to accept connection"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let service = TowerToHyperService::new(self.router.clone());

            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(%err, %peer, "Error serving connection");
                }
            });
        }
    }
}

/// Delay before the next accept after a failed one.
///
/// Errors tied to a single aborted connection are retried at once. Anything
/// else, such as running out of file descriptors, is retried after a pause
/// so the loop does not spin while resources are exhausted.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}
