//! HTTP server implementation using hyper.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, SharedConfig};
use crate::response::{error_body, not_found};
use crate::router::{Context, RouteMatch, RouterHandle, parse_query};
use crate::session::SessionStore;

/// Maximum request body size in bytes (1 MB).
const MAX_BODY_SIZE: usize = 1_048_576;

/// Maximum number of concurrent connections.
const MAX_CONNECTIONS: usize = 128;

/// Timeout for reading request headers (slowloris protection).
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared server state.
pub struct State {
    pub config: SharedConfig,
    pub db: Option<crate::db::Handle>,
    pub router: Arc<RouterHandle>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Handle to a running server instance.
pub struct Server {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<crate::Result<()>>,
}

impl Server {
    /// The address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shut down the accept loop and wait for it to finish.
    pub async fn shutdown(self) -> crate::Result<()> {
        let _ = self.shutdown_tx.send(());
        self.task.await.unwrap_or(Ok(()))
    }
}

fn add_standard_headers(response: &mut Response<Full<Bytes>>) {
    let headers = response.headers_mut();
    headers.insert(
        "X-Content-Type-Options",
        hyper::header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "X-Frame-Options",
        hyper::header::HeaderValue::from_static("DENY"),
    );
    headers.insert(
        hyper::header::CACHE_CONTROL,
        hyper::header::HeaderValue::from_static("no-store"),
    );
}

fn declared_length(parts: &hyper::http::request::Parts) -> Option<usize> {
    parts
        .headers
        .get(hyper::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<State>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();

    // Reject oversized bodies early via Content-Length header
    if declared_length(&parts).is_some_and(|len| len > MAX_BODY_SIZE) {
        let mut response = error_body(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large");
        add_standard_headers(&mut response);
        return Ok(response);
    }

    // Read body with size limit (fallback for chunked encoding)
    let body_bytes = match BodyExt::collect(Limited::new(body, MAX_BODY_SIZE)).await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            let mut response = error_body(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large");
            add_standard_headers(&mut response);
            return Ok(response);
        }
    };

    let path = parts.uri.path().to_string();

    let mut response = match state.router.match_route(&parts.method, &path) {
        RouteMatch::Matched { handler, params } => {
            let ctx = Context {
                query: parse_query(parts.uri.query()),
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                params,
                body: body_bytes,
                db: state.db.clone(),
                config: Arc::clone(&state.config),
                sessions: Arc::clone(&state.sessions),
            };

            match handler(ctx).await {
                Ok(response) => response,
                Err(e) => e.into_response(),
            }
        }
        RouteMatch::MethodNotAllowed => {
            error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        RouteMatch::NotFound => not_found("Not found"),
    };

    add_standard_headers(&mut response);
    Ok(response)
}

fn connection_builder() -> auto::Builder<TokioExecutor> {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT);
    builder
}

/// Bind, start accepting connections, and return a handle.
///
/// The returned [`Server`] exposes the bound address and a
/// [`shutdown`](Server::shutdown) method for graceful termination.
pub async fn start(
    config: Config,
    db: Option<crate::db::Handle>,
    router: Arc<RouterHandle>,
    sessions: Arc<dyn SessionStore>,
) -> crate::Result<Server> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    let state = Arc::new(State {
        config: Arc::new(config),
        db,
        router,
        sessions,
    });

    info!("Server listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let semaphore = Arc::new(Semaphore::new(MAX_CONNECTIONS));

    let task = tokio::spawn(async move {
        tokio::pin!(shutdown_rx);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote_addr) = result?;
                    let io = TokioIo::new(stream);

                    let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                        warn!("Connection limit reached, rejecting {}", remote_addr);
                        tokio::spawn(async move {
                            let service = service_fn(|_req: Request<Incoming>| async {
                                Ok::<_, std::convert::Infallible>(error_body(
                                    StatusCode::SERVICE_UNAVAILABLE,
                                    "Service unavailable",
                                ))
                            });
                            let _ = connection_builder().serve_connection(io, service).await;
                        });
                        continue;
                    };

                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
                        if let Err(e) = connection_builder().serve_connection(io, service).await {
                            error!("Error serving connection from {}: {}", remote_addr, e);
                        }
                        drop(permit);
                    });
                }
                _ = &mut shutdown_rx => {
                    break;
                }
            }
        }

        Ok(())
    });

    Ok(Server {
        addr,
        shutdown_tx,
        task,
    })
}

/// Run the HTTP server until the accept loop fails.
pub async fn run(
    config: Config,
    db: Option<crate::db::Handle>,
    router: Arc<RouterHandle>,
    sessions: Arc<dyn SessionStore>,
) -> crate::Result<()> {
    let server = start(config, db, router, sessions).await?;
    server.task.await.unwrap_or(Ok(()))
}
