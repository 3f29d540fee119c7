use super::Handler;
use crate::error::RequestError;
use crate::protocol::{encode_response, Operation};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TRANSPORT: &str = "http";

/// Router serving the store on `/`. The request verb selects the operation;
/// any `Method` field in the body is ignored. Bodies are not size-capped.
pub fn build_router(handler: Handler) -> Router {
    Router::new()
        .route("/", any(root))
        .layer(DefaultBodyLimit::disable())
        .with_state(handler)
}

async fn root(
    State(handler): State<Handler>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let encoded = match body {
        Ok(body) => {
            let operation = Operation::parse(method.as_str());
            handler.handle_bytes_as(operation, &body, TRANSPORT).await
        }
        Err(rejection) => {
            warn!(error = %rejection, "http body read failed");
            encode_response(Err(RequestError::Decode(rejection.body_text())))
        }
    };
    let status =
        StatusCode::from_u16(encoded.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        encoded.bytes,
    )
        .into_response()
}

/// Request/response transport, bound but not yet serving.
pub struct HttpServer {
    listener: TcpListener,
    handler: Handler,
    grace: Duration,
}

impl HttpServer {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: Handler,
        grace: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            grace,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> Router {
        build_router(self.handler.clone())
    }

    pub fn start(self) -> HttpServerHandle {
        let local_addr = self.listener.local_addr().ok();
        let Self {
            listener,
            handler,
            grace,
        } = self;
        let app = build_router(handler);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %err, "http server failed");
            }
        });

        if let Some(addr) = local_addr {
            info!("http listening on {}", addr);
        }

        HttpServerHandle {
            local_addr,
            grace,
            stop: stop_tx,
            task,
        }
    }
}

/// A running request/response transport.
pub struct HttpServerHandle {
    local_addr: Option<SocketAddr>,
    grace: Duration,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HttpServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop accepting and let in-flight exchanges finish. Whatever is still
    /// running when the grace period ends is aborted.
    pub async fn stop(mut self) {
        let _ = self.stop.send(());
        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "http server task ended abnormally"),
            Err(_) => {
                warn!(grace = ?self.grace, "http graceful shutdown timed out, aborting");
                self.task.abort();
            }
        }
        info!("HTTP shutdown ok");
    }
}
