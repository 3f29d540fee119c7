use super::Handler;
use crate::error::RequestError;
use crate::protocol::{encode_response, EncodedResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

const TRANSPORT: &str = "tcp";

/// Opaque id of a live connection: 4 random bytes rendered as hex.
pub type ConnId = String;

fn new_conn_id() -> ConnId {
    // Collisions are possible but not defended against at this volume.
    hex::encode_upper(rand::random::<[u8; 4]>())
}

/// Live connections of one stream server, kept so `stop` can close them.
#[derive(Clone, Default)]
struct ConnRegistry {
    conns: Arc<Mutex<HashMap<ConnId, AbortHandle>>>,
}

impl ConnRegistry {
    fn len(&self) -> usize {
        self.conns.lock().len()
    }

    fn remove(&self, id: &str) {
        if self.conns.lock().remove(id).is_some() {
            debug!(conn = id, "conn removed");
        }
    }

    /// Spawn the connection task and record it under the lock, so the task
    /// cannot deregister before it is registered.
    fn spawn(&self, stream: TcpStream, peer: SocketAddr, handler: Handler, buffer_size: usize) {
        let id = new_conn_id();
        let registry = self.clone();
        let mut conns = self.conns.lock();

        let task_id = id.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &handler, buffer_size).await {
                warn!(conn = %task_id, peer = %peer, error = %err, "connection closed with error");
            }
            registry.remove(&task_id);
        });

        debug!(conn = %id, peer = %peer, "conn added");
        conns.insert(id, task.abort_handle());
    }

    fn close_all(&self) {
        let conns: Vec<(ConnId, AbortHandle)> = self.conns.lock().drain().collect();
        if !conns.is_empty() {
            info!(count = conns.len(), "closing active conns");
        }
        for (id, conn) in conns {
            debug!(conn = %id, "active conn closed");
            conn.abort();
        }
    }
}

/// One read, one dispatch, one write, then close.
async fn handle_connection<S>(
    mut stream: S,
    handler: &Handler,
    buffer_size: usize,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let encoded = read_and_dispatch(&mut stream, handler, buffer_size).await;
    stream.write_all(&encoded.bytes).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// A failed read still answers with a 500 envelope, best effort.
async fn read_and_dispatch<S>(
    stream: &mut S,
    handler: &Handler,
    buffer_size: usize,
) -> EncodedResponse
where
    S: AsyncRead + Unpin,
{
    let mut buffer = vec![0; buffer_size];
    match stream.read(&mut buffer).await {
        Ok(n) => handler.handle_bytes(&buffer[..n], TRANSPORT).await,
        Err(err) => {
            debug!(error = %err, "tcp read failed");
            encode_response(Err(RequestError::Decode(err.to_string())))
        }
    }
}

/// Stream transport, bound but not yet accepting.
pub struct TcpServer {
    listener: TcpListener,
    handler: Handler,
    buffer_size: usize,
}

impl TcpServer {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: Handler,
        buffer_size: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop. Each connection gets its own task.
    pub fn start(self) -> TcpServerHandle {
        let local_addr = self.listener.local_addr().ok();
        let registry = ConnRegistry::default();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(self, registry.clone(), stop_rx));

        if let Some(addr) = local_addr {
            info!("tcp listening on {}", addr);
        }

        TcpServerHandle {
            local_addr,
            registry,
            stop: stop_tx,
            task,
        }
    }
}

async fn accept_loop(server: TcpServer, registry: ConnRegistry, mut stop: oneshot::Receiver<()>) {
    let TcpServer {
        listener,
        handler,
        buffer_size,
    } = server;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => registry.spawn(stream, peer, handler.clone(), buffer_size),
                // Transient failures (e.g. fd exhaustion) must not end the loop.
                Err(err) => warn!(error = %err, "accept failed"),
            },
        }
    }

    drop(listener);
    registry.close_all();
}

/// A running stream transport.
pub struct TcpServerHandle {
    local_addr: Option<SocketAddr>,
    registry: ConnRegistry,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TcpServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// Close the listener and abort every open connection. In-flight
    /// requests are not drained.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "tcp accept loop ended abnormally");
        }
        info!("TCP shutdown ok");
    }
}
