use super::Handler;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TRANSPORT: &str = "udp";

/// Datagram transport, bound but not yet receiving.
///
/// Each datagram carries one request; the reply goes back to the sender as a
/// single datagram. Datagrams longer than the read buffer are truncated by
/// the socket and will usually fail to decode.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Handler,
    buffer_size: usize,
}

impl UdpServer {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: Handler,
        buffer_size: usize,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            handler,
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn start(self) -> UdpServerHandle {
        let local_addr = self.socket.local_addr().ok();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(receive_loop(self, stop_rx));

        if let Some(addr) = local_addr {
            info!("udp listening on {}", addr);
        }

        UdpServerHandle {
            local_addr,
            stop: stop_tx,
            task,
        }
    }
}

async fn receive_loop(server: UdpServer, mut stop: oneshot::Receiver<()>) {
    let UdpServer {
        socket,
        handler,
        buffer_size,
    } = server;
    let mut buffer = vec![0; buffer_size];

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok((n, peer)) => {
                    // Copy out before the buffer is reused for the next datagram.
                    let datagram = Bytes::copy_from_slice(&buffer[..n]);
                    tokio::spawn(reply(Arc::clone(&socket), handler.clone(), datagram, peer));
                }
                // Includes ICMP-driven errors on some platforms; keep serving.
                Err(err) => warn!(error = %err, "udp receive failed"),
            },
        }
    }
}

async fn reply(socket: Arc<UdpSocket>, handler: Handler, datagram: Bytes, peer: SocketAddr) {
    debug!(peer = %peer, len = datagram.len(), "datagram");
    let encoded = handler.handle_bytes(&datagram, TRANSPORT).await;
    if let Err(err) = socket.send_to(&encoded.bytes, peer).await {
        warn!(peer = %peer, error = %err, "udp reply failed");
    }
}

/// A running datagram transport.
pub struct UdpServerHandle {
    local_addr: Option<SocketAddr>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl UdpServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop receiving. Replies already spawned may still be sent.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "udp receive loop ended abnormally");
        }
        info!("UDP shutdown ok");
    }
}
