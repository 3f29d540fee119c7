//! Transport adapters and the dispatcher they share.

pub mod handler;
pub mod http;
pub mod tcp;
pub mod udp;

pub use handler::Handler;
pub use http::{build_router, HttpServer, HttpServerHandle};
pub use tcp::{TcpServer, TcpServerHandle};
pub use udp::{UdpServer, UdpServerHandle};
