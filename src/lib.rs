pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, RequestError};
pub use protocol::{Operation, Request, Response};
pub use server::{Handler, HttpServer, TcpServer, UdpServer};
pub use storage::{MemoryStorage, StorageBackend, StorageError};
