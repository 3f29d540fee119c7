use std::net::SocketAddr;
use std::process::exit;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use trikv::protocol::{Request, Response};
use trikv::storage::Batch;

const DEFAULT_TCP_ADDR: &str = "127.0.0.1:8181";
const DEFAULT_UDP_ADDR: &str = "127.0.0.1:9001";
const UDP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "trikv-client", version, about = "Send one request to a trikv server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Transport used to reach the server
    #[arg(long, value_enum, default_value_t = Transport::Tcp, global = true)]
    transport: Transport,

    /// Server address (defaults to the transport's standard port on localhost)
    #[arg(long, value_name = "IP-PORT", global = true)]
    addr: Option<SocketAddr>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Tcp,
    Udp,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the value stored under a key
    Get {
        /// The key
        key: String,
    },
    /// Store one or more pairs in a single batch
    Post {
        /// Pairs as key=value; values that parse as JSON are sent as JSON
        #[arg(required = true, value_parser = parse_pair)]
        pairs: Vec<(String, Value)>,
    },
    /// Remove a key
    Delete {
        /// The key
        key: String,
    },
}

fn parse_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn send_tcp(addr: SocketAddr, body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(body).await?;
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(reply)
}

async fn send_udp(addr: SocketAddr, body: &[u8]) -> std::io::Result<Vec<u8>> {
    let local: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.send_to(body, addr).await?;

    let mut buffer = vec![0; 64 * 1024];
    let (n, _) = tokio::time::timeout(UDP_TIMEOUT, socket.recv_from(&mut buffer))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply from server"))??;
    buffer.truncate(n);
    Ok(buffer)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let request = match cli.command {
        Commands::Get { key } => Request::get(key),
        Commands::Post { pairs } => Request::post(pairs.into_iter().collect::<Batch>()),
        Commands::Delete { key } => Request::delete(key),
    };
    let body = serde_json::to_vec(&request).unwrap_or_else(|e| {
        eprintln!("Failed to encode request: {}", e);
        exit(1);
    });

    let reply = match cli.transport {
        Transport::Tcp => {
            let addr = cli.addr.unwrap_or_else(|| default_addr(DEFAULT_TCP_ADDR));
            send_tcp(addr, &body).await
        }
        Transport::Udp => {
            let addr = cli.addr.unwrap_or_else(|| default_addr(DEFAULT_UDP_ADDR));
            send_udp(addr, &body).await
        }
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to reach server: {}", e);
        exit(1);
    });

    let response: Response = serde_json::from_slice(&reply).unwrap_or_else(|e| {
        eprintln!("Malformed response: {}", e);
        exit(1);
    });

    match serde_json::to_string_pretty(&response) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{}", String::from_utf8_lossy(&reply)),
    }
    if response.status != 200 {
        exit(1);
    }
}

fn default_addr(raw: &str) -> SocketAddr {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Invalid default address: {}", raw);
        exit(1);
    })
}
