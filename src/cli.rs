use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "trikv")]
#[command(about = "An in-memory key-value store served over TCP, UDP and HTTP")]
#[command(
    long_about = "trikv keeps one shared JSON key-value map and serves it concurrently over a \
                  TCP stream transport, a UDP datagram transport and an HTTP transport"
)]
#[command(version)]
pub struct Cli {
    /// Host to bind every transport to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// TCP stream transport port
    #[arg(long)]
    pub tcp_port: Option<u16>,

    /// UDP datagram transport port
    #[arg(long)]
    pub udp_port: Option<u16>,

    /// HTTP transport port
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Configuration file path (JSON format)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Disable request metrics aggregation
    #[arg(long)]
    pub no_metrics: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Log filter directive implied by the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn,trikv=info"
        }
    }
}
