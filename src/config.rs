use crate::cli::Cli;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration combining transport and metrics settings.
///
/// Can be loaded from files, env vars, or CLI args with precedence order:
/// CLI > File > Environment > Defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Bytes read per stream connection and per datagram.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// How long the HTTP transport waits for in-flight exchanges on stop.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_tcp_port() -> u16 {
    8181
}

fn default_udp_port() -> u16 {
    9001
}

fn default_http_port() -> u16 {
    8080
}

fn default_read_buffer_size() -> usize {
    1024
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            tcp_port: default_tcp_port(),
            udp_port: default_udp_port(),
            http_port: default_http_port(),
            read_buffer_size: default_read_buffer_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ServerConfig {
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Loopback settings on ephemeral ports, for tests.
    pub fn ephemeral() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tcp_port: 0,
            udp_port: 0,
            http_port: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            report_interval_secs: default_report_interval_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("TRIKV_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_env(&lookup, "TRIKV_TCP_PORT")? {
            config.server.tcp_port = port;
        }
        if let Some(port) = parse_env(&lookup, "TRIKV_UDP_PORT")? {
            config.server.udp_port = port;
        }
        if let Some(port) = parse_env(&lookup, "TRIKV_HTTP_PORT")? {
            config.server.http_port = port;
        }
        if let Some(interval) = parse_env(&lookup, "TRIKV_METRICS_INTERVAL")? {
            config.metrics.report_interval_secs = interval;
        }

        match lookup("TRIKV_METRICS").as_deref() {
            None => {}
            Some("on") | Some("true") | Some("1") => config.metrics.enabled = true,
            Some("off") | Some("false") | Some("0") => config.metrics.enabled = false,
            Some(other) => {
                return Err(ConfigError::InvalidEnv {
                    name: "TRIKV_METRICS".to_string(),
                    value: other.to_string(),
                })
            }
        }

        Ok(config)
    }

    /// Create config with CLI args taking precedence over file and environment.
    ///
    /// Precedence: CLI > File > Environment > Defaults
    pub fn from_sources(cli: &Cli) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let file_config = cli
            .config
            .as_ref()
            .map(Self::load_from_file)
            .transpose()?;

        let config = Self::merge(cli, file_config, env_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: &Cli, file_config: Option<Config>, env_config: Config) -> Self {
        let base = file_config.unwrap_or(env_config);

        let server = ServerConfig {
            host: cli.host.clone().unwrap_or(base.server.host),
            tcp_port: cli.tcp_port.unwrap_or(base.server.tcp_port),
            udp_port: cli.udp_port.unwrap_or(base.server.udp_port),
            http_port: cli.http_port.unwrap_or(base.server.http_port),
            ..base.server
        };

        let metrics = MetricsConfig {
            enabled: base.metrics.enabled && !cli.no_metrics,
            ..base.metrics
        };

        Config { server, metrics }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.read_buffer_size == 0 {
            return Err(ConfigError::Validation(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.metrics.report_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "metrics report_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.metrics.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "metrics queue_capacity must be greater than zero".to_string(),
            ));
        }
        // Stream and HTTP both listen on TCP and cannot share a port.
        if self.server.tcp_port != 0 && self.server.tcp_port == self.server.http_port {
            return Err(ConfigError::Validation(format!(
                "tcp_port and http_port both set to {}",
                self.server.tcp_port
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("host cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
    }
}
