//! Logging and metrics-provider lifecycle.

use crate::error::TelemetryError;
use opentelemetry::global;
use opentelemetry_sdk::metrics::MeterProvider;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
    pub enable_metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_metrics: true,
        }
    }
}

/// Owns the log subscriber and meter provider for the life of the process.
pub struct TelemetryService {
    provider: Option<MeterProvider>,
}

impl TelemetryService {
    /// Install the global subscriber and meter provider.
    ///
    /// Fails if another global subscriber is already installed.
    pub fn start(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

        let provider = if config.enable_metrics {
            let provider = MeterProvider::builder().build();
            global::set_meter_provider(provider.clone());
            Some(provider)
        } else {
            None
        };

        info!("logging started");
        Ok(Self { provider })
    }

    /// A sink that installs nothing; log macros become no-ops.
    pub fn noop() -> Self {
        Self { provider: None }
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(err) = provider.shutdown() {
                tracing::warn!(error = %err, "meter provider shutdown failed");
            }
        }
        info!("logging shutdown ok");
    }
}
