use crate::config::MetricsConfig;
use opentelemetry::metrics::Counter;
use opentelemetry::{global, KeyValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-method request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodCounts {
    pub get: u64,
    pub post: u64,
    pub delete: u64,
    pub unknown: u64,
}

impl std::fmt::Display for MethodCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "METRICS - GET: {}, POST: {}, DELETE: {}, UNKNOWN: {}",
            self.get, self.post, self.delete, self.unknown
        )
    }
}

#[derive(Default)]
struct MethodStats {
    get: AtomicU64,
    post: AtomicU64,
    delete: AtomicU64,
    unknown: AtomicU64,
}

impl MethodStats {
    fn count(&self, method: &str) {
        let counter = match method {
            "GET" => &self.get,
            "POST" => &self.post,
            "DELETE" => &self.delete,
            _ => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MethodCounts {
        MethodCounts {
            get: self.get.load(Ordering::Relaxed),
            post: self.post.load(Ordering::Relaxed),
            delete: self.delete.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}

struct Aggregator {
    receiver: mpsc::Receiver<String>,
    stop: oneshot::Receiver<()>,
    stats: Arc<MethodStats>,
    requests_total: Counter<u64>,
    report_interval: Duration,
}

impl Aggregator {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.report_interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = &mut self.stop => break,
                sample = self.receiver.recv() => match sample {
                    Some(method) => self.observe(&method),
                    None => break,
                },
                _ = ticker.tick() => info!("{}", self.stats.snapshot()),
            }
        }

        self.receiver.close();
        while let Ok(method) = self.receiver.try_recv() {
            self.observe(&method);
        }
        info!("{}", self.stats.snapshot());
    }

    fn observe(&self, method: &str) {
        self.stats.count(method);
        self.requests_total
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }
}

/// Request counters fed through a fire-and-forget queue.
///
/// `record` never blocks the caller. Samples are dropped when the queue is
/// full or nothing consumes it, so a slow aggregator costs accuracy rather
/// than request latency.
pub struct Metrics {
    sender: mpsc::Sender<String>,
    stats: Arc<MethodStats>,
    pending: Mutex<Option<Aggregator>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Metrics {
    /// Build an active sink. Samples queue up until `start` spawns the
    /// aggregator.
    pub fn new(config: &MetricsConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let stats = Arc::new(MethodStats::default());

        let requests_total = global::meter("trikv")
            .u64_counter("trikv_requests_total")
            .with_description("Total number of requests per method")
            .init();

        let aggregator = Aggregator {
            receiver,
            stop: stop_rx,
            stats: Arc::clone(&stats),
            requests_total,
            report_interval: Duration::from_secs(config.report_interval_secs),
        };

        Self {
            sender,
            stats,
            pending: Mutex::new(Some(aggregator)),
            stop: Mutex::new(Some(stop_tx)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the aggregator. Must be called from within a tokio runtime;
    /// later calls do nothing.
    pub fn start(&self) {
        let aggregator = self.pending.lock().ok().and_then(|mut slot| slot.take());
        let Some(aggregator) = aggregator else {
            return;
        };

        let task = tokio::spawn(aggregator.run());
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        info!("metrics started");
    }

    /// Metrics sink that discards every sample.
    pub fn noop() -> Self {
        // Receiver dropped right away: every send reports Closed.
        let (sender, _) = mpsc::channel(1);
        Self {
            sender,
            stats: Arc::new(MethodStats::default()),
            pending: Mutex::new(None),
            stop: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Build from config: an active sink when enabled, a no-op otherwise.
    pub fn from_config(config: &MetricsConfig) -> Self {
        if config.enabled {
            Self::new(config)
        } else {
            Self::noop()
        }
    }

    /// Queue one request sample labelled with its method token.
    pub fn record(&self, method: &str) {
        match self.sender.try_send(method.to_string()) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => debug!(method, "metrics queue full, sample dropped"),
        }
    }

    pub fn snapshot(&self) -> MethodCounts {
        self.stats.snapshot()
    }

    /// Stop the aggregator after it drains queued samples. A sink that was
    /// never started discards what it queued.
    pub async fn stop(&self) {
        let stop = self.stop.lock().ok().and_then(|mut slot| slot.take());
        if let Some(stop) = stop {
            let _ = stop.send(());
        }

        let task = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "metrics aggregator ended abnormally");
            }
        }
        info!("metrics shutdown ok");
    }
}
