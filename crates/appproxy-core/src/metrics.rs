//! Prometheus metrics for proxy calls.

use crate::error::Result;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for a completed proxy call.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CallLabels {
    /// Proxy method (commit_block, state_changed, ...).
    pub method: String,
    /// `ok` or the error kind.
    pub outcome: String,
}

/// Labels for call latency.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MethodLabels {
    /// Proxy method.
    pub method: String,
}

/// Metrics shared by the commit driver and the socket bridge.
#[derive(Clone, Debug)]
pub struct ProxyMetrics {
    /// Completed calls by method and outcome.
    pub calls: Family<CallLabels, Counter>,
    /// Call latency in seconds.
    pub call_duration_seconds: Family<MethodLabels, Histogram>,
    /// Transactions accepted onto the ingress queue.
    pub submitted_transactions: Counter,
    /// Index of the last successfully committed block.
    pub last_committed_index: Gauge,
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyMetrics {
    /// Creates unregistered metrics.
    pub fn new() -> Self {
        Self {
            calls: Family::default(),
            call_duration_seconds: Family::<MethodLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0005, 2.0, 16))
            }),
            submitted_transactions: Counter::default(),
            last_committed_index: Gauge::default(),
        }
    }

    /// Creates metrics and registers them.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::new();
        registry.register(
            "appproxy_calls",
            "Completed proxy calls by method and outcome",
            metrics.calls.clone(),
        );
        registry.register(
            "appproxy_call_duration_seconds",
            "Proxy call latency in seconds",
            metrics.call_duration_seconds.clone(),
        );
        registry.register(
            "appproxy_submitted_transactions",
            "Transactions accepted onto the ingress queue",
            metrics.submitted_transactions.clone(),
        );
        registry.register(
            "appproxy_last_committed_index",
            "Index of the last committed block",
            metrics.last_committed_index.clone(),
        );
        metrics
    }

    /// Records the outcome and latency of one call.
    pub fn record_call<T>(&self, method: &str, result: &Result<T>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        self.calls
            .get_or_create(&CallLabels {
                method: method.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.call_duration_seconds
            .get_or_create(&MethodLabels {
                method: method.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    /// Counts a transaction accepted onto the ingress queue.
    pub fn record_submitted(&self) {
        self.submitted_transactions.inc();
    }

    /// Records the last committed block index.
    pub fn set_last_committed(&self, index: u64) {
        self.last_committed_index.set(index as i64);
    }

    /// Returns the number of calls recorded for a method and outcome.
    pub fn call_count(&self, method: &str, outcome: &str) -> u64 {
        self.calls
            .get_or_create(&CallLabels {
                method: method.to_string(),
                outcome: outcome.to_string(),
            })
            .get()
    }
}
