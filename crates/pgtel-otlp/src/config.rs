//! Host-supplied pipeline configuration.

use crate::event::AttributeValue;
use pgtel_ipc::Signal;
use serde::Deserialize;
use std::time::Duration;

/// Everything the pipeline needs from the host process.
///
/// The host constructs one of these (for instance by deserializing its own
/// settings) and may hand the pipeline a fresh copy at any time; running
/// batches keep the resource snapshot they were created with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Base OTLP endpoint; signal paths (`v1/logs`, `v1/traces`) are
    /// appended relative to it.
    pub endpoint: String,
    /// Deadline for one export request, in milliseconds.
    pub timeout_ms: u64,
    /// Disable TLS verification, for local or test collectors only.
    pub insecure: bool,
    /// Records per batch.
    pub batch_max: usize,
    /// Total records across all queued batches; past this, events drop.
    pub queue_max: usize,
    /// Value of the `service.name` resource attribute.
    pub service_name: String,
    /// Extra resource attributes; cannot shadow the SDK-asserted keys.
    pub resource_attributes: Vec<(String, AttributeValue)>,
    /// How often the task-shape collector flushes partially-filled batches,
    /// in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            timeout_ms: 10_000,
            insecure: false,
            batch_max: 512,
            queue_max: 2048,
            service_name: "postgresql".to_string(),
            resource_attributes: Vec::new(),
            flush_interval_ms: 1_000,
        }
    }
}

impl Configuration {
    /// The per-signal URL: the base endpoint with `v1/<signal>` appended.
    ///
    /// A base without a trailing slash gets one, so both
    /// `http://host:4318` and `http://host:4318/` compose the same URL.
    pub fn signal_url(&self, signal: Signal) -> String {
        let path = match signal {
            Signal::Logs => "v1/logs",
            Signal::Metrics => "v1/metrics",
            Signal::Traces => "v1/traces",
        };
        if self.endpoint.ends_with('/') {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}/{}", self.endpoint, path)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}
