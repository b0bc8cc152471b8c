//! OTLP export pipeline for PostgreSQL log records and query spans.
//!
//! Events emitted by many concurrent producers travel as packed OTLP
//! protobuf messages over a framed byte channel ([`pgtel_ipc`]), are
//! reassembled by a single consumer, accumulate in memory-bounded batches,
//! and leave the process as OTLP/HTTP protobuf export requests. The design
//! invariant throughout: the workload emitting telemetry is never blocked
//! and never sees a telemetry failure — overflow and transport errors are
//! absorbed into counters.
//!
//! Two execution shapes are supported:
//!
//! - [`Pipeline`]: single-consumer polling — one owner alternately ingests
//!   channel bytes and flushes batches; no locks.
//! - [`Collector`]: a spawned tokio consumer task with periodic flush,
//!   configuration reload, graceful drain on shutdown, and exports running
//!   in their own tasks so a slow remote collector never stalls ingestion.

pub mod config;
pub mod event;
pub mod exporter;
pub mod metrics;
pub mod pipeline;
pub mod proto;
pub mod queue;
pub mod resource;
pub mod trace;

pub use config::Configuration;
pub use event::{AttributeValue, Event, LogRecord, Severity, Span, SpanKind, SpanStatus};
pub use exporter::{ExportError, HttpTransport, Transport, TransportBoxed};
pub use metrics::PipelineMetrics;
pub use pipeline::{Collector, Emitter, Pipeline};
pub use queue::{Batch, BatchQueue};
pub use resource::{ResourceRegistry, ResourceSnapshot};
pub use trace::{ActiveSpan, PropagatedContext, SpanContext, Tracer};

/// Instrumentation scope name attached to every exported record.
pub const LIBRARY: &str = "pgtel";

/// Instrumentation scope version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema URL stamped on resource and scope blocks.
pub const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.9.0";
