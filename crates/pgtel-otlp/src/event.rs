//! Domain event types: log records, spans, severities, attributes.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum attributes carried by a single log record or span.
pub const EVENT_MAX_ATTRIBUTES: usize = 20;

/// Attribute value types for event and resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// PostgreSQL log severity, carrying its dual OpenTelemetry encoding: an
/// ordered severity number and the original severity text.
///
/// The number mapping follows the OpenTelemetry Log Data Model: values below
/// ERROR (17) are non-erroneous, and sources with several levels inside one
/// range are assigned consecutive numbers from the bottom of the range, so
/// DEBUG5..DEBUG1 land on TRACE (1) through DEBUG (5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    Debug1,
    Log,
    Info,
    Notice,
    Warning,
    Error,
    Fatal,
    Panic,
}

impl Severity {
    /// OpenTelemetry severity number (1..=24).
    pub fn number(self) -> i32 {
        match self {
            Severity::Debug5 => 1,   // TRACE
            Severity::Debug4 => 2,   // TRACE2
            Severity::Debug3 => 3,   // TRACE3
            Severity::Debug2 => 4,   // TRACE4
            Severity::Debug1 => 5,   // DEBUG
            Severity::Log | Severity::Info => 9, // INFO
            Severity::Notice => 10,  // INFO2
            Severity::Warning => 13, // WARN
            Severity::Error => 17,   // ERROR
            Severity::Fatal => 21,   // FATAL
            Severity::Panic => 22,   // FATAL2
        }
    }

    /// The severity text as known at the source.
    pub fn text(self) -> &'static str {
        match self {
            Severity::Debug5
            | Severity::Debug4
            | Severity::Debug3
            | Severity::Debug2
            | Severity::Debug1 => "DEBUG",
            Severity::Log => "LOG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Panic => "PANIC",
        }
    }
}

/// One log message captured from the host, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the event occurred (Unix nanoseconds).
    pub time_unix_nano: u64,
    /// When this pipeline observed the event (Unix nanoseconds).
    pub observed_time_unix_nano: u64,
    pub severity: Severity,
    pub body: String,
    /// Insertion-ordered attributes, capped at [`EVENT_MAX_ATTRIBUTES`].
    pub attributes: Vec<(String, AttributeValue)>,
    /// Attributes rejected by the cap.
    pub dropped_attributes: u32,
}

impl LogRecord {
    /// Creates a record stamped with the current time for both timestamps.
    pub fn new(severity: Severity, body: impl Into<String>) -> Self {
        let now = unix_nanos();
        Self {
            time_unix_nano: now,
            observed_time_unix_nano: now,
            severity,
            body: body.into(),
            attributes: Vec::new(),
            dropped_attributes: 0,
        }
    }

    /// Appends an attribute, counting it as dropped once the cap is reached.
    pub fn attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if self.attributes.len() < EVENT_MAX_ATTRIBUTES {
            self.attributes.push((key.into(), value.into()));
        } else {
            self.dropped_attributes += 1;
        }
    }
}

/// Span kind according to the OpenTelemetry specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Span execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

/// A finished span, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub parent_span_id: Option<[u8; 8]>,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub name: String,
    pub kind: SpanKind,
    pub status: SpanStatus,
    /// Insertion-ordered attributes, capped at [`EVENT_MAX_ATTRIBUTES`].
    pub attributes: Vec<(String, AttributeValue)>,
    pub dropped_attributes: u32,
    /// Propagated W3C tracestate, passed through untouched.
    pub trace_state: Option<String>,
}

impl Span {
    /// Appends an attribute, counting it as dropped once the cap is reached.
    pub fn attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if self.attributes.len() < EVENT_MAX_ATTRIBUTES {
            self.attributes.push((key.into(), value.into()));
        } else {
            self.dropped_attributes += 1;
        }
    }
}

/// A decoded domain event, one per reassembled channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Log(LogRecord),
    Span(Span),
}

impl Event {
    /// The wire class this event travels under.
    pub fn signal(&self) -> pgtel_ipc::Signal {
        match self {
            Event::Log(_) => pgtel_ipc::Signal::Logs,
            Event::Span(_) => pgtel_ipc::Signal::Traces,
        }
    }
}

/// Current wall-clock time as Unix nanoseconds.
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}
