//! Conversions between domain events and OTLP protobuf messages, and
//! assembly of per-batch export requests.
//!
//! The channel payload for an event is its packed OTLP message: producers
//! encode with [`encode_log_record`]/[`encode_span`], and the consumer side
//! decodes straight into the generated types, so a batch holds records in
//! exactly the form the export request needs.

use crate::event::{AttributeValue, LogRecord, Span, SpanKind, SpanStatus};
use crate::queue::Batch;
use crate::resource::ResourceSnapshot;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord as RawLogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::span::SpanKind as RawSpanKind;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span as RawSpan, Status};
use prost::Message;

/// The OTLP log record type batches hold.
pub type ProtoLogRecord = RawLogRecord;

/// The OTLP span type batches hold.
pub type ProtoSpan = RawSpan;

fn to_any_value(value: &AttributeValue) -> AnyValue {
    let value = match value {
        AttributeValue::Str(s) => any_value::Value::StringValue(s.clone()),
        AttributeValue::Int(i) => any_value::Value::IntValue(*i),
        AttributeValue::Bool(b) => any_value::Value::BoolValue(*b),
    };
    AnyValue { value: Some(value) }
}

fn key_values(attributes: &[(String, AttributeValue)]) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: Some(to_any_value(value)),
        })
        .collect()
}

fn scope() -> InstrumentationScope {
    InstrumentationScope {
        name: crate::LIBRARY.to_string(),
        version: crate::VERSION.to_string(),
        ..Default::default()
    }
}

fn resource(snapshot: &ResourceSnapshot) -> Resource {
    Resource {
        attributes: key_values(snapshot.attributes()),
        dropped_attributes_count: snapshot.dropped(),
        ..Default::default()
    }
}

/// Converts a domain log record into its OTLP form.
pub fn to_proto_log(record: &LogRecord) -> ProtoLogRecord {
    ProtoLogRecord {
        time_unix_nano: record.time_unix_nano,
        observed_time_unix_nano: record.observed_time_unix_nano,
        severity_number: record.severity.number(),
        severity_text: record.severity.text().to_string(),
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(record.body.clone())),
        }),
        attributes: key_values(&record.attributes),
        dropped_attributes_count: record.dropped_attributes,
        ..Default::default()
    }
}

/// Converts a finished domain span into its OTLP form.
pub fn to_proto_span(span: &Span) -> ProtoSpan {
    let kind = match span.kind {
        SpanKind::Internal => RawSpanKind::Internal,
        SpanKind::Server => RawSpanKind::Server,
        SpanKind::Client => RawSpanKind::Client,
        SpanKind::Producer => RawSpanKind::Producer,
        SpanKind::Consumer => RawSpanKind::Consumer,
    };
    let status = match span.status {
        SpanStatus::Unset => None,
        SpanStatus::Ok => Some(Status {
            code: StatusCode::Ok as i32,
            ..Default::default()
        }),
        SpanStatus::Error => Some(Status {
            code: StatusCode::Error as i32,
            ..Default::default()
        }),
    };

    ProtoSpan {
        trace_id: span.trace_id.to_vec(),
        span_id: span.span_id.to_vec(),
        parent_span_id: span
            .parent_span_id
            .map(|id| id.to_vec())
            .unwrap_or_default(),
        trace_state: span.trace_state.clone().unwrap_or_default(),
        name: span.name.clone(),
        kind: kind as i32,
        start_time_unix_nano: span.start_time_unix_nano,
        end_time_unix_nano: span.end_time_unix_nano,
        attributes: key_values(&span.attributes),
        dropped_attributes_count: span.dropped_attributes,
        status,
        ..Default::default()
    }
}

/// Packs a log record into its channel payload.
pub fn encode_log_record(record: &LogRecord) -> Vec<u8> {
    to_proto_log(record).encode_to_vec()
}

/// Packs a span into its channel payload.
pub fn encode_span(span: &Span) -> Vec<u8> {
    to_proto_span(span).encode_to_vec()
}

/// Builds the export request for one batch of log records: one resource
/// entry carrying the batch's snapshot, one scope block, records in
/// insertion order.
pub fn logs_request(batch: &Batch<ProtoLogRecord>) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(resource(batch.resource())),
            scope_logs: vec![ScopeLogs {
                scope: Some(scope()),
                log_records: batch.records().to_vec(),
                schema_url: crate::SCHEMA_URL.to_string(),
            }],
            schema_url: crate::SCHEMA_URL.to_string(),
        }],
    }
}

/// Builds the export request for one batch of spans.
pub fn trace_request(batch: &Batch<ProtoSpan>) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(resource(batch.resource())),
            scope_spans: vec![ScopeSpans {
                scope: Some(scope()),
                spans: batch.records().to_vec(),
                schema_url: crate::SCHEMA_URL.to_string(),
            }],
            schema_url: crate::SCHEMA_URL.to_string(),
        }],
    }
}
