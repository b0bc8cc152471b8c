//! Span and trace context management: ID generation, parent/child linkage,
//! and span finalization.

use crate::event::{AttributeValue, Span, SpanKind, SpanStatus, EVENT_MAX_ATTRIBUTES};
use crate::event::unix_nanos;
use rand::Rng;

/// Identifiers binding a span into its trace.
///
/// Spans form a forest: a context points at its parent by value, never by
/// reference, so there is no ownership cycle to manage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub parent_span_id: Option<[u8; 8]>,
    pub trace_state: Option<String>,
}

/// Trace context propagated from outside the process, already decoded by
/// the host (this pipeline does not parse traceparent headers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagatedContext {
    pub trace_id: [u8; 16],
    pub parent_span_id: [u8; 8],
    pub trace_state: Option<String>,
}

/// Starts spans, linking them to a parent span, to propagated context, or
/// to a freshly generated trace.
///
/// IDs come from a non-deterministic source sized to the OTLP requirement
/// (64-bit span IDs, 128-bit trace IDs); uniqueness is probabilistic, which
/// matches the OTLP specification's own tolerance for collision.
#[derive(Debug, Default)]
pub struct Tracer {
    propagated: Option<PropagatedContext>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the externally propagated context used for spans
    /// started without a local parent.
    pub fn set_propagated(&mut self, context: Option<PropagatedContext>) {
        self.propagated = context;
    }

    /// Starts a span.
    ///
    /// With a parent, the child copies the parent's trace ID and records the
    /// parent's span ID; the parent must already be started, which call
    /// order enforces. Without one, propagated context applies if present;
    /// otherwise a new trace ID is synthesized whose low half is this span's
    /// own ID, making the span its own trace root.
    pub fn start(&self, parent: Option<&SpanContext>) -> ActiveSpan {
        let start_time_unix_nano = unix_nanos();
        let mut rng = rand::thread_rng();

        let span_id: [u8; 8] = rng.gen_range(1..=u64::MAX).to_be_bytes();

        let (trace_id, parent_span_id, trace_state, nested) = if let Some(parent) = parent {
            (
                parent.trace_id,
                Some(parent.span_id),
                parent.trace_state.clone(),
                true,
            )
        } else if let Some(propagated) = &self.propagated {
            (
                propagated.trace_id,
                Some(propagated.parent_span_id),
                propagated.trace_state.clone(),
                false,
            )
        } else {
            let mut trace_id = [0u8; 16];
            trace_id[..8].copy_from_slice(&rng.gen::<u64>().to_be_bytes());
            trace_id[8..].copy_from_slice(&span_id);
            (trace_id, None, None, false)
        };

        ActiveSpan {
            context: SpanContext {
                trace_id,
                span_id,
                parent_span_id,
                trace_state,
            },
            start_time_unix_nano,
            name: None,
            kind: None,
            attributes: Vec::new(),
            dropped_attributes: 0,
            nested,
        }
    }
}

/// A span in its Started state. Consumed by [`end`](ActiveSpan::end).
#[derive(Debug)]
pub struct ActiveSpan {
    context: SpanContext,
    start_time_unix_nano: u64,
    name: Option<String>,
    kind: Option<SpanKind>,
    attributes: Vec<(String, AttributeValue)>,
    dropped_attributes: u32,
    nested: bool,
}

impl ActiveSpan {
    /// The identifiers of this span, for starting children.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Sets an explicit name, overriding the operation-derived fallback.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Overrides the nesting-derived span kind.
    pub fn set_kind(&mut self, kind: SpanKind) {
        self.kind = Some(kind);
    }

    /// Appends an attribute, counting it as dropped once the cap is reached.
    pub fn attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if self.attributes.len() < EVENT_MAX_ATTRIBUTES {
            self.attributes.push((key.into(), value.into()));
        } else {
            self.dropped_attributes += 1;
        }
    }

    /// Ends the span: stamps the end time, derives the kind from nesting
    /// (top-level work is a server span, nested work internal), and falls
    /// back to `operation` when no explicit name was set.
    pub fn end(self, operation: &str, status: SpanStatus) -> Span {
        let kind = self.kind.unwrap_or(if self.nested {
            SpanKind::Internal
        } else {
            SpanKind::Server
        });

        Span {
            trace_id: self.context.trace_id,
            span_id: self.context.span_id,
            parent_span_id: self.context.parent_span_id,
            start_time_unix_nano: self.start_time_unix_nano,
            end_time_unix_nano: unix_nanos(),
            name: self.name.unwrap_or_else(|| operation.to_string()),
            kind,
            status,
            attributes: self.attributes,
            dropped_attributes: self.dropped_attributes,
            trace_state: self.context.trace_state,
        }
    }
}
