//! The two execution shapes of the export pipeline.
//!
//! [`Pipeline`] is the single-owner polling form: one caller alternately
//! feeds it channel bytes and flushes whatever batches are ready. It takes
//! no locks and spawns nothing, which makes it the right shape for tests
//! and for hosts that already run their own scheduling loop.
//!
//! [`Collector`] wraps a `Pipeline` in a tokio consumer task: producers
//! hold cheap [`Emitter`] handles and push framed events over an unbounded
//! channel, the task reassembles and batches them, flushes on a timer, and
//! runs each export in its own task behind a concurrency limit so a slow
//! remote collector never stalls ingestion.

use crate::config::Configuration;
use crate::event::{Event, LogRecord, Span};
use crate::exporter::Transport;
use crate::metrics::PipelineMetrics;
use crate::proto::{self, ProtoLogRecord, ProtoSpan};
use crate::queue::BatchQueue;
use crate::resource::ResourceRegistry;
use pgtel_ipc::{frame, Reassembler, Signal};
use prost::Message;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Maximum exports in flight at once under a [`Collector`].
const MAX_CONCURRENT_EXPORTS: usize = 4;

/// Single-consumer export pipeline: reassembly, batching, and flush under
/// one owner.
pub struct Pipeline {
    config: Configuration,
    reassembler: Reassembler,
    logs: BatchQueue<ProtoLogRecord>,
    traces: BatchQueue<ProtoSpan>,
    metrics: Arc<PipelineMetrics>,
    rejected_seen: u64,
}

impl Pipeline {
    pub fn new(config: Configuration) -> Self {
        Self::with_metrics(config, Arc::new(PipelineMetrics::default()))
    }

    pub(crate) fn with_metrics(config: Configuration, metrics: Arc<PipelineMetrics>) -> Self {
        let snapshot = ResourceRegistry::from_config(&config).snapshot();
        let logs = BatchQueue::new(config.batch_max, config.queue_max, snapshot.clone());
        let traces = BatchQueue::new(config.batch_max, config.queue_max, snapshot);
        Self {
            config,
            reassembler: Reassembler::new(),
            logs,
            traces,
            metrics,
            rejected_seen: 0,
        }
    }

    /// Shared counters for this pipeline.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Feeds raw channel bytes in; every message they complete is decoded
    /// and queued for its event class.
    ///
    /// Metrics-class payloads are valid on the wire but have no queue;
    /// they are discarded here. Undecodable and overflowing records become
    /// drop counts, never errors.
    pub fn ingest(&mut self, input: &[u8]) {
        let Self {
            reassembler,
            logs,
            traces,
            metrics,
            ..
        } = self;

        reassembler.push(input, |signal, payload| {
            let accepted = match signal {
                Signal::Logs => logs.append_payload(payload),
                Signal::Traces => traces.append_payload(payload),
                Signal::Metrics => {
                    debug!(len = payload.len(), "discarding metrics-class payload");
                    return;
                }
            };
            if accepted {
                metrics.record_enqueued();
            } else {
                metrics.record_dropped(1);
            }
        });

        let rejected = self.reassembler.rejected();
        for _ in self.rejected_seen..rejected {
            self.metrics.record_rejected_frame();
        }
        self.rejected_seen = rejected;
    }

    /// Pops the next non-empty batch and renders it as a ready-to-send
    /// request: the signal URL and the serialized protobuf body.
    ///
    /// Logs drain before traces. Batches that hold only drop counts are
    /// consumed silently.
    pub fn next_export(&mut self) -> Option<(String, Vec<u8>)> {
        while let Some(batch) = self.logs.take_head() {
            if batch.is_empty() {
                continue;
            }
            let body = proto::logs_request(&batch).encode_to_vec();
            return Some((self.config.signal_url(Signal::Logs), body));
        }
        while let Some(batch) = self.traces.take_head() {
            if batch.is_empty() {
                continue;
            }
            let body = proto::trace_request(&batch).encode_to_vec();
            return Some((self.config.signal_url(Signal::Traces), body));
        }
        None
    }

    /// Sends every queued batch through `transport`, one attempt each.
    ///
    /// A batch is gone once it leaves the queue; delivery failures are
    /// logged and counted but never retried.
    pub async fn flush(&mut self, transport: &impl Transport) {
        while let Some((url, body)) = self.next_export() {
            let result = transport.post(&url, body).await;
            if let Err(ref err) = result {
                warn!(url, error = %err, "export failed, batch discarded");
            }
            self.metrics.record_export(&result);
        }
    }

    /// Applies a new configuration: endpoint, limits, and resource
    /// attributes all take effect for batches formed after this call.
    /// Batches already queued keep the snapshot they were formed under.
    pub fn reload(&mut self, config: Configuration) {
        let snapshot = ResourceRegistry::from_config(&config).snapshot();
        self.logs.set_resource(snapshot.clone());
        self.logs.set_limits(config.batch_max, config.queue_max);
        self.traces.set_resource(snapshot);
        self.traces.set_limits(config.batch_max, config.queue_max);
        self.config = config;
        info!("pipeline configuration reloaded");
    }

    /// Records currently queued across both classes.
    pub fn queued(&self) -> usize {
        self.logs.queued() + self.traces.queued()
    }

    /// True when no buffered bytes, partial messages, or batches remain.
    pub fn is_idle(&self) -> bool {
        self.reassembler.is_idle() && self.logs.is_empty() && self.traces.is_empty()
    }
}

/// Producer handle onto a [`Collector`].
///
/// Cloning is cheap; all clones of one emitter share a sender identity on
/// the channel. Emitting never blocks and never fails: once the collector
/// is gone, events fall on the floor.
#[derive(Clone)]
pub struct Emitter {
    sender_id: u32,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Emitter {
    pub fn emit_log(&self, record: &LogRecord) {
        self.send(Signal::Logs, proto::encode_log_record(record));
    }

    pub fn emit_span(&self, span: &Span) {
        self.send(Signal::Traces, proto::encode_span(span));
    }

    pub fn emit(&self, event: &Event) {
        match event {
            Event::Log(record) => self.emit_log(record),
            Event::Span(span) => self.emit_span(span),
        }
    }

    fn send(&self, signal: Signal, payload: Vec<u8>) {
        if payload.is_empty() {
            return;
        }
        let mut wire = Vec::with_capacity(payload.len() + frame::HEADER_SIZE);
        frame::write_message(&mut wire, self.sender_id, signal, &payload);
        // A closed channel means the collector shut down first; the event
        // is dropped, matching the never-block contract.
        let _ = self.tx.send(wire);
    }
}

/// Handle to the spawned consumer task.
///
/// Dropping the handle without calling [`shutdown`](Collector::shutdown)
/// still stops the task: it drains whatever is already queued, flushes,
/// and exits.
pub struct Collector {
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    reload_tx: watch::Sender<Configuration>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    metrics: Arc<PipelineMetrics>,
    next_sender: AtomicU32,
}

impl Collector {
    /// Spawns the consumer task onto the current tokio runtime.
    ///
    /// The task alternates between ingesting framed events, flushing on
    /// the configured interval, and applying configuration reloads, until
    /// shutdown or until every emitter handle is gone.
    pub fn spawn<T: Transport + 'static>(config: Configuration, transport: T) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (reload_tx, reload_rx) = watch::channel(config.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let metrics = Arc::new(PipelineMetrics::default());

        let pipeline = Pipeline::with_metrics(config, Arc::clone(&metrics));
        let task = tokio::spawn(consumer_loop(
            pipeline,
            Arc::new(transport),
            input_rx,
            reload_rx,
            shutdown_rx,
        ));

        Self {
            input_tx,
            reload_tx,
            shutdown_tx,
            task,
            metrics,
            next_sender: AtomicU32::new(1),
        }
    }

    /// Creates a producer handle with a fresh sender identity.
    pub fn register(&self) -> Emitter {
        Emitter {
            sender_id: self.next_sender.fetch_add(1, Ordering::Relaxed),
            tx: self.input_tx.clone(),
        }
    }

    /// Pushes a new configuration to the consumer task.
    pub fn reload(&self, config: Configuration) {
        let _ = self.reload_tx.send(config);
    }

    /// Shared counters for the pipeline behind this collector.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Signals shutdown and waits for the task to drain and flush.
    ///
    /// Events already on the channel when shutdown is signalled are still
    /// ingested and exported; events emitted afterwards are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "collector task panicked during shutdown");
        }
    }
}

async fn consumer_loop(
    mut pipeline: Pipeline,
    transport: Arc<impl Transport + 'static>,
    mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut reload_rx: watch::Receiver<Configuration>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut flush_tick = tokio::time::interval(pipeline.config.flush_interval());
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut exports: JoinSet<()> = JoinSet::new();
    let limit = Arc::new(Semaphore::new(MAX_CONCURRENT_EXPORTS));

    loop {
        tokio::select! {
            chunk = input_rx.recv() => match chunk {
                Some(bytes) => pipeline.ingest(&bytes),
                // Every emitter and the collector handle are gone.
                None => break,
            },
            _ = flush_tick.tick() => {
                spawn_exports(&mut pipeline, &transport, &mut exports, &limit).await;
            }
            changed = reload_rx.changed() => {
                if changed.is_ok() {
                    let config = reload_rx.borrow_and_update().clone();
                    flush_tick = tokio::time::interval(config.flush_interval());
                    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    pipeline.reload(config);
                }
            }
            _ = &mut shutdown_rx => {
                debug!("collector shutting down, draining channel");
                while let Ok(bytes) = input_rx.try_recv() {
                    pipeline.ingest(&bytes);
                }
                break;
            }
        }

        // Reap finished export tasks without waiting on the stragglers.
        while exports.try_join_next().is_some() {}
    }

    spawn_exports(&mut pipeline, &transport, &mut exports, &limit).await;
    while exports.join_next().await.is_some() {}
}

/// Moves every ready batch into its own export task, bounded by `limit`.
async fn spawn_exports(
    pipeline: &mut Pipeline,
    transport: &Arc<impl Transport + 'static>,
    exports: &mut JoinSet<()>,
    limit: &Arc<Semaphore>,
) {
    while let Some((url, body)) = pipeline.next_export() {
        let Ok(permit) = Arc::clone(limit).acquire_owned().await else {
            // The semaphore is never closed; nothing to do if it were.
            return;
        };
        let transport = Arc::clone(transport);
        let metrics = Arc::clone(pipeline.metrics());
        exports.spawn(async move {
            let result = transport.post(&url, body).await;
            if let Err(ref err) = result {
                warn!(url, error = %err, "export failed, batch discarded");
            }
            metrics.record_export(&result);
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use crate::exporter::ExportError;
    use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
    use std::sync::Mutex;

    struct RecordingTransport {
        posts: Mutex<Vec<(String, Vec<u8>)>>,
        fail_with: Option<u16>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                posts: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                posts: Mutex::new(Vec::new()),
                fail_with: Some(status),
            }
        }
    }

    impl Transport for RecordingTransport {
        async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), ExportError> {
            self.posts.lock().unwrap().push((url.to_string(), body));
            match self.fail_with {
                Some(status) => Err(ExportError::Status(status)),
                None => Ok(()),
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn framed_log(sender: u32, severity: Severity, body: &str) -> Vec<u8> {
        let payload = proto::encode_log_record(&LogRecord::new(severity, body));
        let mut wire = Vec::new();
        frame::write_message(&mut wire, sender, Signal::Logs, &payload);
        wire
    }

    #[tokio::test]
    async fn ingest_then_flush_exports_one_logs_request() {
        let mut pipeline = Pipeline::new(Configuration::default());
        pipeline.ingest(&framed_log(1, Severity::Info, "connection received"));
        pipeline.ingest(&framed_log(2, Severity::Error, "deadlock detected"));
        assert_eq!(pipeline.queued(), 2);

        let transport = RecordingTransport::new();
        pipeline.flush(&transport).await;

        assert!(pipeline.is_idle());
        assert_eq!(pipeline.metrics().batches_exported(), 1);

        let posts = transport.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.ends_with("/v1/logs"));
        let request = ExportLogsServiceRequest::decode(posts[0].1.as_slice()).unwrap();
        let records = &request.resource_logs[0].scope_logs[0].log_records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].severity_number, 9);
        assert_eq!(records[1].severity_number, 17);
    }

    #[tokio::test]
    async fn failed_export_still_discards_the_batch() {
        let mut pipeline = Pipeline::new(Configuration::default());
        pipeline.ingest(&framed_log(1, Severity::Warning, "checkpoint slow"));

        let transport = RecordingTransport::failing(503);
        pipeline.flush(&transport).await;

        assert!(pipeline.is_idle());
        assert_eq!(pipeline.metrics().export_errors(), 1);
        assert_eq!(pipeline.metrics().batches_exported(), 0);
        // One attempt, no retry.
        assert_eq!(transport.posts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn metrics_class_payloads_are_discarded() {
        let mut pipeline = Pipeline::new(Configuration::default());
        let mut wire = Vec::new();
        frame::write_message(&mut wire, 7, Signal::Metrics, &[1, 2, 3]);
        pipeline.ingest(&wire);

        assert_eq!(pipeline.queued(), 0);
        assert!(pipeline.is_idle());
    }

    #[tokio::test]
    async fn reload_moves_the_endpoint_for_new_batches() {
        let mut pipeline = Pipeline::new(Configuration::default());
        let mut config = Configuration::default();
        config.endpoint = "http://otel.internal:4318".to_string();
        config.service_name = "replica".to_string();
        pipeline.reload(config);

        pipeline.ingest(&framed_log(1, Severity::Info, "after reload"));
        let (url, body) = pipeline.next_export().unwrap();
        assert_eq!(url, "http://otel.internal:4318/v1/logs");

        let request = ExportLogsServiceRequest::decode(body.as_slice()).unwrap();
        let resource = request.resource_logs[0].resource.as_ref().unwrap();
        assert!(resource
            .attributes
            .iter()
            .any(|kv| kv.key == "service.name"));
    }

    #[tokio::test]
    async fn corrupted_frames_count_without_poisoning_later_events() {
        let mut pipeline = Pipeline::new(Configuration::default());
        let mut wire = framed_log(1, Severity::Info, "lost to corruption");
        wire[0] = 0x55;
        wire.extend_from_slice(&framed_log(1, Severity::Info, "survives"));
        pipeline.ingest(&wire);

        assert_eq!(pipeline.metrics().frames_rejected(), 1);
        assert_eq!(pipeline.queued(), 1);
    }

    #[tokio::test]
    async fn collector_shutdown_drains_pending_events() {
        let transport = Arc::new(RecordingTransport::new());
        let collector = Collector::spawn(Configuration::default(), Arc::clone(&transport));
        let emitter = collector.register();

        for i in 0..5 {
            emitter.emit_log(&LogRecord::new(Severity::Info, format!("event {i}")));
        }
        let metrics = Arc::clone(collector.metrics());
        collector.shutdown().await;

        assert_eq!(metrics.records_enqueued(), 5);
        assert_eq!(metrics.batches_exported(), 1);
        let posts = transport.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        let request = ExportLogsServiceRequest::decode(posts[0].1.as_slice()).unwrap();
        assert_eq!(
            request.resource_logs[0].scope_logs[0].log_records.len(),
            5
        );
    }

    #[tokio::test]
    async fn emitting_after_shutdown_is_silently_dropped() {
        let transport = Arc::new(RecordingTransport::new());
        let collector = Collector::spawn(Configuration::default(), Arc::clone(&transport));
        let emitter = collector.register();
        collector.shutdown().await;

        emitter.emit_log(&LogRecord::new(Severity::Info, "too late"));
        assert!(transport.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn registered_emitters_get_distinct_sender_ids() {
        let collector = Collector::spawn(Configuration::default(), RecordingTransport::new());
        let a = collector.register();
        let b = collector.register();
        assert_ne!(a.sender_id, b.sender_id);
        assert_ne!(a.sender_id, 0);
        collector.shutdown().await;
    }
}
