//! Exporter facade.

use crate::config::ExporterConfig;
use crate::error::ExporterError;
use crate::metrics::ExportMetrics;
use crate::queue::ExportQueue;
use crate::transport::{HttpTransport, ReportSinkBoxed};
use crate::uploader::Uploader;
use prost::Message;
use std::sync::Arc;
use tracewire_report::proto::{ReportHeader, Trace};
use tracewire_report::report;

/// Entry point for recording finished traces and controlling the upload
/// loop.
///
/// One exporter owns one queue and one background uploader. [`record`] is
/// called from request threads and never blocks on I/O; everything slow
/// happens on the uploader task.
///
/// [`record`]: Exporter::record
pub struct Exporter {
    header: ReportHeader,
    queue: Arc<ExportQueue>,
    uploader: Uploader,
    metrics: Arc<ExportMetrics>,
}

impl Exporter {
    /// Builds an exporter that uploads to the configured collector over
    /// HTTP.
    pub fn new(config: ExporterConfig) -> Result<Self, ExporterError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_sink(config, Arc::new(transport)))
    }

    /// Builds an exporter over a caller-supplied sink.
    pub fn with_sink(config: ExporterConfig, sink: Arc<dyn ReportSinkBoxed>) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!("no api key configured, the collector will reject reports");
        }
        let header = report::build_header(
            &config.api_key,
            &config.schema_tag,
            &config.schema_hash,
            &config.service_version,
        );
        let queue = Arc::new(ExportQueue::new(config.resolved_max_queue_bytes()));
        let metrics = Arc::new(ExportMetrics::new());
        let uploader = Uploader::new(
            Arc::clone(&queue),
            sink,
            header.clone(),
            config.reporting_interval,
            config.max_uncompressed_report_size,
            Arc::clone(&metrics),
        );
        Self {
            header,
            queue,
            uploader,
            metrics,
        }
    }

    /// Launches the background uploader. Harmless to call when it is
    /// already running.
    pub fn start(&self) {
        self.uploader.start();
    }

    /// Encodes a finished trace and queues it under the signature `key`.
    ///
    /// Never blocks on I/O and never fails: when the queue is at its byte
    /// bound the trace is dropped and counted instead.
    pub fn record(&self, key: &str, trace: &Trace) {
        let frame = trace.encode_to_vec();
        if self.queue.enqueue(key, frame) {
            self.metrics.record_trace_recorded();
        } else {
            self.metrics.record_trace_dropped();
        }
    }

    /// Waits until queued traces have drained. Returns immediately when the
    /// uploader is not running.
    pub async fn flush(&self) {
        self.uploader.flush().await;
    }

    /// Stops the uploader after a final drain and waits for it to exit.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.uploader.shutdown().await;
    }

    /// Header attached to every report from this exporter.
    pub fn header(&self) -> &ReportHeader {
        &self.header
    }

    /// Pipeline counters.
    pub fn metrics(&self) -> &ExportMetrics {
        &self.metrics
    }
}
