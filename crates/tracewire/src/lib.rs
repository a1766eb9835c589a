//! Queued, batching trace export.
//!
//! tracewire captures per-request execution traces as trees of timed spans,
//! queues the encoded traces behind a byte bound, and ships them to a
//! collector from one background task with gzip and bounded retry.
//!
//! # Pipeline
//!
//! - [`SpanTree`]: one sparse span tree per request, assembled from
//!   path-addressed field events arriving in any order
//! - [`ExportQueue`]: byte-bounded FIFO between request threads and the
//!   uploader, with edge-triggered backpressure logging
//! - uploader task: wakes every reporting interval (or at once on
//!   shutdown), drains the queue into size-capped reports, and hands each
//!   to the sink
//! - [`HttpTransport`]: gzip plus POST with exponential backoff on 5xx and
//!   network failures; any [`ReportSink`] can stand in for it
//! - [`Exporter`]: the facade owning one queue and uploader pair
//! - [`RequestTracer`] and [`ActiveTrace`]: the request-side callbacks
//!   feeding the pipeline
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use tracewire::{Exporter, ExporterConfig, PathStep, RequestInfo, RequestTracer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = Arc::new(Exporter::new(ExporterConfig::new("service:my-graph:secret"))?);
//! exporter.start();
//! let tracer = RequestTracer::new(Arc::clone(&exporter));
//!
//! let request = tracer.begin_request(RequestInfo {
//!     operation_name: Some("listPosts".to_string()),
//!     query: "{ posts { title } }".to_string(),
//!     ..RequestInfo::default()
//! });
//! let path = [PathStep::field("posts")];
//! request.field_start(&path, "posts", "[Post!]", "Query", Instant::now());
//! request.field_end(&path, Instant::now())?;
//! tracer.finish_request(request);
//!
//! exporter.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod queue;
pub mod shutdown;
pub mod tracer;
pub mod transport;
pub mod tree;

mod uploader;

// Wire types are part of this crate's public surface.
pub use tracewire_report::{proto, report, schema};

pub use config::{ExporterConfig, API_KEY_ENV, DEFAULT_ENDPOINT, SCHEMA_TAG_ENV};
pub use error::{ExporterError, TraceError, UploadError};
pub use exporter::Exporter;
pub use metrics::ExportMetrics;
pub use queue::ExportQueue;
pub use shutdown::ShutdownSignal;
pub use tracer::{default_signature, ActiveTrace, RequestInfo, RequestTracer};
pub use transport::{ConsoleSink, HttpTransport, ReportSink, ReportSinkBoxed};
pub use tree::{format_path, PathStep, SpanTree};
