//! Request-side ingestion.
//!
//! The serving layer drives three kinds of events per request: request
//! begin and finish, field start/end pairs around each resolver call, and
//! late `resolved` completions for fields whose values materialize after
//! the resolver returned. All per-request scratch lives in an
//! [`ActiveTrace`] handed back at begin and consumed at finish, so nothing
//! leaks between concurrent requests.

use crate::error::TraceError;
use crate::exporter::Exporter;
use crate::tree::{format_path, PathStep, SpanTree};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracewire_report::proto::{Timestamp, Trace};

/// What the serving layer knows about one request.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Operation name, when the request named one.
    pub operation_name: Option<String>,
    /// Query text, ideally normalized.
    pub query: String,
    /// Client identity, when known.
    pub client_name: Option<String>,
    /// Client version, when known.
    pub client_version: Option<String>,
}

/// Builds the signature key a request's trace is batched under.
pub type SignatureFn = dyn Fn(&RequestInfo) -> String + Send + Sync;

/// Mutates a finished trace before it is queued.
pub type DecorateFn = dyn Fn(&mut Trace, &RequestInfo) + Send + Sync;

/// Default signature: `# <operation name or "-">` on the first line, query
/// text after it.
pub fn default_signature(info: &RequestInfo) -> String {
    format!(
        "# {}\n{}",
        info.operation_name.as_deref().unwrap_or("-"),
        info.query
    )
}

struct PendingField {
    field_name: String,
    type_name: String,
    parent_type: String,
    start_offset: u64,
}

struct TraceState {
    tree: SpanTree,
    pending: HashMap<Vec<PathStep>, PendingField>,
}

/// Scratch state for one in-flight request.
///
/// Offsets are measured against a monotonic clock captured at begin, so
/// span timings are immune to wall-clock adjustments mid-request.
pub struct ActiveTrace {
    info: RequestInfo,
    started_at: SystemTime,
    started: Instant,
    state: Mutex<TraceState>,
}

impl ActiveTrace {
    fn new(info: RequestInfo) -> Self {
        Self {
            info,
            started_at: SystemTime::now(),
            started: Instant::now(),
            state: Mutex::new(TraceState {
                tree: SpanTree::new(),
                pending: HashMap::new(),
            }),
        }
    }

    /// Nanoseconds between request begin and `at`.
    fn offset(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.started).as_nanos() as u64
    }

    /// Records that the resolver for the field at `path` began running.
    pub fn field_start(
        &self,
        path: &[PathStep],
        field_name: &str,
        type_name: &str,
        parent_type: &str,
        at: Instant,
    ) {
        let start_offset = self.offset(at);
        self.state.lock().pending.insert(
            path.to_vec(),
            PendingField {
                field_name: field_name.to_string(),
                type_name: type_name.to_string(),
                parent_type: parent_type.to_string(),
                start_offset,
            },
        );
    }

    /// Records that the resolver for the field at `path` returned, placing
    /// the finished span in the tree.
    pub fn field_end(&self, path: &[PathStep], at: Instant) -> Result<(), TraceError> {
        let end_offset = self.offset(at);
        let mut state = self.state.lock();
        let Some(pending) = state.pending.remove(path) else {
            return Err(TraceError::FieldNotStarted {
                path: format_path(path),
            });
        };
        state.tree.add(
            path,
            &pending.field_name,
            &pending.type_name,
            &pending.parent_type,
            pending.start_offset,
            end_offset,
        );
        Ok(())
    }

    /// Extends the span at `path` to `at`, for values that resolved after
    /// the resolver itself returned.
    pub fn field_resolved(&self, path: &[PathStep], at: Instant) -> Result<(), TraceError> {
        let end_offset = self.offset(at);
        let mut state = self.state.lock();
        let node = state.tree.node_mut(path)?;
        node.end_time = end_offset;
        Ok(())
    }

    /// Request details supplied at begin.
    pub fn info(&self) -> &RequestInfo {
        &self.info
    }
}

/// Request-facing surface: owns an exporter handle plus the signature and
/// decoration hooks.
pub struct RequestTracer {
    exporter: Arc<Exporter>,
    signature: Box<SignatureFn>,
    decorate: Option<Box<DecorateFn>>,
}

impl RequestTracer {
    /// A tracer feeding `exporter`, with the default signature and no
    /// decoration.
    pub fn new(exporter: Arc<Exporter>) -> Self {
        Self {
            exporter,
            signature: Box::new(default_signature),
            decorate: None,
        }
    }

    /// Replaces the signature function.
    pub fn with_signature(
        mut self,
        signature: impl Fn(&RequestInfo) -> String + Send + Sync + 'static,
    ) -> Self {
        self.signature = Box::new(signature);
        self
    }

    /// Installs a hook that may fill in trace metadata (client identity,
    /// transport details) before the trace is queued.
    pub fn with_decorator(
        mut self,
        decorate: impl Fn(&mut Trace, &RequestInfo) + Send + Sync + 'static,
    ) -> Self {
        self.decorate = Some(Box::new(decorate));
        self
    }

    /// Starts scratch state for one request.
    pub fn begin_request(&self, info: RequestInfo) -> ActiveTrace {
        ActiveTrace::new(info)
    }

    /// Finishes a request: builds the wire trace, runs the decoration hook,
    /// and queues the result under the request's signature.
    pub fn finish_request(&self, active: ActiveTrace) {
        let duration_ns = active.offset(Instant::now());
        let end_time = SystemTime::now();
        let ActiveTrace {
            info,
            started_at,
            state,
            ..
        } = active;
        let state = state.into_inner();
        if !state.pending.is_empty() {
            tracing::debug!(
                unfinished = state.pending.len(),
                "request finished with field starts that never ended"
            );
        }

        let mut trace = Trace {
            start_time: Some(Timestamp::from(started_at)),
            end_time: Some(Timestamp::from(end_time)),
            duration_ns,
            root: Some(state.tree.root()),
            ..Trace::default()
        };
        if let Some(decorate) = &self.decorate {
            decorate(&mut trace, &info);
        }

        let key = (self.signature)(&info);
        self.exporter.record(&key, &trace);
    }

    /// The exporter behind this tracer.
    pub fn exporter(&self) -> &Arc<Exporter> {
        &self.exporter
    }
}
