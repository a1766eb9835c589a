//! Error types for the export pipeline.

use thiserror::Error;

/// Errors raised while assembling one request's span tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// A completion event named a path that was never recorded. Field end
    /// events may only refer to spans already placed in the tree.
    #[error("no span recorded at path \"{path}\"")]
    PathNotFound {
        /// Dotted rendering of the offending path.
        path: String,
    },

    /// A field end event arrived without a matching start event.
    #[error("field at path \"{path}\" ended without a start event")]
    FieldNotStarted {
        /// Dotted rendering of the offending path.
        path: String,
    },
}

/// Failure of a single report upload, classified for retry.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The collector answered with a 5xx status.
    #[error("collector error {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, for the give-up log line.
        body: String,
    },

    /// The collector answered with a non-2xx, non-5xx status. Retrying
    /// would resend a payload the collector has already refused.
    #[error("collector rejected the report ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for the give-up log line.
        body: String,
    },

    /// Connection, DNS, TLS, or timeout failure before a response arrived.
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// The gzip writer failed while compressing the payload.
    #[error("failed to compress report: {0}")]
    Compress(#[from] std::io::Error),
}

impl UploadError {
    /// Returns `true` for failures worth another attempt.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Network(_))
    }

    /// Returns `true` for failures that must not be retried.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}

/// Errors constructing an [`Exporter`](crate::Exporter).
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The HTTP client could not be built.
    #[error("failed to build upload client: {0}")]
    Client(#[from] reqwest::Error),
}
