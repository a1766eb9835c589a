//! Report delivery.
//!
//! [`ReportSink`] is the seam between the uploader loop and the outside
//! world. [`HttpTransport`] is the production sink: it gzips the encoded
//! report and POSTs it to the collector, retrying transient failures with
//! exponential backoff and reporting only the final outcome to its caller.
//! Alternative sinks (a job queue, a local spool, a test recorder) plug in
//! through the same trait.

use crate::config::ExporterConfig;
use crate::error::UploadError;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use tracewire_report::proto::Report;
use tracewire_report::report;

/// Destination for assembled reports.
///
/// Uses native async fn in traits. For dynamic dispatch, use
/// [`ReportSinkBoxed`], which every `ReportSink` implements automatically.
pub trait ReportSink: Send + Sync {
    /// Delivers one report.
    ///
    /// An `Err` means the report was abandoned after the sink's own retry
    /// policy, if any, ran its course. Callers do not retry on top.
    fn submit(&self, report: Report) -> impl Future<Output = Result<(), UploadError>> + Send;

    /// Short sink name for log lines.
    fn name(&self) -> &str;
}

/// Object-safe form of [`ReportSink`] for dynamic dispatch.
pub trait ReportSinkBoxed: Send + Sync {
    /// Delivers one report, boxed.
    fn submit_boxed(
        &self,
        report: Report,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>>;

    /// Short sink name for log lines.
    fn name(&self) -> &str;
}

impl<T: ReportSink> ReportSinkBoxed for T {
    fn submit_boxed(
        &self,
        report: Report,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
        Box::pin(self.submit(report))
    }

    fn name(&self) -> &str {
        ReportSink::name(self)
    }
}

/// Bounds a single POST. A stalled request classifies as a retryable
/// network failure rather than hanging the uploader.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload client for the collector's trace ingress.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    compress: bool,
    max_attempts: u32,
    min_retry_delay: Duration,
    debug_reports: bool,
}

impl HttpTransport {
    /// Builds the transport from exporter configuration.
    pub fn new(config: &ExporterConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            compress: config.compress,
            max_attempts: config.max_upload_attempts,
            min_retry_delay: config.min_upload_retry_delay,
            debug_reports: config.debug_reports,
        })
    }

    fn encode_body(&self, report: &Report) -> Result<Vec<u8>, UploadError> {
        let wire = report.encode_to_vec();
        if !self.compress {
            return Ok(wire);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&wire)?;
        Ok(encoder.finish()?)
    }

    async fn attempt_upload(&self, body: Vec<u8>) -> Result<(), UploadError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .header(CONTENT_TYPE, "application/protobuf");
        if self.compress {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(UploadError::Server {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl ReportSink for HttpTransport {
    async fn submit(&self, report: Report) -> Result<(), UploadError> {
        if self.debug_reports {
            tracing::info!("sending trace report:\n{}", report::debug_dump(&report));
        }

        let body = match self.encode_body(&report) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(error = %error, "failed to send trace report");
                return Err(error);
            }
        };

        let mut attempt = 0u32;
        loop {
            match self.attempt_upload(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    attempt += 1;
                    if error.is_retryable() && attempt < self.max_attempts {
                        let delay = self
                            .min_retry_delay
                            .saturating_mul(2u32.saturating_pow(attempt));
                        tracing::debug!(
                            error = %error,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "trace report upload failed, will retry"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::warn!(
                            error = %error,
                            attempts = attempt,
                            "failed to send trace report"
                        );
                        return Err(error);
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Prints a one-line summary per report. Useful in demos and local runs
/// where no collector is available.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    async fn submit(&self, report: Report) -> Result<(), UploadError> {
        let traces: usize = report
            .traces_per_query
            .values()
            .map(|traces| traces.trace.len())
            .sum();
        println!(
            "trace report: {} signature(s), {} trace(s)",
            report.traces_per_query.len(),
            traces
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Sink that records every report it is handed.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        reports: Mutex<Vec<Report>>,
    }

    impl RecordingSink {
        pub(crate) fn reports(&self) -> Vec<Report> {
            self.reports.lock().unwrap().clone()
        }

        pub(crate) fn report_count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }
    }

    impl ReportSink for RecordingSink {
        async fn submit(&self, report: Report) -> Result<(), UploadError> {
            self.reports.lock().unwrap().push(report);
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Sink that fails its first `failures` submissions, then records.
    pub(crate) struct FlakySink {
        failures_left: AtomicU32,
        pub(crate) delivered: Mutex<Vec<Report>>,
    }

    impl FlakySink {
        pub(crate) fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReportSink for FlakySink {
        async fn submit(&self, report: Report) -> Result<(), UploadError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                })
                .is_ok()
            {
                return Err(UploadError::Server {
                    status: 503,
                    body: "scripted failure".to_string(),
                });
            }
            self.delivered.lock().unwrap().push(report);
            Ok(())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tracewire_report::proto::Traces;

    fn sample_report() -> Report {
        let mut report = Report {
            header: Some(report::build_header("service:t:x", "current", "", "")),
            ..Report::default()
        };
        report.traces_per_query.insert(
            "# q\n{ posts }".to_string(),
            Traces {
                trace: vec![vec![0x58, 0x2a]],
            },
        );
        report
    }

    #[test]
    fn encoded_body_gunzips_to_the_wire_bytes() {
        let config = ExporterConfig::new("service:t:x");
        let transport = HttpTransport::new(&config).unwrap();
        let report = sample_report();

        let body = transport.encode_body(&report).unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(body.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, report.encode_to_vec());
        assert_ne!(body, report.encode_to_vec());
    }

    #[test]
    fn compression_can_be_disabled() {
        let config = ExporterConfig::new("service:t:x").with_compress(false);
        let transport = HttpTransport::new(&config).unwrap();
        let report = sample_report();

        let body = transport.encode_body(&report).unwrap();
        assert_eq!(body, report.encode_to_vec());
    }

    #[tokio::test]
    async fn console_sink_never_fails() {
        let report = sample_report();
        assert!(ConsoleSink.submit(report).await.is_ok());
        assert_eq!(ReportSink::name(&ConsoleSink), "console");
    }

    #[tokio::test]
    async fn boxed_adapter_forwards_to_the_sink() {
        let sink = testing::RecordingSink::default();
        let boxed: &dyn ReportSinkBoxed = &sink;

        boxed.submit_boxed(sample_report()).await.unwrap();
        assert_eq!(sink.report_count(), 1);
        assert_eq!(boxed.name(), "recording");
    }

    #[tokio::test]
    async fn flaky_sink_scripts_failures_then_delivers() {
        let sink = testing::FlakySink::new(1);
        assert!(sink.submit(sample_report()).await.is_err());
        assert!(sink.submit(sample_report()).await.is_ok());
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }
}
