//! Exporter configuration.

use std::time::Duration;

/// Default collector ingress for trace reports.
pub const DEFAULT_ENDPOINT: &str = "https://engine-report.apollodata.com/api/ingress/traces";

/// Environment variable read by [`ExporterConfig::from_env`] for the API
/// key.
pub const API_KEY_ENV: &str = "ENGINE_API_KEY";

/// Environment variable read by [`ExporterConfig::from_env`] for the schema
/// tag.
pub const SCHEMA_TAG_ENV: &str = "ENGINE_SCHEMA_TAG";

/// Tuning for one exporter instance.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Credential sent as `X-Api-Key`. The collector rejects uploads
    /// without one.
    pub api_key: String,

    /// Collector URL reports are POSTed to.
    ///
    /// Default: [`DEFAULT_ENDPOINT`]
    pub endpoint: String,

    /// Gzip report payloads.
    ///
    /// Default: `true`
    pub compress: bool,

    /// How long the uploader sleeps between drains.
    ///
    /// Default: 5 seconds
    pub reporting_interval: Duration,

    /// Report size cap: a drained batch stops growing once its uncompressed
    /// size reaches this many bytes.
    ///
    /// Default: 4 MiB
    pub max_uncompressed_report_size: usize,

    /// Queue bound in bytes; traces recorded past it are dropped.
    ///
    /// Default: `None`, resolved to 10x `max_uncompressed_report_size` when
    /// the exporter is built.
    pub max_queue_bytes: Option<usize>,

    /// Upload attempts per report before giving up.
    ///
    /// Default: 5
    pub max_upload_attempts: u32,

    /// Base retry delay; the wait before retry `n` is this doubled `n`
    /// times.
    ///
    /// Default: 100 milliseconds
    pub min_upload_retry_delay: Duration,

    /// Log a readable JSON dump of every report before sending it.
    ///
    /// Default: `false`
    pub debug_reports: bool,

    /// Schema variant reports are filed under.
    ///
    /// Default: `"current"`
    pub schema_tag: String,

    /// Schema digest reported in the header, usually from
    /// [`schema::digest`](tracewire_report::schema::digest).
    ///
    /// Default: empty
    pub schema_hash: String,

    /// Service version reported in the header.
    ///
    /// Default: empty
    pub service_version: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            compress: true,
            reporting_interval: Duration::from_secs(5),
            max_uncompressed_report_size: 4 * 1024 * 1024,
            max_queue_bytes: None,
            max_upload_attempts: 5,
            min_upload_retry_delay: Duration::from_millis(100),
            debug_reports: false,
            schema_tag: "current".to_string(),
            schema_hash: String::new(),
            service_version: String::new(),
        }
    }
}

impl ExporterConfig {
    /// Configuration with the given API key and defaults everywhere else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Configuration from `ENGINE_API_KEY` and `ENGINE_SCHEMA_TAG`, with
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            config.api_key = api_key;
        }
        if let Ok(schema_tag) = std::env::var(SCHEMA_TAG_ENV) {
            config.schema_tag = schema_tag;
        }
        config
    }

    /// Queue bound with the 10x-report-size default applied.
    pub fn resolved_max_queue_bytes(&self) -> usize {
        self.max_queue_bytes
            .unwrap_or(10 * self.max_uncompressed_report_size)
    }

    /// Sets the collector URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Enables or disables gzip.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the drain interval.
    pub fn with_reporting_interval(mut self, interval: Duration) -> Self {
        self.reporting_interval = interval;
        self
    }

    /// Sets the uncompressed report size cap.
    pub fn with_max_uncompressed_report_size(mut self, bytes: usize) -> Self {
        self.max_uncompressed_report_size = bytes;
        self
    }

    /// Sets an explicit queue bound.
    pub fn with_max_queue_bytes(mut self, bytes: usize) -> Self {
        self.max_queue_bytes = Some(bytes);
        self
    }

    /// Sets the attempts-per-report bound.
    pub fn with_max_upload_attempts(mut self, attempts: u32) -> Self {
        self.max_upload_attempts = attempts;
        self
    }

    /// Sets the base retry delay.
    pub fn with_min_upload_retry_delay(mut self, delay: Duration) -> Self {
        self.min_upload_retry_delay = delay;
        self
    }

    /// Enables or disables the pre-send report dump.
    pub fn with_debug_reports(mut self, debug_reports: bool) -> Self {
        self.debug_reports = debug_reports;
        self
    }

    /// Sets the schema tag.
    pub fn with_schema_tag(mut self, schema_tag: impl Into<String>) -> Self {
        self.schema_tag = schema_tag.into();
        self
    }

    /// Sets the schema digest.
    pub fn with_schema_hash(mut self, schema_hash: impl Into<String>) -> Self {
        self.schema_hash = schema_hash.into();
        self
    }

    /// Sets the service version.
    pub fn with_service_version(mut self, service_version: impl Into<String>) -> Self {
        self.service_version = service_version.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ExporterConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.compress);
        assert_eq!(config.reporting_interval, Duration::from_secs(5));
        assert_eq!(config.max_uncompressed_report_size, 4 * 1024 * 1024);
        assert_eq!(config.max_queue_bytes, None);
        assert_eq!(config.max_upload_attempts, 5);
        assert_eq!(config.min_upload_retry_delay, Duration::from_millis(100));
        assert!(!config.debug_reports);
        assert_eq!(config.schema_tag, "current");
    }

    #[test]
    fn queue_bound_defaults_to_ten_reports() {
        let config = ExporterConfig::default().with_max_uncompressed_report_size(1000);
        assert_eq!(config.resolved_max_queue_bytes(), 10_000);

        let explicit = config.with_max_queue_bytes(42);
        assert_eq!(explicit.resolved_max_queue_bytes(), 42);
    }

    #[test]
    fn builders_chain() {
        let config = ExporterConfig::new("service:g:s")
            .with_endpoint("http://localhost:4000/traces")
            .with_compress(false)
            .with_reporting_interval(Duration::from_millis(250))
            .with_max_upload_attempts(2)
            .with_schema_tag("staging")
            .with_service_version("1.2.3");

        assert_eq!(config.api_key, "service:g:s");
        assert_eq!(config.endpoint, "http://localhost:4000/traces");
        assert!(!config.compress);
        assert_eq!(config.reporting_interval, Duration::from_millis(250));
        assert_eq!(config.max_upload_attempts, 2);
        assert_eq!(config.schema_tag, "staging");
        assert_eq!(config.service_version, "1.2.3");
    }
}
