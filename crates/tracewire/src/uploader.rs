//! Background drain loop.
//!
//! One task per exporter wakes every reporting interval, or immediately on
//! shutdown, and moves everything queued to the sink in size-capped
//! reports. Sink failures are counted and logged by the sink itself; the
//! loop never stops draining because a report was lost.

use crate::metrics::ExportMetrics;
use crate::queue::ExportQueue;
use crate::shutdown::ShutdownSignal;
use crate::transport::ReportSinkBoxed;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracewire_report::proto::ReportHeader;
use tracewire_report::report;

/// How often `flush` re-checks the queue.
const FLUSH_POLL: Duration = Duration::from_millis(100);

/// Owns the background task that moves queued traces to the sink.
pub(crate) struct Uploader {
    queue: Arc<ExportQueue>,
    sink: Arc<dyn ReportSinkBoxed>,
    header: ReportHeader,
    reporting_interval: Duration,
    max_report_size: usize,
    shutdown: ShutdownSignal,
    metrics: Arc<ExportMetrics>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Uploader {
    pub(crate) fn new(
        queue: Arc<ExportQueue>,
        sink: Arc<dyn ReportSinkBoxed>,
        header: ReportHeader,
        reporting_interval: Duration,
        max_report_size: usize,
        metrics: Arc<ExportMetrics>,
    ) -> Self {
        Self {
            queue,
            sink,
            header,
            reporting_interval,
            max_report_size,
            shutdown: ShutdownSignal::new(),
            metrics,
            task: Mutex::new(None),
        }
    }

    /// Launches the drain loop. A second call while the loop is alive is a
    /// no-op.
    pub(crate) fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let queue = Arc::clone(&self.queue);
        let sink = Arc::clone(&self.sink);
        let header = self.header.clone();
        let shutdown = self.shutdown.clone();
        let metrics = Arc::clone(&self.metrics);
        let interval = self.reporting_interval;
        let max_report_size = self.max_report_size;

        *task = Some(tokio::spawn(async move {
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                sink = sink.name(),
                "trace uploader started"
            );
            loop {
                let fired = shutdown.wait_timeout(interval).await;
                drain_and_send(&queue, sink.as_ref(), &header, max_report_size, &metrics).await;
                if fired {
                    break;
                }
            }
            // Catches traces recorded between the last drain and the
            // signal.
            drain_and_send(&queue, sink.as_ref(), &header, max_report_size, &metrics).await;
            tracing::info!("trace uploader stopped");
        }));
    }

    /// Fires the shutdown signal and waits for the loop to finish its final
    /// drain. Safe to call again once joined.
    pub(crate) async fn shutdown(&self) {
        self.shutdown.signal();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "trace uploader task failed");
            }
        }
    }

    /// Waits until the queue is empty. Returns immediately when the
    /// uploader is not running, since the queue would never drain.
    pub(crate) async fn flush(&self) {
        while !self.queue.is_empty() {
            if !self.is_running() {
                return;
            }
            tokio::time::sleep(FLUSH_POLL).await;
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Drains the queue completely, one size-capped report at a time.
async fn drain_and_send(
    queue: &ExportQueue,
    sink: &dyn ReportSinkBoxed,
    header: &ReportHeader,
    max_report_size: usize,
    metrics: &ExportMetrics,
) {
    loop {
        let batch = queue.drain_batch(max_report_size);
        if batch.is_empty() {
            return;
        }
        let report = report::assemble(header.clone(), batch);
        match sink.submit_boxed(report).await {
            Ok(()) => metrics.record_report_sent(),
            Err(error) => {
                metrics.record_report_failed();
                tracing::debug!(error = %error, "trace report abandoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{FlakySink, RecordingSink};

    fn uploader(
        queue: Arc<ExportQueue>,
        sink: Arc<dyn ReportSinkBoxed>,
        interval: Duration,
        max_report_size: usize,
    ) -> Uploader {
        Uploader::new(
            queue,
            sink,
            ReportHeader::default(),
            interval,
            max_report_size,
            Arc::new(ExportMetrics::new()),
        )
    }

    #[tokio::test]
    async fn drains_everything_on_shutdown() {
        let queue = Arc::new(ExportQueue::new(10_000));
        for index in 0..3u8 {
            assert!(queue.enqueue("k", vec![index]));
        }
        let sink = Arc::new(RecordingSink::default());
        let uploader = uploader(
            Arc::clone(&queue),
            sink.clone(),
            Duration::from_secs(600),
            10_000,
        );

        uploader.start();
        assert!(uploader.is_running());
        uploader.shutdown().await;

        assert!(!uploader.is_running());
        assert!(queue.is_empty());
        assert_eq!(sink.report_count(), 1);
        assert_eq!(sink.reports()[0].traces_per_query["k"].trace.len(), 3);
    }

    #[tokio::test]
    async fn splits_drains_into_size_capped_reports() {
        let queue = Arc::new(ExportQueue::new(10_000));
        for _ in 0..3 {
            // 10 bytes per entry with the one-byte key.
            assert!(queue.enqueue("k", vec![0u8; 9]));
        }
        let sink = Arc::new(RecordingSink::default());
        let uploader = uploader(
            Arc::clone(&queue),
            sink.clone(),
            Duration::from_secs(600),
            11,
        );

        uploader.start();
        uploader.shutdown().await;

        // 10 + 10 >= 11 caps the first report at two traces.
        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].traces_per_query["k"].trace.len(), 2);
        assert_eq!(reports[1].traces_per_query["k"].trace.len(), 1);
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_drain() {
        let queue = Arc::new(ExportQueue::new(10_000));
        for _ in 0..2 {
            assert!(queue.enqueue("k", vec![0u8; 9]));
        }
        let sink = Arc::new(FlakySink::new(1));
        let metrics = Arc::new(ExportMetrics::new());
        let uploader = Uploader::new(
            Arc::clone(&queue),
            sink.clone(),
            ReportHeader::default(),
            Duration::from_secs(600),
            5,
            Arc::clone(&metrics),
        );

        uploader.start();
        uploader.shutdown().await;

        // First single-trace report failed, second was still attempted.
        assert!(queue.is_empty());
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(metrics.reports_failed(), 1);
        assert_eq!(metrics.reports_sent(), 1);
    }

    #[tokio::test]
    async fn start_twice_keeps_one_task() {
        let queue = Arc::new(ExportQueue::new(10_000));
        assert!(queue.enqueue("k", vec![1]));
        let sink = Arc::new(RecordingSink::default());
        let uploader = uploader(
            Arc::clone(&queue),
            sink.clone(),
            Duration::from_secs(600),
            10_000,
        );

        uploader.start();
        uploader.start();
        uploader.shutdown().await;

        // One final drain, one report; a second task would have sent two.
        assert_eq!(sink.report_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let queue = Arc::new(ExportQueue::new(10_000));
        let sink = Arc::new(RecordingSink::default());
        let uploader = uploader(queue, sink, Duration::from_secs(600), 10_000);

        uploader.start();
        uploader.shutdown().await;
        uploader.shutdown().await;
        assert!(!uploader.is_running());
    }

    #[tokio::test]
    async fn flush_returns_at_once_when_never_started() {
        let queue = Arc::new(ExportQueue::new(10_000));
        assert!(queue.enqueue("k", vec![1]));
        let sink = Arc::new(RecordingSink::default());
        let uploader = uploader(queue, sink, Duration::from_secs(600), 10_000);

        tokio::time::timeout(Duration::from_secs(1), uploader.flush())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn periodic_drain_runs_without_shutdown() {
        let queue = Arc::new(ExportQueue::new(10_000));
        assert!(queue.enqueue("k", vec![1]));
        let sink = Arc::new(RecordingSink::default());
        let uploader = uploader(
            Arc::clone(&queue),
            sink.clone(),
            Duration::from_millis(20),
            10_000,
        );

        uploader.start();
        uploader.flush().await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.report_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        uploader.shutdown().await;
        assert_eq!(sink.report_count(), 1);
    }
}
