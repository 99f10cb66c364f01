use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::crawler::task::{PageStatus, UrlReport};

/// Fetch-phase metrics collector
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// In-memory metrics store
    metrics: Arc<Mutex<Metrics>>,
}

/// Metrics data structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Start time of the metrics collection
    pub start_time: DateTime<Utc>,

    /// Pages that reached a terminal outcome
    pub pages_total: usize,

    pub pages_written: usize,

    pub error_markers: usize,

    pub failures: usize,

    /// Failure counts keyed by error kind
    pub failures_by_kind: BTreeMap<String, usize>,

    /// Bytes handed to the artifact writer
    pub bytes_written: usize,

    /// Sum of per-page durations in milliseconds
    pub total_fetch_ms: u64,

    pub slowest_fetch_ms: u64,
}

impl Metrics {
    pub fn average_fetch_ms(&self) -> u64 {
        if self.pages_total == 0 {
            0
        } else {
            self.total_fetch_ms / self.pages_total as u64
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let metrics = Metrics {
            start_time: Utc::now(),
            ..Default::default()
        };

        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    /// Record the terminal outcome of one page
    pub async fn record_page(&self, report: &UrlReport, bytes: usize) {
        let mut metrics = self.metrics.lock().await;

        metrics.pages_total += 1;
        metrics.total_fetch_ms += report.elapsed_ms;
        metrics.slowest_fetch_ms = metrics.slowest_fetch_ms.max(report.elapsed_ms);

        match report.status {
            PageStatus::Written => {
                metrics.pages_written += 1;
                metrics.bytes_written += bytes;
            }
            PageStatus::ErrorMarker => {
                metrics.error_markers += 1;
                metrics.bytes_written += bytes;
            }
            PageStatus::Failed => {
                metrics.failures += 1;
                let kind = report.error_kind.clone().unwrap_or_else(|| "unknown".to_string());
                *metrics.failures_by_kind.entry(kind).or_default() += 1;
            }
        }
    }

    /// Start timing a request
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get all metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    /// Elapsed time in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::CanonicalUrl;
    use crate::error::CrawlError;
    use std::path::PathBuf;

    fn page(status: PageStatus, elapsed_ms: u64) -> UrlReport {
        UrlReport {
            url: CanonicalUrl::new("https://developer.roku.com/docs/a.md".to_string()),
            status,
            path: Some(PathBuf::from("a.html")),
            error_kind: None,
            error: None,
            elapsed_ms,
        }
    }

    #[tokio::test]
    async fn test_record_page_counts_by_status() {
        let collector = MetricsCollector::new();

        collector.record_page(&page(PageStatus::Written, 100), 50).await;
        collector.record_page(&page(PageStatus::ErrorMarker, 300), 10).await;

        let url = CanonicalUrl::new("https://developer.roku.com/docs/b.md".to_string());
        let failed = UrlReport::failed(url, &CrawlError::Renderer("gone".to_string()), 200);
        collector.record_page(&failed, 0).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.pages_total, 3);
        assert_eq!(metrics.pages_written, 1);
        assert_eq!(metrics.error_markers, 1);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.failures_by_kind.get("renderer"), Some(&1));
        assert_eq!(metrics.bytes_written, 60);
        assert_eq!(metrics.slowest_fetch_ms, 300);
        assert_eq!(metrics.average_fetch_ms(), 200);
    }
}
