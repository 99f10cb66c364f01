use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::browser::{self, bounded, Renderer, RendererFactory};
use crate::cli::config::FetchSettings;
use crate::crawler::admission::AdmissionController;
use crate::crawler::normalizer::UrlNormalizer;
use crate::crawler::task::{CanonicalUrl, OutputArtifact, PageOutcome, PageStatus, UrlReport};
use crate::error::CrawlError;
use crate::storage::ArtifactWriter;
use crate::utils::metrics::MetricsCollector;

/// Where a worker is in the per-page protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Start,
    Navigated,
    ContentReady,
    ErrorDetected,
    Extracted,
    Written,
    Done,
    Failed,
}

/// Whether the container's class list carries the site's error marker
pub fn has_error_marker(classes: &str, marker: &str) -> bool {
    classes.split_whitespace().any(|class| class == marker)
}

/// Fetches one canonical URL at a time and hands the result to the writer.
///
/// Cheap to clone; the controller gives every task its own copy.
#[derive(Clone)]
pub struct CrawlWorker {
    factory: Arc<dyn RendererFactory>,
    writer: Arc<dyn ArtifactWriter>,
    admission: AdmissionController,
    normalizer: Arc<UrlNormalizer>,
    settings: Arc<FetchSettings>,
    storage_extension: String,
    metrics: MetricsCollector,
}

impl CrawlWorker {
    pub fn new(
        factory: Arc<dyn RendererFactory>,
        writer: Arc<dyn ArtifactWriter>,
        admission: AdmissionController,
        normalizer: Arc<UrlNormalizer>,
        settings: FetchSettings,
        storage_extension: &str,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            factory,
            writer,
            admission,
            normalizer,
            settings: Arc::new(settings),
            storage_extension: storage_extension.to_string(),
            metrics,
        }
    }

    /// Fetch, extract and persist `url`. Never fails: every error ends up in
    /// the returned report.
    pub async fn process(&self, url: CanonicalUrl) -> UrlReport {
        info!("Started: {}", url);

        let (report, bytes) = match self
            .normalizer
            .relative_output_path(&url, &self.storage_extension)
        {
            Ok(path) => {
                let (outcome, elapsed_ms) = self.fetch(&url).await;
                self.persist(url, path, outcome, elapsed_ms).await
            }
            Err(e) => (UrlReport::failed(url, &e, 0), 0),
        };

        match report.status {
            PageStatus::Failed => warn!(
                "Failed: {} ({})",
                report.url,
                report.error.as_deref().unwrap_or("unknown error")
            ),
            _ => info!("Finished: {}", report.url),
        }

        self.metrics.record_page(&report, bytes).await;
        report
    }

    /// Run the page protocol inside an admitted renderer session and return
    /// the outcome with the milliseconds spent once admitted.
    ///
    /// The admission permit travels with the session and is released only
    /// after the session is gone, even when opening or closing overruns its
    /// timeout.
    pub async fn fetch(&self, url: &CanonicalUrl) -> (PageOutcome, u64) {
        let permit = match self.admission.acquire().await {
            Ok(permit) => permit,
            Err(e) => return (PageOutcome::Failure(e), 0),
        };
        let timer = self.metrics.start_timer();

        let (session, permit) = match browser::open_within(
            self.factory.clone(),
            self.settings.navigation_timeout(),
            permit,
        )
        .await
        {
            Ok(opened) => opened,
            Err(e) => return (PageOutcome::Failure(e), timer.end()),
        };

        let outcome = self.run_protocol(session.as_ref(), url).await;
        let elapsed_ms = timer.end();

        if let Err(e) =
            browser::close_within(session, self.settings.script_timeout(), permit).await
        {
            warn!("Failed to close session for {}: {}", url, e);
        }

        (outcome, elapsed_ms)
    }

    /// Drive an already-open renderer through the readiness and
    /// error-detection steps for `url`.
    pub async fn run_protocol(&self, renderer: &dyn Renderer, url: &CanonicalUrl) -> PageOutcome {
        let mut state = WorkerState::Start;

        match self.drive(renderer, url, &mut state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("{}: {:?} -> {:?}", url, state, WorkerState::Failed);
                PageOutcome::Failure(e)
            }
        }
    }

    async fn drive(
        &self,
        renderer: &dyn Renderer,
        url: &CanonicalUrl,
        state: &mut WorkerState,
    ) -> Result<PageOutcome, CrawlError> {
        let settings = &self.settings;

        bounded(
            settings.navigation_timeout(),
            &format!("navigation to {}", url),
            renderer.navigate(url.as_str()),
        )
        .await?;
        advance(state, WorkerState::Navigated, url);

        browser::wait_visible(renderer, &settings.content_selector, settings.wait_timeout()).await?;

        // Client-side rendering has no single "loaded" signal
        tokio::time::sleep(settings.settle_delay()).await;

        let classes = bounded(
            settings.script_timeout(),
            &settings.container_selector,
            renderer.read_attribute(&settings.container_selector, "class"),
        )
        .await?;

        if has_error_marker(&classes, &settings.error_marker) {
            advance(state, WorkerState::ErrorDetected, url);
            warn!("Content container of {} is marked '{}'", url, settings.error_marker);
            advance(state, WorkerState::Extracted, url);
            return Ok(PageOutcome::ErrorMarker(settings.error_placeholder.clone()));
        }

        browser::wait_visible(renderer, &settings.heading_selector, settings.wait_timeout()).await?;
        advance(state, WorkerState::ContentReady, url);

        let html = bounded(
            settings.script_timeout(),
            &settings.content_selector,
            renderer.read_inner_html(&settings.content_selector),
        )
        .await?;
        advance(state, WorkerState::Extracted, url);

        Ok(PageOutcome::Content(html))
    }

    async fn persist(
        &self,
        url: CanonicalUrl,
        path: PathBuf,
        outcome: PageOutcome,
        elapsed_ms: u64,
    ) -> (UrlReport, usize) {
        let status = match &outcome {
            PageOutcome::Content(_) => PageStatus::Written,
            PageOutcome::ErrorMarker(_) => PageStatus::ErrorMarker,
            PageOutcome::Failure(e) => return (UrlReport::failed(url, e, elapsed_ms), 0),
        };

        let body = outcome.body().unwrap_or_default();
        let artifact = OutputArtifact::new(&url, path, body);

        match self.writer.write(&artifact).await {
            Ok(written) => {
                let mut state = WorkerState::Extracted;
                advance(&mut state, WorkerState::Written, &url);
                advance(&mut state, WorkerState::Done, &url);

                let report = UrlReport {
                    url,
                    status,
                    path: Some(written),
                    error_kind: None,
                    error: None,
                    elapsed_ms,
                };
                (report, artifact.body.len())
            }
            Err(e) => (UrlReport::failed(url, &e, elapsed_ms), 0),
        }
    }
}

fn advance(state: &mut WorkerState, next: WorkerState, url: &CanonicalUrl) {
    debug!("{}: {:?} -> {:?}", url, state, next);
    *state = next;
}
