use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::{RendererFactory, WebDriverFactory};
use crate::cli::config::MirrorConfig;
use crate::crawler::admission::AdmissionController;
use crate::crawler::dedup::Deduplicator;
use crate::crawler::discovery::LinkDiscoverer;
use crate::crawler::normalizer::UrlNormalizer;
use crate::crawler::seeds::SeedCatalog;
use crate::crawler::task::{CanonicalUrl, CrawlReport, PageStatus, UrlReport};
use crate::crawler::worker::CrawlWorker;
use crate::error::CrawlError;
use crate::storage::{ArtifactWriter, RawStorage};
use crate::utils::metrics::MetricsCollector;

/// Runs the discovery and fetch phases for one configuration
pub struct CrawlerController {
    catalog: SeedCatalog,
    normalizer: Arc<UrlNormalizer>,
    discoverer: LinkDiscoverer,
    worker: CrawlWorker,
    admission: AdmissionController,
    metrics: MetricsCollector,
    storage_extension: String,
}

impl CrawlerController {
    /// Create a controller over the given renderer and writer
    pub fn new(
        config: MirrorConfig,
        factory: Arc<dyn RendererFactory>,
        writer: Arc<dyn ArtifactWriter>,
    ) -> Self {
        let normalizer = Arc::new(UrlNormalizer::from_settings(&config.site));
        let admission = AdmissionController::new(config.fetch.max_concurrent);
        let metrics = MetricsCollector::new();

        let discoverer = LinkDiscoverer::new(
            factory.clone(),
            normalizer.clone(),
            config.discovery.clone(),
            &config.fetch,
        );

        let worker = CrawlWorker::new(
            factory,
            writer,
            admission.clone(),
            normalizer.clone(),
            config.fetch.clone(),
            &config.output.storage_extension,
            metrics.clone(),
        );

        Self {
            catalog: SeedCatalog::new(config.seeds),
            normalizer,
            discoverer,
            worker,
            admission,
            metrics,
            storage_extension: config.output.storage_extension,
        }
    }

    /// Controller backed by WebDriver sessions and the filesystem writer
    pub fn with_webdriver(config: MirrorConfig) -> Self {
        let factory = Arc::new(WebDriverFactory::new(
            config.browser.clone(),
            config.fetch.navigation_timeout(),
        ));
        let writer = RawStorage::create(&config.output);

        Self::new(config, factory, writer)
    }

    /// Run both phases to completion.
    ///
    /// Per-URL and per-seed failures are recorded in the report, never
    /// propagated.
    pub async fn run(&self) -> CrawlReport {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id)
            .instrument(info_span!("crawl", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid) -> CrawlReport {
        let started_at = Utc::now();

        info!("Discovering links from {} seeds", self.catalog.len());
        let discovery = self.discoverer.discover(&self.catalog).await;
        info!(
            "Discovery finished: {} links from {}/{} seeds",
            discovery.links.len(),
            discovery.succeeded,
            self.catalog.len()
        );

        let dedup = Deduplicator::new(&self.normalizer).collect(&discovery.links);
        info!(
            "{} unique pages to fetch ({} duplicates, {} out of scope, {} malformed)",
            dedup.urls.len(),
            dedup.duplicates,
            dedup.rejected_out_of_scope,
            dedup.rejected_malformed
        );

        let (urls, collisions) = self.claim_output_paths(dedup.urls);
        if !collisions.is_empty() {
            warn!("{} pages share an output path with another page", collisions.len());
        }
        for report in &collisions {
            self.metrics.record_page(report, 0).await;
        }

        let mut pages = self.fetch_all(urls).await;
        pages.extend(collisions);
        let metrics = self.metrics.get_metrics().await;

        let report = CrawlReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            seeds: self.catalog.len(),
            seed_failures: discovery.failures,
            links_discovered: discovery.links.len(),
            rejected_out_of_scope: dedup.rejected_out_of_scope,
            rejected_malformed: dedup.rejected_malformed,
            peak_sessions: self.admission.peak(),
            pages,
            metrics,
        };

        info!(
            "Crawl finished: {} written, {} error pages, {} failed (peak {} sessions, avg {} ms/page)",
            report.count(PageStatus::Written),
            report.count(PageStatus::ErrorMarker),
            report.count(PageStatus::Failed),
            report.peak_sessions,
            report.metrics.average_fetch_ms()
        );

        report
    }

    /// Give every output path to exactly one URL.
    ///
    /// URLs are visited in lexical order so the same URL wins on every run.
    /// The losers are reported as failed instead of overwriting its artifact.
    fn claim_output_paths(
        &self,
        urls: HashSet<CanonicalUrl>,
    ) -> (Vec<CanonicalUrl>, Vec<UrlReport>) {
        let mut urls: Vec<CanonicalUrl> = urls.into_iter().collect();
        urls.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let mut claimed: HashMap<PathBuf, CanonicalUrl> = HashMap::new();
        let mut accepted = Vec::with_capacity(urls.len());
        let mut rejected = Vec::new();

        for url in urls {
            let path = match self
                .normalizer
                .relative_output_path(&url, &self.storage_extension)
            {
                Ok(path) => path,
                // The worker reports unsafe paths itself
                Err(_) => {
                    accepted.push(url);
                    continue;
                }
            };

            match claimed.get(&path) {
                Some(owner) => {
                    warn!("{} maps to {}, already claimed by {}", url, path.display(), owner);
                    let err = CrawlError::malformed(
                        url.as_str(),
                        format!("output path {} already claimed by {}", path.display(), owner),
                    );
                    rejected.push(UrlReport::failed(url, &err, 0));
                }
                None => {
                    claimed.insert(path, url.clone());
                    accepted.push(url);
                }
            }
        }

        (accepted, rejected)
    }

    /// Spawn one worker per URL and wait for every one of them
    async fn fetch_all(&self, urls: Vec<CanonicalUrl>) -> Vec<UrlReport> {
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let worker = self.worker.clone();
            let task_url = url.clone();
            let handle = tokio::spawn(async move { worker.process(task_url).await });
            handles.push((url, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Worker for {} aborted: {}", url, e);
                    let err = CrawlError::Aborted(e.to_string());
                    reports.push(UrlReport::failed(url, &err, 0));
                }
            }
        }

        reports
    }
}
