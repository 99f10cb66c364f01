use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::browser::{self, bounded, Renderer, RendererFactory};
use crate::cli::config::{DiscoverySettings, FetchSettings, SeedLinkPolicy};
use crate::crawler::normalizer::UrlNormalizer;
use crate::crawler::seeds::{SeedCatalog, SeedTarget};
use crate::crawler::task::SeedFailure;
use crate::error::CrawlError;

/// Links collected from every seed once all discovery tasks have finished
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Raw hrefs from all successful seeds, duplicates included
    pub links: Vec<String>,

    pub succeeded: usize,

    pub failures: Vec<SeedFailure>,
}

/// Message sent by each seed task to the collector
struct SeedReport {
    seed: SeedTarget,
    result: Result<Vec<String>, CrawlError>,
}

/// Opens every seed page in its own renderer session and collects its links
#[derive(Clone)]
pub struct LinkDiscoverer {
    factory: Arc<dyn RendererFactory>,
    normalizer: Arc<UrlNormalizer>,
    settings: DiscoverySettings,
    navigation_timeout: Duration,
    script_timeout: Duration,
}

impl LinkDiscoverer {
    pub fn new(
        factory: Arc<dyn RendererFactory>,
        normalizer: Arc<UrlNormalizer>,
        settings: DiscoverySettings,
        fetch: &FetchSettings,
    ) -> Self {
        Self {
            factory,
            normalizer,
            settings,
            navigation_timeout: fetch.navigation_timeout(),
            script_timeout: fetch.script_timeout(),
        }
    }

    /// Run one task per seed and wait for all of them.
    ///
    /// Returns only after every seed task has either reported links or failed.
    /// A failing seed contributes nothing; the others are unaffected.
    pub async fn discover(&self, catalog: &SeedCatalog) -> DiscoveryResult {
        if catalog.is_empty() {
            warn!("No seeds to discover links from");
            return DiscoveryResult::default();
        }

        let (tx, mut rx) = mpsc::channel::<SeedReport>(catalog.len());
        let mut handles = Vec::with_capacity(catalog.len());

        for seed in catalog.seeds().iter().cloned() {
            let tx = tx.clone();
            let discoverer = self.clone();
            let url = seed.url.clone();

            let handle = tokio::spawn(async move {
                info!("Started discovery on seed: {}", seed.url);
                let result = discoverer.discover_seed(&seed).await;
                let _ = tx.send(SeedReport { seed, result }).await;
            });
            handles.push((url, handle));
        }

        // The channel closes once the last task drops its sender
        drop(tx);

        let mut outcome = DiscoveryResult::default();
        while let Some(report) = rx.recv().await {
            match report.result {
                Ok(links) => {
                    info!(
                        "Finished discovery on seed: {} ({} links)",
                        report.seed.url,
                        links.len()
                    );
                    outcome.succeeded += 1;
                    outcome.links.extend(links);
                }
                Err(e) => {
                    warn!("Discovery failed on seed {}: {}", report.seed.url, e);
                    outcome.failures.push(SeedFailure {
                        url: report.seed.url,
                        error: e.to_string(),
                    });
                }
            }
        }

        let (urls, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (url, joined) in urls.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                error!("Discovery task for {} aborted: {}", url, e);
                outcome.failures.push(SeedFailure {
                    url,
                    error: format!("discovery task aborted: {}", e),
                });
            }
        }

        outcome
    }

    /// Discover a single seed in a dedicated session
    pub async fn discover_seed(&self, seed: &SeedTarget) -> Result<Vec<String>, CrawlError> {
        let (session, ()) =
            browser::open_within(self.factory.clone(), self.navigation_timeout, ()).await?;

        let result = self.collect_links(session.as_ref(), seed).await;

        if let Err(e) = browser::close_within(session, self.script_timeout, ()).await {
            warn!("Failed to close discovery session for {}: {}", seed.url, e);
        }

        let links = result?;
        Ok(self.apply_seed_policy(seed, links))
    }

    async fn collect_links(
        &self,
        renderer: &dyn Renderer,
        seed: &SeedTarget,
    ) -> Result<Vec<String>, CrawlError> {
        bounded(
            self.navigation_timeout,
            &format!("navigation to {}", seed.url),
            renderer.navigate(&seed.url),
        )
        .await?;

        browser::wait_visible(
            renderer,
            &seed.readiness_selector,
            self.settings.readiness_timeout(),
        )
        .await?;
        debug!("Seed {} is ready", seed.url);

        let value = bounded(
            self.script_timeout,
            "link collection script",
            renderer.evaluate(&self.settings.link_script),
        )
        .await?;

        let hrefs = value.as_array().ok_or_else(|| {
            CrawlError::Script(format!("expected an array of hrefs, got {}", value))
        })?;

        Ok(hrefs
            .iter()
            .filter_map(|href| href.as_str().map(str::to_string))
            .collect())
    }

    fn apply_seed_policy(&self, seed: &SeedTarget, mut links: Vec<String>) -> Vec<String> {
        match self.settings.seed_links {
            SeedLinkPolicy::AsDiscovered => {}
            SeedLinkPolicy::Include => links.push(seed.url.clone()),
            SeedLinkPolicy::Exclude => {
                if let Ok(Some(own)) = self.normalizer.normalize(&seed.url) {
                    links.retain(|link| match self.normalizer.normalize(link) {
                        Ok(Some(canonical)) => canonical != own,
                        _ => true,
                    });
                }
            }
        }
        links
    }
}
