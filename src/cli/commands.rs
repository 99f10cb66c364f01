use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::cli::config::{MirrorConfig, SeedLinkPolicy};
use crate::crawler::{CrawlReport, CrawlerController, PageStatus};
use crate::storage::MarkdownConverter;

/// Command line values that take precedence over the configuration file
#[derive(Debug, Default)]
pub struct CrawlOverrides {
    pub max_concurrent: Option<usize>,
    pub output: Option<PathBuf>,
    pub webdriver_url: Option<String>,
    pub headed: bool,
    pub seed_links: Option<SeedLinkPolicy>,
    pub report: Option<PathBuf>,
}

impl CrawlOverrides {
    pub fn apply(self, config: &mut MirrorConfig) {
        if let Some(max_concurrent) = self.max_concurrent {
            config.fetch.max_concurrent = max_concurrent;
        }

        if let Some(output) = self.output {
            config.output.raw_dir = output;
        }

        if let Some(url) = self.webdriver_url {
            config.browser.webdriver_url = url;
        }

        if self.headed {
            config.browser.headless = false;
        }

        if let Some(policy) = self.seed_links {
            config.discovery.seed_links = policy;
        }

        if let Some(report) = self.report {
            config.output.report_file = Some(report);
        }
    }
}

/// Mirror the documentation site
pub async fn crawl(config_path: Option<PathBuf>, overrides: CrawlOverrides) -> Result<ExitCode> {
    let mut config = MirrorConfig::load(config_path.as_deref())?;
    overrides.apply(&mut config);
    config.validate()?;

    info!(
        "Crawling {} seeds with at most {} sessions into {}",
        config.seeds.len(),
        config.fetch.max_concurrent,
        config.output.raw_dir.display()
    );

    let report_file = config.output.report_file.clone();
    let controller = CrawlerController::with_webdriver(config);
    let report = controller.run().await;

    print_summary(&report);

    if report.all_seeds_failed() {
        warn!("Every seed failed during discovery; nothing was mirrored");
    } else if report.pages.is_empty() {
        warn!("No in-scope links were discovered; nothing was mirrored");
    }

    if let Some(path) = report_file {
        write_report(&report, &path)?;
        info!("Report written to {}", path.display());
    }

    if report.has_failures() {
        for failure in report.failures() {
            error!(
                "{}: {}",
                failure.url,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(report: &CrawlReport) {
    println!("Run: {}", report.run_id);
    println!(
        "Seeds: {}/{} succeeded",
        report.seeds - report.seed_failures.len(),
        report.seeds
    );
    for failure in &report.seed_failures {
        println!("  - {}: {}", failure.url, failure.error);
    }
    println!("Links discovered: {}", report.links_discovered);
    println!("Pages written: {}", report.count(PageStatus::Written));
    println!("Error pages: {}", report.count(PageStatus::ErrorMarker));
    println!("Failed pages: {}", report.count(PageStatus::Failed));
    println!("Peak sessions: {}", report.peak_sessions);
}

/// Persist the run report as pretty JSON
pub fn write_report(report: &CrawlReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let contents = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, contents).context(format!("Failed to write report: {}", path.display()))?;

    Ok(())
}

/// Convert the raw tree to Markdown
pub async fn convert(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let config = MirrorConfig::load(config_path.as_deref())?;

    let raw_dir = input.unwrap_or(config.output.raw_dir);
    let markdown_dir = output.unwrap_or(config.output.markdown_dir);
    let converter = MarkdownConverter::new(&raw_dir, &markdown_dir, &config.output.storage_extension);

    let summary = tokio::task::spawn_blocking(move || converter.convert_all())
        .await
        .context("Conversion task panicked")??;

    println!("Converted: {}", summary.converted);

    if !summary.failed.is_empty() {
        println!("Failed: {}", summary.failed.len());
        for (path, reason) in &summary.failed {
            println!("  - {}: {}", path.display(), reason);
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Show the effective configuration
pub async fn show_config(config_path: Option<PathBuf>) -> Result<ExitCode> {
    let config = MirrorConfig::load(config_path.as_deref())?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;

    println!("Current configuration:");
    println!("{}", yaml);

    Ok(ExitCode::SUCCESS)
}

/// Write the built-in defaults to the user config file
pub async fn init_config(force: bool) -> Result<ExitCode> {
    let path = MirrorConfig::default_path();

    if path.exists() && !force {
        warn!("Configuration already exists at {}", path.display());
        println!("Configuration already exists: {} (use --force to overwrite)", path.display());
        return Ok(ExitCode::FAILURE);
    }

    let path = MirrorConfig::default().save_as_default()?;
    println!("Created default configuration: {}", path.display());

    Ok(ExitCode::SUCCESS)
}

/// Print where the user config file lives
pub async fn config_path() -> Result<ExitCode> {
    println!("{}", MirrorConfig::default_path().display());
    Ok(ExitCode::SUCCESS)
}
