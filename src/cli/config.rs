use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::crawler::seeds::SeedTarget;

const NAV_MENU_FIRST_LINK: &str = "#document-nav-menu > nav:nth-child(1) > div:nth-child(2) > div:nth-child(1) > ul:nth-child(1) > li:nth-child(1) > a:nth-child(1)";
const NAV_MENU_FIRST_NESTED_ITEM: &str = "#document-nav-menu > nav:nth-child(1) > div:nth-child(2) > div:nth-child(1) > ul:nth-child(1) > li:nth-child(1) > div:nth-child(2) > ul:nth-child(1) > li:nth-child(1)";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MirrorConfig {
    pub site: SiteSettings,
    pub seeds: Vec<SeedTarget>,
    pub discovery: DiscoverySettings,
    pub fetch: FetchSettings,
    pub browser: BrowserSettings,
    pub output: OutputSettings,
}

/// Which pages count as part of the mirrored documentation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteSettings {
    pub base_url: String,
    pub docs_segment: String,
}

/// How a seed's own URL is treated in its discovered links
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SeedLinkPolicy {
    /// Keep whatever anchors the seed page carries
    #[default]
    AsDiscovered,
    /// Always add the seed URL to its own links
    Include,
    /// Drop links that canonicalize to the seed itself
    Exclude,
}

/// Link discovery settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiscoverySettings {
    pub readiness_timeout_secs: u64,
    pub seed_links: SeedLinkPolicy,
    /// Script returning an array of every anchor href on the page
    pub link_script: String,
}

/// Per-page fetch protocol settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FetchSettings {
    pub max_concurrent: usize,
    pub content_selector: String,
    /// Element whose class list carries the error marker
    pub container_selector: String,
    pub error_marker: String,
    pub heading_selector: String,
    pub error_placeholder: String,
    pub navigation_timeout_secs: u64,
    pub wait_timeout_secs: u64,
    /// Upper bound for attribute reads, markup reads and script evaluation
    pub script_timeout_secs: u64,
    pub settle_delay_ms: u64,
}

/// Browser settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport: Viewport,
}

/// Browser viewport settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Where artifacts go
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputSettings {
    pub raw_dir: PathBuf,
    pub markdown_dir: PathBuf,
    /// Extension given to raw artifacts, without the dot
    pub storage_extension: String,
    pub report_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            site: SiteSettings {
                base_url: "https://developer.roku.com".to_string(),
                docs_segment: "docs".to_string(),
            },
            seeds: vec![
                SeedTarget::new(
                    "https://developer.roku.com/docs/features/features-overview.md",
                    NAV_MENU_FIRST_LINK,
                ),
                SeedTarget::new(
                    "https://developer.roku.com/docs/specs/specs-overview.md",
                    NAV_MENU_FIRST_LINK,
                ),
                SeedTarget::new(
                    "https://developer.roku.com/docs/developer-program/getting-started/roku-dev-prog.md",
                    NAV_MENU_FIRST_NESTED_ITEM,
                ),
                SeedTarget::new(
                    "https://developer.roku.com/docs/references/references-overview.md",
                    NAV_MENU_FIRST_LINK,
                ),
            ],
            discovery: DiscoverySettings {
                readiness_timeout_secs: 60,
                seed_links: SeedLinkPolicy::AsDiscovered,
                link_script: "return Array.from(document.querySelectorAll('a')).map(a => a.href);"
                    .to_string(),
            },
            fetch: FetchSettings {
                max_concurrent: 10,
                content_selector: ".markdown-body".to_string(),
                container_selector: ".content > div:nth-child(2)".to_string(),
                error_marker: "doc-error".to_string(),
                heading_selector: ".markdown-body > h1:nth-child(1)".to_string(),
                error_placeholder: "Content container has .doc-error class. Scrapping aborted."
                    .to_string(),
                navigation_timeout_secs: 30,
                wait_timeout_secs: 30,
                script_timeout_secs: 10,
                settle_delay_ms: 1000,
            },
            browser: BrowserSettings {
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                viewport: Viewport {
                    width: 1920,
                    height: 1080,
                },
            },
            output: OutputSettings {
                raw_dir: PathBuf::from("output/raw"),
                markdown_dir: PathBuf::from("output/md/docs"),
                storage_extension: "html".to_string(),
                report_file: None,
            },
        }
    }
}

impl DiscoverySettings {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}

impl FetchSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl MirrorConfig {
    /// Get the path to the config directory
    pub fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "docs-mirror", "docs-mirror") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Location of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load `path` if given, else the default file, else built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            debug!("No configuration at {}, using built-in defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<PathBuf> {
        let config_path = Self::default_path();
        self.save_to_file(&config_path)?;
        info!("Configuration written to {}", config_path.display());
        Ok(config_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.site.base_url)
            .context(format!("Invalid base url: {}", self.site.base_url))?;
        if base.host_str().is_none() {
            anyhow::bail!("Base url has no host: {}", self.site.base_url);
        }

        if self.site.docs_segment.trim_matches('/').is_empty() {
            anyhow::bail!("site.docs_segment must not be empty");
        }

        if self.seeds.is_empty() {
            anyhow::bail!("At least one seed is required");
        }

        for seed in &self.seeds {
            if seed.readiness_selector.trim().is_empty() {
                anyhow::bail!("Seed {} has an empty readiness selector", seed.url);
            }
        }

        if self.fetch.max_concurrent == 0 {
            anyhow::bail!("fetch.max_concurrent must be at least 1");
        }

        let timeouts = [
            ("discovery.readiness_timeout_secs", self.discovery.readiness_timeout_secs),
            ("fetch.navigation_timeout_secs", self.fetch.navigation_timeout_secs),
            ("fetch.wait_timeout_secs", self.fetch.wait_timeout_secs),
            ("fetch.script_timeout_secs", self.fetch.script_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.output.storage_extension.trim_start_matches('.').is_empty() {
            anyhow::bail!("output.storage_extension must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MirrorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seeds.len(), 4);
        assert_eq!(config.fetch.max_concurrent, 10);
        assert_eq!(config.discovery.seed_links, SeedLinkPolicy::AsDiscovered);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut config = MirrorConfig::default();
        config.fetch.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_seeds_and_bad_origin_are_rejected() {
        let mut config = MirrorConfig::default();
        config.seeds.clear();
        assert!(config.validate().is_err());

        let mut config = MirrorConfig::default();
        config.site.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = MirrorConfig::default();
        config.fetch.wait_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mirror.yaml");

        let mut config = MirrorConfig::default();
        config.fetch.max_concurrent = 3;
        config.discovery.seed_links = SeedLinkPolicy::Exclude;
        config.save_to_file(&path).unwrap();

        let loaded = MirrorConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.fetch.max_concurrent, 3);
        assert_eq!(loaded.discovery.seed_links, SeedLinkPolicy::Exclude);
        assert_eq!(loaded.seeds[2].url, config.seeds[2].url);
    }

    #[test]
    fn test_seed_link_policy_yaml_names() {
        let policy: SeedLinkPolicy = serde_yaml::from_str("as_discovered").unwrap();
        assert_eq!(policy, SeedLinkPolicy::AsDiscovered);
        let policy: SeedLinkPolicy = serde_yaml::from_str("include").unwrap();
        assert_eq!(policy, SeedLinkPolicy::Include);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MirrorConfig::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }
}
