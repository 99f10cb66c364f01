use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::CrawlError;
use crate::utils::metrics::Metrics;

/// A normalized, in-scope documentation URL.
///
/// Only `UrlNormalizer::canonicalize` builds one, so holding a value means the
/// locale segment and fragment are already gone. Set membership is identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    pub(crate) fn new(url: String) -> Self {
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What fetching one canonical URL produced
#[derive(Debug)]
pub enum PageOutcome {
    /// Serialized markup of the content container
    Content(String),

    /// The site flagged the page as an error page; holds the placeholder text
    ErrorMarker(String),

    /// Navigation, timeout or session failure
    Failure(CrawlError),
}

impl PageOutcome {
    /// Body to persist, if this outcome produces an artifact at all
    pub fn body(&self) -> Option<&str> {
        match self {
            PageOutcome::Content(html) => Some(html),
            PageOutcome::ErrorMarker(placeholder) => Some(placeholder),
            PageOutcome::Failure(_) => None,
        }
    }
}

/// Leading comment of every artifact, recording where it came from.
pub fn provenance_line(source: &CanonicalUrl) -> String {
    format!("<!-- {} -->\n", source)
}

/// A raw page ready to be handed to the artifact writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Path relative to the writer's root
    pub path: PathBuf,

    /// Provenance line followed by the extracted body, untouched
    pub body: String,
}

impl OutputArtifact {
    pub fn new(source: &CanonicalUrl, path: PathBuf, content: &str) -> Self {
        let mut body = provenance_line(source);
        body.push_str(content);
        Self { path, body }
    }
}

/// Terminal state of one URL in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Written,
    ErrorMarker,
    Failed,
}

/// Outcome record for one canonical URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlReport {
    pub url: CanonicalUrl,

    pub status: PageStatus,

    /// Where the artifact landed, when one was written
    pub path: Option<PathBuf>,

    /// Error kind label (e.g. "timeout", "write")
    pub error_kind: Option<String>,

    pub error: Option<String>,

    pub elapsed_ms: u64,
}

impl UrlReport {
    pub fn failed(url: CanonicalUrl, err: &CrawlError, elapsed_ms: u64) -> Self {
        Self {
            url,
            status: PageStatus::Failed,
            path: None,
            error_kind: Some(err.kind().to_string()),
            error: Some(err.to_string()),
            elapsed_ms,
        }
    }
}

/// A seed whose discovery was aborted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFailure {
    pub url: String,
    pub error: String,
}

/// Everything one run did, in a form the CLI can print or persist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub run_id: Uuid,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Number of seeds attempted
    pub seeds: usize,

    pub seed_failures: Vec<SeedFailure>,

    /// Raw links collected across all successful seeds, duplicates included
    pub links_discovered: usize,

    pub rejected_out_of_scope: usize,

    pub rejected_malformed: usize,

    /// Highest number of renderer sessions open at once during the fetch phase
    pub peak_sessions: usize,

    pub pages: Vec<UrlReport>,

    pub metrics: Metrics,
}

impl CrawlReport {
    pub fn count(&self, status: PageStatus) -> usize {
        self.pages.iter().filter(|page| page.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UrlReport> {
        self.pages
            .iter()
            .filter(|page| page.status == PageStatus::Failed)
    }

    /// True when any URL failed. Seed failures alone do not fail the run.
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// True when discovery got nothing from any seed
    pub fn all_seeds_failed(&self) -> bool {
        self.seeds > 0 && self.seed_failures.len() >= self.seeds
    }
}
