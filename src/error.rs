use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while discovering, fetching or persisting a page.
///
/// Every variant is recoverable at the task level: the controller turns it
/// into an outcome record instead of aborting the run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("malformed url {url}: {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("renderer session could not be opened: {0}")]
    Session(String),

    #[error("renderer error: {0}")]
    Renderer(String),

    #[error("script result could not be decoded: {0}")]
    Script(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker task aborted: {0}")]
    Aborted(String),
}

impl CrawlError {
    pub fn malformed(url: &str, reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedUrl { .. } => "malformed_url",
            Self::Navigation { .. } => "navigation",
            Self::Timeout { .. } => "timeout",
            Self::Session(_) => "session",
            Self::Renderer(_) => "renderer",
            Self::Script(_) => "script",
            Self::Write { .. } => "write",
            Self::Aborted(_) => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = CrawlError::Timeout {
            what: ".markdown-body".to_string(),
            timeout: Duration::from_secs(20),
        };
        assert_eq!(err.to_string(), "timed out after 20s waiting for .markdown-body");
        assert_eq!(err.kind(), "timeout");

        let err = CrawlError::Write {
            path: PathBuf::from("output/raw/a.html"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("failed to write output/raw/a.html"));
    }
}
