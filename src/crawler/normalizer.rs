use std::path::PathBuf;

use crate::cli::config::SiteSettings;
use crate::crawler::task::CanonicalUrl;
use crate::error::CrawlError;

/// Index of the `docs` segment in a `/`-split URL: `["https:", "", host, "docs", ...]`
const DOCS_SEGMENT_INDEX: usize = 3;

/// Scope filter and canonicalizer for documentation URLs.
///
/// This is not a general URL parser. It expects the fixed shape
/// `origin/[locale/]docs/...` and rejects anything else.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    /// Base origin without trailing slash, e.g. `https://developer.roku.com`
    origin: String,

    /// Path segment every documentation page lives under
    docs_segment: String,
}

impl UrlNormalizer {
    pub fn new(origin: &str, docs_segment: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            docs_segment: docs_segment.trim_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &SiteSettings) -> Self {
        Self::new(&settings.base_url, &settings.docs_segment)
    }

    /// `{origin}/{docs}/`, the prefix every canonical URL starts with
    pub fn docs_root(&self) -> String {
        format!("{}/{}/", self.origin, self.docs_segment)
    }

    /// Whether a raw link belongs to the documentation being mirrored
    pub fn is_in_scope(&self, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }

        let origin_prefix = format!("{}/", self.origin);
        if !url.starts_with(&origin_prefix) {
            return false;
        }

        url.contains(&format!("/{}/", self.docs_segment))
    }

    /// Strip the optional locale segment and the fragment.
    ///
    /// Fails closed with `MalformedUrl` when the URL is too short to carry a
    /// docs segment, or when more than one segment sits between the origin and
    /// the docs segment.
    pub fn canonicalize(&self, url: &str) -> Result<CanonicalUrl, CrawlError> {
        let mut segments: Vec<&str> = url.split('/').collect();

        if segments.len() <= DOCS_SEGMENT_INDEX {
            return Err(CrawlError::malformed(
                url,
                format!("expected at least {} '/'-separated segments", DOCS_SEGMENT_INDEX + 1),
            ));
        }

        if segments[DOCS_SEGMENT_INDEX] != self.docs_segment {
            // locale code such as `en-gb`
            segments.remove(DOCS_SEGMENT_INDEX);
        }

        if segments.get(DOCS_SEGMENT_INDEX) != Some(&self.docs_segment.as_str()) {
            return Err(CrawlError::malformed(
                url,
                format!(
                    "expected '{}' after at most one locale segment",
                    self.docs_segment
                ),
            ));
        }

        let mut canonical = segments.join("/");
        if let Some(anchor) = canonical.find('#') {
            canonical.truncate(anchor);
        }

        Ok(CanonicalUrl::new(canonical))
    }

    /// Scope check followed by canonicalization; `Ok(None)` means out of scope.
    pub fn normalize(&self, url: &str) -> Result<Option<CanonicalUrl>, CrawlError> {
        if !self.is_in_scope(url) {
            return Ok(None);
        }

        self.canonicalize(url).map(Some)
    }

    /// Path of the raw artifact for `url`, relative to the output root.
    ///
    /// Mirrors the segments after `/docs/` and swaps the trailing extension for
    /// `extension`. An empty remainder maps to `index.<extension>`.
    pub fn relative_output_path(
        &self,
        url: &CanonicalUrl,
        extension: &str,
    ) -> Result<PathBuf, CrawlError> {
        let docs_root = self.docs_root();
        let remainder = url
            .as_str()
            .strip_prefix(&docs_root)
            .ok_or_else(|| CrawlError::malformed(url.as_str(), format!("not under {}", docs_root)))?;

        let remainder = remainder.trim_end_matches('/');
        let remainder = if remainder.is_empty() { "index" } else { remainder };

        let mut path = PathBuf::new();
        for segment in remainder.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(CrawlError::malformed(
                    url.as_str(),
                    format!("unsafe path segment '{}'", segment),
                ));
            }
            path.push(segment);
        }

        path.set_extension(extension.trim_start_matches('.'));
        Ok(path)
    }
}
