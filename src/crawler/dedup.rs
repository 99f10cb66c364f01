use std::collections::HashSet;
use tracing::debug;

use crate::crawler::normalizer::UrlNormalizer;
use crate::crawler::task::CanonicalUrl;

/// Canonical URL set built from the raw link pool
#[derive(Debug, Default)]
pub struct DedupResult {
    /// No defined order; fetch order may vary between runs
    pub urls: HashSet<CanonicalUrl>,

    pub rejected_out_of_scope: usize,

    pub rejected_malformed: usize,

    /// In-scope links that collapsed into an existing entry
    pub duplicates: usize,
}

/// Collapses raw links into unique canonical URLs
pub struct Deduplicator<'a> {
    normalizer: &'a UrlNormalizer,
}

impl<'a> Deduplicator<'a> {
    pub fn new(normalizer: &'a UrlNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn collect<I, S>(&self, links: I) -> DedupResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result = DedupResult::default();

        for link in links {
            let link = link.as_ref();

            if !self.normalizer.is_in_scope(link) {
                result.rejected_out_of_scope += 1;
                continue;
            }

            match self.normalizer.canonicalize(link) {
                Ok(canonical) => {
                    if !result.urls.insert(canonical) {
                        result.duplicates += 1;
                    }
                }
                Err(e) => {
                    debug!("Dropping link: {}", e);
                    result.rejected_malformed += 1;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse_to_one_entry() {
        let normalizer = UrlNormalizer::new("https://developer.roku.com", "docs");
        let links = vec![
            "https://developer.roku.com/docs/a.md",
            "https://developer.roku.com/en-gb/docs/a.md",
            "https://developer.roku.com/docs/a.md#install",
            "https://developer.roku.com/docs/b.md",
            "",
            "https://developer.roku.com/about",
            "https://other.com/docs/a.md",
            "https://developer.roku.com/x/y/docs/c.md",
        ];

        let result = Deduplicator::new(&normalizer).collect(links);

        assert_eq!(result.urls.len(), 2);
        assert_eq!(result.duplicates, 2);
        assert_eq!(result.rejected_out_of_scope, 3);
        assert_eq!(result.rejected_malformed, 1);

        let a = normalizer.canonicalize("https://developer.roku.com/docs/a.md").unwrap();
        assert!(result.urls.contains(&a));
    }

    #[test]
    fn test_empty_pool() {
        let normalizer = UrlNormalizer::new("https://developer.roku.com", "docs");
        let result = Deduplicator::new(&normalizer).collect(Vec::<String>::new());
        assert!(result.urls.is_empty());
    }
}
