use serde::{Deserialize, Serialize};

/// An entry-point index page and the selector that signals its navigation
/// menu has finished rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTarget {
    pub url: String,
    pub readiness_selector: String,
}

impl SeedTarget {
    pub fn new(url: &str, readiness_selector: &str) -> Self {
        Self {
            url: url.to_string(),
            readiness_selector: readiness_selector.to_string(),
        }
    }
}

/// The fixed set of seeds for a run
#[derive(Debug, Clone, Default)]
pub struct SeedCatalog {
    seeds: Vec<SeedTarget>,
}

impl SeedCatalog {
    /// Duplicate seed URLs are collapsed, keeping the first selector seen.
    pub fn new(seeds: Vec<SeedTarget>) -> Self {
        let mut unique: Vec<SeedTarget> = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if !unique.iter().any(|existing| existing.url == seed.url) {
                unique.push(seed);
            }
        }
        Self { seeds: unique }
    }

    pub fn seeds(&self) -> &[SeedTarget] {
        &self.seeds
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_seeds_are_collapsed() {
        let catalog = SeedCatalog::new(vec![
            SeedTarget::new("https://developer.roku.com/docs/a.md", "#nav"),
            SeedTarget::new("https://developer.roku.com/docs/b.md", "#nav"),
            SeedTarget::new("https://developer.roku.com/docs/a.md", "#other"),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.seeds()[0].readiness_selector, "#nav");
    }
}
