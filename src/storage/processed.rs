use anyhow::{Context, Result};
use jwalk::WalkDir;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of converting a raw tree
#[derive(Debug, Default)]
pub struct ConversionSummary {
    pub converted: usize,

    /// Files that could not be converted, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// Turns the raw HTML tree into a parallel Markdown tree
pub struct MarkdownConverter {
    raw_dir: PathBuf,
    markdown_dir: PathBuf,
    /// Extension of raw artifacts, without the dot
    source_extension: String,
}

impl MarkdownConverter {
    pub fn new(raw_dir: &Path, markdown_dir: &Path, source_extension: &str) -> Self {
        Self {
            raw_dir: raw_dir.to_path_buf(),
            markdown_dir: markdown_dir.to_path_buf(),
            source_extension: source_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Convert every raw artifact. A file that fails is recorded and skipped.
    pub fn convert_all(&self) -> Result<ConversionSummary> {
        if !self.raw_dir.is_dir() {
            anyhow::bail!("Raw directory not found: {}", self.raw_dir.display());
        }

        info!(
            "Converting {} -> {}",
            self.raw_dir.display(),
            self.markdown_dir.display()
        );

        let mut summary = ConversionSummary::default();

        for entry in WalkDir::new(&self.raw_dir).sort(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    summary.failed.push((self.raw_dir.clone(), e.to_string()));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.source_extension.as_str()) {
                continue;
            }

            match self.convert_file(&path) {
                Ok(destination) => {
                    debug!("Converted {} -> {}", path.display(), destination.display());
                    summary.converted += 1;
                }
                Err(e) => {
                    warn!("Failed to convert {}: {:#}", path.display(), e);
                    summary.failed.push((path, format!("{:#}", e)));
                }
            }
        }

        Ok(summary)
    }

    /// Convert one raw artifact and return the Markdown file's path
    pub fn convert_file(&self, source: &Path) -> Result<PathBuf> {
        let relative = source
            .strip_prefix(&self.raw_dir)
            .context(format!("{} is outside {}", source.display(), self.raw_dir.display()))?;

        let mut destination = self.markdown_dir.join(relative);
        destination.set_extension("md");

        let raw = fs::read_to_string(source)
            .context(format!("Failed to read raw file: {}", source.display()))?;
        let markdown = render_markdown(&raw)?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        fs::write(&destination, markdown)
            .context(format!("Failed to write file: {}", destination.display()))?;

        Ok(destination)
    }
}

/// Split off the leading `<!-- url -->` line, if present
pub fn split_provenance(raw: &str) -> (Option<&str>, &str) {
    if !raw.starts_with("<!--") {
        return (None, raw);
    }

    match raw.find('\n') {
        Some(end) if raw[..end].trim_end().ends_with("-->") => {
            (Some(raw[..end].trim_end()), &raw[end + 1..])
        }
        None if raw.trim_end().ends_with("-->") => (Some(raw.trim_end()), ""),
        _ => (None, raw),
    }
}

/// Convert a raw artifact to Markdown, keeping its provenance line on top
pub fn render_markdown(raw: &str) -> Result<String> {
    let (provenance, body) = split_provenance(raw);

    let markdown = htmd::convert(body).context("Failed to convert HTML to Markdown")?;
    let markdown = markdown.trim();

    Ok(match provenance {
        Some(line) => format!("{}\n\n{}\n", line, markdown),
        None => format!("{}\n", markdown),
    })
}
