pub mod processed;
pub mod raw;

// Re-export common types
pub use processed::MarkdownConverter;
pub use raw::{ArtifactWriter, RawStorage};
