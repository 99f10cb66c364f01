pub mod admission;
pub mod controller;
pub mod dedup;
pub mod discovery;
pub mod normalizer;
pub mod seeds;
pub mod task;
pub mod worker;

#[cfg(test)]
pub mod testing;

// Re-export common types
pub use controller::CrawlerController;
pub use task::{CrawlReport, PageStatus};
