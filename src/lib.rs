pub mod input_loader;
pub mod expander;
pub mod scraper;
pub mod resume_manager;
pub mod result_writer;
pub mod delay_manager;
pub mod logger;
pub mod config;
pub mod controller;

// Exporting types for convenience
pub use config::Config;
pub use controller::{RunController, RunOutcome, RunState, RunSummary};
pub use expander::Expander;
pub use resume_manager::{Checkpoint, CheckpointStore};
pub use result_writer::{ResultRow, ResultSink};
pub use scraper::{Scraper, ScrapeError, SynonymSource};
