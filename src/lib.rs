pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hasher;
pub mod model;
pub mod parser;
pub mod progress;
pub mod retry;
pub mod scanner;

pub use config::AppConfig;
pub use engine::{Batch, IngestEngine, IngestResult, Manifest};
pub use error::IngestError;
pub use model::{Category, NormalizedRecord};
pub use progress::{ProgressReporter, SilentReporter};
