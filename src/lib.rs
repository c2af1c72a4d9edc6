//! Killmark library
//!
//! Killfeed OCR bookmarking and highlight clipping: frame sources (VOD
//! decode or live screen capture), OCR backends, keyword detection with
//! cooldown, append-only session logs, and clip synthesis around the
//! recorded events.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use domain::errors::DomainError;
pub use domain::model::{ClipInterval, ClipOutcome, Event, ScanProgress, ScanState};
pub use error::{KillmarkError, KillmarkResult};
