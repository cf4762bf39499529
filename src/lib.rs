pub mod analytics;
pub mod cache;
pub mod config;
pub mod core;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod privacy;
pub mod utils;

pub use analytics::SearchAnalytics;
pub use crate::core::{SuggestionEngine, SuggestionOptions};
pub use error::{AppError, Result};
pub use privacy::{PrivacySettings, PrivacyStore};
