pub mod cancellation;
pub mod ranking;
pub mod search_suggestions;
pub mod sources;

pub use search_suggestions::{SuggestionEngine, SuggestionOptions};
