use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of user action captured by the analytics recorder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchEventType {
    Search,
    SuggestionClick,
    FilterApplied,
    Export,
}

impl SearchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEventType::Search => "search",
            SearchEventType::SuggestionClick => "suggestion_click",
            SearchEventType::FilterApplied => "filter_applied",
            SearchEventType::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

static BOOLEAN_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\b(AND|OR|NOT)\b)|["()]|\w:\S"#).expect("static regex")
});

impl QueryComplexity {
    /// Derive complexity from the raw query text.
    ///
    /// Boolean operators, quoted phrases, grouping or field syntax make a query
    /// complex; three or more words or a wildcard make it moderate.
    pub fn classify(query: &str) -> Self {
        let trimmed = query.trim();
        let word_count = trimmed.split_whitespace().count();

        if BOOLEAN_SYNTAX.is_match(trimmed) || word_count > 6 {
            QueryComplexity::Complex
        } else if word_count >= 3 || trimmed.contains('*') {
            QueryComplexity::Moderate
        } else {
            QueryComplexity::Simple
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryComplexity::Simple => "simple",
            QueryComplexity::Moderate => "moderate",
            QueryComplexity::Complex => "complex",
        }
    }
}

/// How the user arrived at the query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Manual,
    History,
    AiSuggestion,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::Manual => "manual",
            SearchSource::History => "history",
            SearchSource::AiSuggestion => "ai_suggestion",
        }
    }
}

/// A recorded search activity. Immutable once built by the recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchEvent {
    pub event_type: SearchEventType,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub query_length: usize,
    pub complexity: QueryComplexity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_count: Option<usize>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SearchSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Caller-supplied part of a search event; the recorder fills in the rest.
#[derive(Debug, Clone)]
pub struct SearchEventInput {
    pub event_type: SearchEventType,
    pub query: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    pub results_count: Option<usize>,
    pub success: bool,
    pub source: Option<SearchSource>,
    pub filters: Option<Vec<String>>,
    pub error_type: Option<String>,
}

impl SearchEventInput {
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            event_type: SearchEventType::Search,
            query: query.into(),
            timestamp: None,
            response_time_ms: None,
            results_count: None,
            success: true,
            source: None,
            filters: None,
            error_type: None,
        }
    }

    pub fn with_event_type(mut self, event_type: SearchEventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_results(mut self, results_count: usize) -> Self {
        self.results_count = Some(results_count);
        self
    }

    pub fn with_source(mut self, source: SearchSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Mark the event as failed with the given error kind
    pub fn failed(mut self, error_type: impl Into<String>) -> Self {
        self.success = false;
        self.error_type = Some(error_type.into());
        self
    }

    pub fn into_event(self) -> SearchEvent {
        SearchEvent {
            event_type: self.event_type,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            query_length: self.query.chars().count(),
            complexity: QueryComplexity::classify(&self.query),
            query: self.query,
            response_time_ms: self.response_time_ms,
            results_count: self.results_count,
            success: self.success,
            source: self.source,
            filters: self.filters,
            error_type: self.error_type,
        }
    }
}

/// Candidate source contributing to a suggestion list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    UserHistory,
    SavedSearch,
    Trending,
    AiSemantic,
}

impl SuggestionSource {
    pub const ALL: [SuggestionSource; 4] = [
        SuggestionSource::UserHistory,
        SuggestionSource::SavedSearch,
        SuggestionSource::Trending,
        SuggestionSource::AiSemantic,
    ];

    /// Share of the final score this source is allowed to contribute
    pub fn weight(&self) -> f64 {
        match self {
            SuggestionSource::UserHistory => 0.4,
            SuggestionSource::SavedSearch => 0.3,
            SuggestionSource::Trending => 0.2,
            SuggestionSource::AiSemantic => 0.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSource::UserHistory => "user_history",
            SuggestionSource::SavedSearch => "saved_search",
            SuggestionSource::Trending => "trending",
            SuggestionSource::AiSemantic => "ai_semantic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user_history" | "history" => Some(SuggestionSource::UserHistory),
            "saved_search" | "saved" => Some(SuggestionSource::SavedSearch),
            "trending" => Some(SuggestionSource::Trending),
            "ai_semantic" | "semantic" | "ai" => Some(SuggestionSource::AiSemantic),
            _ => None,
        }
    }
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Substring,
    Semantic,
}

impl MatchType {
    pub fn base_score(&self) -> f64 {
        match self {
            MatchType::Exact => 100.0,
            MatchType::Fuzzy => 80.0,
            MatchType::Substring => 60.0,
            MatchType::Semantic => 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionMetadata {
    pub match_type: MatchType,
    pub recency_days: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_queries: Option<Vec<String>>,
}

/// A ranked autocomplete candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: String,
    pub query: String,
    pub source: SuggestionSource,
    pub score: f64,
    pub metadata: SuggestionMetadata,
}

/// Entry in the external saved-search registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedSearch {
    pub id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub usage_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}
