//! Collaborators feeding candidate strings to the suggestion engine.

use crate::error::SuggestionError;
use crate::models::SavedSearch;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub type SourceResult<T> = std::result::Result<T, SuggestionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavedSearchSort {
    Usage,
    Recent,
    Alphabetical,
}

/// Read-only view of the user's saved searches
#[async_trait]
pub trait SavedSearchRegistry: Send + Sync {
    async fn get_all_searches(&self, sort: SavedSearchSort) -> SourceResult<Vec<SavedSearch>>;
}

/// Popularity-ranked candidates for a prefix, most popular first
#[async_trait]
pub trait TrendingProvider: Send + Sync {
    async fn trending(&self, prefix: &str, cancel: &CancellationToken) -> SourceResult<Vec<String>>;
}

/// Related terms for a single query word, most relevant first
#[async_trait]
pub trait SemanticProvider: Send + Sync {
    async fn related(&self, word: &str, cancel: &CancellationToken) -> SourceResult<Vec<String>>;
}

/// Saved searches held in memory
#[derive(Default)]
pub struct InMemorySavedSearches {
    searches: RwLock<Vec<SavedSearch>>,
}

impl InMemorySavedSearches {
    pub fn new(searches: Vec<SavedSearch>) -> Self {
        Self {
            searches: RwLock::new(searches),
        }
    }

    pub fn add(&self, search: SavedSearch) {
        if let Ok(mut searches) = self.searches.write() {
            searches.push(search);
        }
    }

    /// Bump the usage counter of the search with `id`. Returns whether it exists.
    pub fn record_use(&self, id: &str) -> bool {
        let Ok(mut searches) = self.searches.write() else {
            return false;
        };
        match searches.iter_mut().find(|s| s.id == id) {
            Some(search) => {
                search.usage_count = search.usage_count.saturating_add(1);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SavedSearchRegistry for InMemorySavedSearches {
    async fn get_all_searches(&self, sort: SavedSearchSort) -> SourceResult<Vec<SavedSearch>> {
        let mut searches = self
            .searches
            .read()
            .map_err(|_| SuggestionError::Source {
                name: "saved_search".to_string(),
                message: "registry lock poisoned".to_string(),
            })?
            .clone();

        match sort {
            SavedSearchSort::Usage => searches.sort_by(|a, b| b.usage_count.cmp(&a.usage_count)),
            SavedSearchSort::Recent => searches.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SavedSearchSort::Alphabetical => {
                searches.sort_by(|a, b| a.query.to_lowercase().cmp(&b.query.to_lowercase()))
            }
        }
        Ok(searches)
    }
}

/// Research topics served as trending when no live feed is configured
const POPULAR_RESEARCH_QUERIES: &[&str] = &[
    "machine learning",
    "large language models",
    "climate change",
    "quantum computing",
    "crispr gene editing",
    "protein folding",
    "neural networks",
    "renewable energy",
    "machine translation",
    "dark matter",
];

/// Fixed popularity list filtered by prefix
#[derive(Debug, Clone, Default)]
pub struct StaticTrending {
    ranked: Vec<String>,
}

impl StaticTrending {
    pub fn new<I, S>(ranked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ranked: ranked.into_iter().map(Into::into).collect(),
        }
    }

    pub fn popular_research() -> Self {
        Self::new(POPULAR_RESEARCH_QUERIES.iter().copied())
    }
}

#[async_trait]
impl TrendingProvider for StaticTrending {
    async fn trending(&self, prefix: &str, cancel: &CancellationToken) -> SourceResult<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(SuggestionError::Cancelled);
        }
        Ok(self
            .ranked
            .iter()
            .filter(|candidate| candidate.to_lowercase().contains(prefix))
            .cloned()
            .collect())
    }
}

static ACADEMIC_TERMS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("machine", vec!["machine learning", "artificial intelligence", "deep learning", "neural networks"]),
        ("learning", vec!["machine learning", "deep learning", "reinforcement learning", "transfer learning"]),
        ("neural", vec!["neural networks", "deep learning", "backpropagation", "transformers"]),
        ("climate", vec!["climate change", "global warming", "carbon emissions", "climate models"]),
        ("genomics", vec!["gene expression", "dna sequencing", "bioinformatics", "crispr"]),
        ("quantum", vec!["quantum computing", "quantum entanglement", "qubits", "quantum mechanics"]),
        ("data", vec!["data mining", "data visualization", "big data", "data science"]),
        ("protein", vec!["protein folding", "protein structure", "proteomics", "enzymes"]),
    ])
});

/// Word-to-related-terms table over common research vocabulary
#[derive(Debug, Clone)]
pub struct StaticSemanticExpander {
    table: HashMap<String, Vec<String>>,
}

impl Default for StaticSemanticExpander {
    fn default() -> Self {
        Self {
            table: ACADEMIC_TERMS
                .iter()
                .map(|(word, related)| {
                    (word.to_string(), related.iter().map(|r| r.to_string()).collect())
                })
                .collect(),
        }
    }
}

impl StaticSemanticExpander {
    pub fn with_table(table: HashMap<String, Vec<String>>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl SemanticProvider for StaticSemanticExpander {
    async fn related(&self, word: &str, cancel: &CancellationToken) -> SourceResult<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(SuggestionError::Cancelled);
        }
        Ok(self.table.get(&word.to_lowercase()).cloned().unwrap_or_default())
    }
}

pub struct NoTrending;

#[async_trait]
impl TrendingProvider for NoTrending {
    async fn trending(&self, _prefix: &str, _cancel: &CancellationToken) -> SourceResult<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct NoSemantic;

#[async_trait]
impl SemanticProvider for NoSemantic {
    async fn related(&self, _word: &str, _cancel: &CancellationToken) -> SourceResult<Vec<String>> {
        Ok(Vec::new())
    }
}
