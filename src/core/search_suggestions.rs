use crate::analytics::SearchAnalytics;
use crate::cache::{CacheStats, SuggestionCache};
use crate::config::SuggestionConfig;
use crate::core::cancellation::InFlightRegistry;
use crate::core::ranking::{self, Candidate};
use crate::core::sources::{
    NoSemantic, NoTrending, SavedSearchRegistry, SavedSearchSort, SemanticProvider, SourceResult,
    TrendingProvider,
};
use crate::error::{StorageError, SuggestionError};
use crate::models::{Suggestion, SuggestionSource};
use crate::privacy::{PrivacySettings, PrivacyStore};
use crate::utils::normalize_query;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Per-request knobs for [`SuggestionEngine::get_suggestions`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionOptions {
    /// Maximum number of suggestions returned to the caller
    pub max_results: usize,
    /// Restrict aggregation to these sources; `None` means all
    pub sources: Option<Vec<SuggestionSource>>,
    /// Suggestions scoring below this are dropped after ranking
    pub min_score: f64,
    /// Set to false to opt this request out of personal sources
    pub personalized: bool,
}

impl Default for SuggestionOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            sources: None,
            min_score: 0.0,
            personalized: true,
        }
    }
}

impl SuggestionOptions {
    pub fn with_sources(mut self, sources: Vec<SuggestionSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    fn wants(&self, source: SuggestionSource) -> bool {
        self.sources.as_ref().map_or(true, |list| list.contains(&source))
    }
}

/// Aggregates ranked autocomplete suggestions from history, saved searches,
/// trending queries and semantic expansion.
pub struct SuggestionEngine {
    analytics: Arc<SearchAnalytics>,
    privacy: PrivacyStore,
    saved_searches: Arc<dyn SavedSearchRegistry>,
    trending: Arc<dyn TrendingProvider>,
    semantic: Arc<dyn SemanticProvider>,
    cache: SuggestionCache,
    in_flight: InFlightRegistry,
    config: SuggestionConfig,
}

impl SuggestionEngine {
    pub fn new(
        analytics: Arc<SearchAnalytics>,
        privacy: PrivacyStore,
        saved_searches: Arc<dyn SavedSearchRegistry>,
        config: SuggestionConfig,
    ) -> Self {
        Self {
            analytics,
            privacy,
            saved_searches,
            trending: Arc::new(NoTrending),
            semantic: Arc::new(NoSemantic),
            cache: SuggestionCache::new(config.cache_capacity, config.cache_ttl()),
            in_flight: InFlightRegistry::new(),
            config,
        }
    }

    pub fn with_trending(mut self, trending: Arc<dyn TrendingProvider>) -> Self {
        self.trending = trending;
        self
    }

    pub fn with_semantic(mut self, semantic: Arc<dyn SemanticProvider>) -> Self {
        self.semantic = semantic;
        self
    }

    /// Options seeded from the configured result limit
    pub fn default_options(&self) -> SuggestionOptions {
        SuggestionOptions {
            max_results: self.config.default_max_results,
            ..Default::default()
        }
    }

    /// Ranked suggestions for `query`. Never fails; every error path yields an empty list.
    pub async fn get_suggestions(&self, query: &str, options: &SuggestionOptions) -> Vec<Suggestion> {
        let trimmed = query.trim();
        if trimmed.chars().count() < self.config.min_query_length {
            return Vec::new();
        }

        let normalized = normalize_query(trimmed);
        let settings = self.privacy.load();
        if !settings.personalization_enabled || !options.personalized {
            // Only non-personalized results may be served here, and there are none yet
            debug!(query = %normalized, "personalization disabled, skipping personal sources");
            return Vec::new();
        }

        let key = cache_key(&normalized, options.sources.as_deref());
        if let Some(cached) = self.cache.get(&key).await {
            debug!(query = %key, "suggestion cache hit");
            return finalize(cached, options);
        }

        let guard = self.in_flight.begin(&key);
        let outcome = self.aggregate(&normalized, options, &settings, guard.token()).await;

        match outcome {
            Ok(ranked) => {
                // Checked under the cache write lock so a newer request cannot slip in between
                if !self.cache.put_if(key.clone(), ranked.clone(), || !guard.is_cancelled()).await {
                    debug!(query = %key, "request superseded, discarding results");
                    return Vec::new();
                }
                finalize(ranked, options)
            }
            Err(SuggestionError::Cancelled) => {
                debug!(query = %key, "suggestion request cancelled");
                Vec::new()
            }
            Err(e) => {
                error!(query = %key, error = %e, "suggestion aggregation failed");
                Vec::new()
            }
        }
    }

    async fn aggregate(
        &self,
        input: &str,
        options: &SuggestionOptions,
        settings: &PrivacySettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        let (history, saved, trending, semantic) = tokio::join!(
            gather(
                settings.history_based_suggestions && options.wants(SuggestionSource::UserHistory),
                SuggestionSource::UserHistory,
                input,
                self.history_candidates(input),
            ),
            gather(
                options.wants(SuggestionSource::SavedSearch),
                SuggestionSource::SavedSearch,
                input,
                self.saved_search_candidates(),
            ),
            gather(
                settings.trending_queries_enabled && options.wants(SuggestionSource::Trending),
                SuggestionSource::Trending,
                input,
                self.trending_candidates(input, cancel),
            ),
            gather(
                settings.ai_suggestions_enabled && options.wants(SuggestionSource::AiSemantic),
                SuggestionSource::AiSemantic,
                input,
                self.semantic_candidates(input, cancel),
            ),
        );

        if cancel.is_cancelled() {
            return Err(SuggestionError::Cancelled);
        }

        let mut all = history;
        all.extend(saved);
        all.extend(trending);
        all.extend(semantic);
        Ok(ranking::dedupe_and_rank(all))
    }

    async fn history_candidates(&self, input: &str) -> SourceResult<Vec<Candidate>> {
        let history = self.analytics.history_view(self.config.history_window_days);
        let now = Utc::now();

        Ok(history
            .into_iter()
            .filter(|recent| ranking::classify_match(&recent.query, input, SuggestionSource::UserHistory).is_some())
            .map(|recent| {
                let success_rate = if recent.success { 100.0 } else { 0.0 };
                let mut candidate = Candidate::new(
                    recent.query,
                    SuggestionSource::UserHistory,
                    days_since(recent.timestamp, now),
                    ranking::success_multiplier(success_rate),
                );
                candidate.success_rate = Some(success_rate);
                candidate.usage_count = Some(u32::try_from(recent.count).unwrap_or(u32::MAX));
                candidate
            })
            .collect())
    }

    async fn saved_search_candidates(&self) -> SourceResult<Vec<Candidate>> {
        let now = Utc::now();
        let searches = self.saved_searches.get_all_searches(SavedSearchSort::Usage).await?;

        Ok(searches
            .into_iter()
            .map(|search| {
                let mut candidate = Candidate::new(
                    search.query,
                    SuggestionSource::SavedSearch,
                    days_since(search.created_at, now),
                    ranking::usage_multiplier(search.usage_count),
                );
                candidate.usage_count = Some(search.usage_count);
                if !search.tags.is_empty() {
                    candidate.tags = Some(search.tags);
                }
                candidate
            })
            .collect())
    }

    async fn trending_candidates(&self, input: &str, cancel: &CancellationToken) -> SourceResult<Vec<Candidate>> {
        let ranked = self.trending.trending(input, cancel).await?;
        let len = ranked.len();

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(i, query)| Candidate::new(query, SuggestionSource::Trending, 0.0, ranking::rank_fraction(i, len)))
            .collect())
    }

    async fn semantic_candidates(&self, input: &str, cancel: &CancellationToken) -> SourceResult<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for word in input.split_whitespace().filter(|w| w.chars().count() >= 2) {
            if cancel.is_cancelled() {
                return Err(SuggestionError::Cancelled);
            }

            let related = self.semantic.related(word, cancel).await?;
            let len = related.len();
            for (i, query) in related.iter().enumerate() {
                let mut candidate = Candidate::new(
                    query.clone(),
                    SuggestionSource::AiSemantic,
                    0.0,
                    ranking::rank_fraction(i, len),
                );
                candidate.related_queries = Some(related.clone());
                candidates.push(candidate);
            }
        }

        Ok(candidates)
    }

    pub fn get_privacy_settings(&self) -> PrivacySettings {
        self.privacy.load()
    }

    /// Persist new settings and drop every cached list built under the old ones
    pub async fn set_privacy_settings(&self, settings: &PrivacySettings) -> Result<(), StorageError> {
        self.privacy.save(settings)?;
        self.cache.clear().await;
        info!(?settings, "privacy settings updated, suggestion cache cleared");
        Ok(())
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Clear the cache and cancel every in-flight request
    pub async fn reset(&self) {
        self.in_flight.cancel_all();
        self.cache.clear().await;
        debug!("suggestion engine reset");
    }

    pub fn analytics(&self) -> &Arc<SearchAnalytics> {
        &self.analytics
    }
}

/// Run one source, isolating its failure from the others
async fn gather<F>(enabled: bool, source: SuggestionSource, input: &str, fetch: F) -> Vec<Suggestion>
where
    F: Future<Output = SourceResult<Vec<Candidate>>>,
{
    if !enabled {
        return Vec::new();
    }

    match fetch.await {
        Ok(candidates) => candidates
            .into_iter()
            .filter_map(|candidate| candidate.into_suggestion(input))
            .collect(),
        Err(SuggestionError::Cancelled) => {
            debug!(%source, "source cancelled");
            Vec::new()
        }
        Err(e) => {
            error!(%source, error = %e, "suggestion source failed");
            Vec::new()
        }
    }
}

/// Cache and cancellation key. Source-filtered requests get their own key.
fn cache_key(normalized: &str, sources: Option<&[SuggestionSource]>) -> String {
    match sources {
        None => normalized.to_string(),
        Some(sources) => {
            let mut names: Vec<SuggestionSource> = sources.to_vec();
            names.sort();
            names.dedup();
            let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            format!("{}|{}", normalized, names.join(","))
        }
    }
}

fn finalize(ranked: Vec<Suggestion>, options: &SuggestionOptions) -> Vec<Suggestion> {
    ranked
        .into_iter()
        .filter(|s| s.score >= options.min_score)
        .take(options.max_results)
        .collect()
}

fn days_since(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - timestamp).num_milliseconds() as f64 / MS_PER_DAY).max(0.0)
}
