use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use search_intelligence::analytics::SearchAnalytics;
use search_intelligence::config::{AnalyticsConfig, SuggestionConfig};
use search_intelligence::core::sources::{
    InMemorySavedSearches, SourceResult, StaticSemanticExpander, StaticTrending, TrendingProvider,
};
use search_intelligence::core::{SuggestionEngine, SuggestionOptions};
use search_intelligence::database::MemoryStore;
use search_intelligence::error::SuggestionError;
use search_intelligence::models::{MatchType, SavedSearch, SearchEventInput, SuggestionSource};
use search_intelligence::privacy::{PrivacySettings, PrivacyStore};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

fn saved(query: &str, uses: u32) -> SavedSearch {
    SavedSearch {
        id: query.replace(' ', "-"),
        query: query.to_string(),
        created_at: Utc::now(),
        usage_count: uses,
        tags: Vec::new(),
    }
}

fn build_engine(store: Arc<MemoryStore>, searches: Vec<SavedSearch>) -> SuggestionEngine {
    let analytics = Arc::new(SearchAnalytics::new(store.clone(), AnalyticsConfig::default()));
    SuggestionEngine::new(
        analytics,
        PrivacyStore::new(store),
        Arc::new(InMemorySavedSearches::new(searches)),
        SuggestionConfig::default(),
    )
}

/// Trending source whose answers are released by the test, one call at a time
struct GatedTrending {
    gates: Mutex<VecDeque<oneshot::Receiver<Vec<String>>>>,
    calls: AtomicUsize,
    /// Stop waiting and report `Cancelled` once the request token fires
    cancellable: bool,
    cancelled: AtomicUsize,
}

impl GatedTrending {
    fn new(count: usize) -> (Arc<Self>, Vec<oneshot::Sender<Vec<String>>>) {
        Self::build(count, false)
    }

    fn cancellable(count: usize) -> (Arc<Self>, Vec<oneshot::Sender<Vec<String>>>) {
        Self::build(count, true)
    }

    fn build(count: usize, cancellable: bool) -> (Arc<Self>, Vec<oneshot::Sender<Vec<String>>>) {
        let mut senders = Vec::new();
        let mut receivers = VecDeque::new();
        for _ in 0..count {
            let (tx, rx) = oneshot::channel();
            senders.push(tx);
            receivers.push_back(rx);
        }
        let provider = Arc::new(Self {
            gates: Mutex::new(receivers),
            calls: AtomicUsize::new(0),
            cancellable,
            cancelled: AtomicUsize::new(0),
        });
        (provider, senders)
    }
}

#[async_trait]
impl TrendingProvider for GatedTrending {
    async fn trending(&self, _prefix: &str, cancel: &CancellationToken) -> SourceResult<Vec<String>> {
        let gate = self.gates.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        match gate {
            Some(rx) if self.cancellable => tokio::select! {
                answer = rx => Ok(answer.unwrap_or_default()),
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(SuggestionError::Cancelled)
                }
            },
            Some(rx) => Ok(rx.await.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }
}

async fn wait_for_calls(provider: &GatedTrending, expected: usize) {
    for _ in 0..1000 {
        if provider.calls.load(Ordering::SeqCst) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("trending source was called fewer than {} times", expected);
}

fn trending_only() -> SuggestionOptions {
    SuggestionOptions::default().with_sources(vec![SuggestionSource::Trending])
}

#[tokio::test]
async fn heavily_used_saved_search_ranks_first() {
    let engine = build_engine(
        Arc::new(MemoryStore::new()),
        vec![saved("machine learning tutorial", 1), saved("machine learning", 15)],
    );

    let results = engine
        .get_suggestions(
            "machine",
            &SuggestionOptions::default().with_sources(vec![SuggestionSource::SavedSearch]),
        )
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].query, "machine learning");
    assert_eq!(results[0].metadata.usage_count, Some(15));
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn personalization_disabled_returns_nothing() {
    let store = Arc::new(MemoryStore::new());
    let engine = build_engine(store, vec![saved("machine learning", 15)]);
    engine.analytics().track_search(SearchEventInput::search("machine learning"));
    engine.analytics().flush();

    let mut settings = PrivacySettings::default();
    settings.personalization_enabled = false;
    engine.set_privacy_settings(&settings).await.unwrap();

    assert!(engine.get_suggestions("machine", &SuggestionOptions::default()).await.is_empty());

    let mut per_call = SuggestionOptions::default();
    per_call.personalized = false;
    engine.set_privacy_settings(&PrivacySettings::default()).await.unwrap();
    assert!(engine.get_suggestions("machine", &per_call).await.is_empty());
    assert!(!engine.get_suggestions("machine", &SuggestionOptions::default()).await.is_empty());
}

#[tokio::test]
async fn merged_sources_never_repeat_a_query() {
    let store = Arc::new(MemoryStore::new());
    let engine = build_engine(store, vec![saved("machine learning", 4), saved("machine vision", 1)])
        .with_trending(Arc::new(StaticTrending::new(["machine learning", "machine translation"])))
        .with_semantic(Arc::new(StaticSemanticExpander::default()));

    let mut settings = engine.get_privacy_settings();
    settings.ai_suggestions_enabled = true;
    engine.set_privacy_settings(&settings).await.unwrap();

    engine.analytics().track_search(SearchEventInput::search("machine learning"));
    engine.analytics().flush();

    let results = engine
        .get_suggestions("machine", &SuggestionOptions::default().with_max_results(50))
        .await;

    let unique: HashSet<&str> = results.iter().map(|s| s.query.as_str()).collect();
    assert_eq!(unique.len(), results.len());
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    // History outweighs every other source for the shared text
    assert_eq!(results[0].query, "machine learning");
    assert_eq!(results[0].source, SuggestionSource::UserHistory);
    assert!(results.iter().any(|s| s.metadata.match_type == MatchType::Semantic));
}

#[tokio::test]
async fn exact_outranks_fuzzy_outranks_substring() {
    let engine = build_engine(
        Arc::new(MemoryStore::new()),
        vec![saved("cellular automata", 1), saved("plant cell biology", 1), saved("intercellular signals", 1)],
    );

    let results = engine
        .get_suggestions("cell", &SuggestionOptions::default())
        .await;
    let order: Vec<&str> = results.iter().map(|s| s.query.as_str()).collect();
    assert_eq!(order, vec!["cellular automata", "plant cell biology", "intercellular signals"]);

    let kinds: Vec<MatchType> = results.iter().map(|s| s.metadata.match_type).collect();
    assert_eq!(kinds, vec![MatchType::Exact, MatchType::Fuzzy, MatchType::Substring]);
}

#[tokio::test]
async fn older_history_match_survives_many_newer_searches() {
    let engine = build_engine(Arc::new(MemoryStore::new()), Vec::new());
    let now = Utc::now();

    engine
        .analytics()
        .track_search(SearchEventInput::search("protein folding").with_timestamp(now - ChronoDuration::days(2)));
    for i in 0..60 {
        engine.analytics().track_search(SearchEventInput::search(format!("unrelated topic {}", i)));
    }
    engine.analytics().flush();
    assert_eq!(engine.analytics().stored_events().len(), 61);

    let results = engine
        .get_suggestions(
            "protein",
            &SuggestionOptions::default().with_sources(vec![SuggestionSource::UserHistory]),
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].query, "protein folding");
    assert_eq!(results[0].source, SuggestionSource::UserHistory);
    assert_eq!(results[0].metadata.match_type, MatchType::Exact);
}

#[tokio::test]
async fn repeated_request_served_from_cache() {
    let (trending, mut gates) = GatedTrending::new(1);
    let engine = build_engine(Arc::new(MemoryStore::new()), Vec::new()).with_trending(trending.clone());

    gates.remove(0).send(vec!["machine learning".to_string()]).unwrap();
    let first = engine.get_suggestions("machine", &trending_only()).await;
    let second = engine.get_suggestions("  MACHINE", &trending_only()).await;

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert_eq!(trending.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn superseded_request_cannot_overwrite_newer_results() {
    let (trending, mut gates) = GatedTrending::new(2);
    let engine = Arc::new(build_engine(Arc::new(MemoryStore::new()), Vec::new()).with_trending(trending.clone()));

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_suggestions("machine", &trending_only()).await }
    });
    wait_for_calls(&trending, 1).await;

    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_suggestions("machine", &trending_only()).await }
    });
    wait_for_calls(&trending, 2).await;

    let gate_b = gates.remove(1);
    let gate_a = gates.remove(0);

    gate_b.send(vec!["machine vision".to_string()]).unwrap();
    let b_results = b.await.unwrap();
    assert_eq!(b_results[0].query, "machine vision");

    gate_a.send(vec!["machine learning".to_string()]).unwrap();
    let a_results = a.await.unwrap();
    assert!(a_results.is_empty());

    let cached = engine.get_suggestions("machine", &trending_only()).await;
    assert_eq!(cached, b_results);
    assert_eq!(trending.calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.in_flight_count(), 0);
}

#[tokio::test]
async fn superseded_request_returns_nothing_when_source_stops_early() {
    let (trending, mut gates) = GatedTrending::cancellable(2);
    let engine = Arc::new(build_engine(Arc::new(MemoryStore::new()), Vec::new()).with_trending(trending.clone()));

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_suggestions("machine", &trending_only()).await }
    });
    wait_for_calls(&trending, 1).await;

    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_suggestions("machine", &trending_only()).await }
    });
    wait_for_calls(&trending, 2).await;

    // A's gate is never released; starting B is what ends it
    let a_results = a.await.unwrap();
    assert!(a_results.is_empty());
    assert_eq!(trending.cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(engine.in_flight_count(), 1);
    assert_eq!(engine.cache_stats().await.entries, 0);

    gates.remove(1).send(vec!["machine vision".to_string()]).unwrap();
    let b_results = b.await.unwrap();
    assert_eq!(b_results.len(), 1);
    assert_eq!(b_results[0].query, "machine vision");
    assert_eq!(trending.cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(engine.in_flight_count(), 0);
}

#[tokio::test]
async fn finishing_superseded_request_keeps_newer_token() {
    let (trending, mut gates) = GatedTrending::new(2);
    let engine = Arc::new(build_engine(Arc::new(MemoryStore::new()), Vec::new()).with_trending(trending.clone()));

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_suggestions("machine", &trending_only()).await }
    });
    wait_for_calls(&trending, 1).await;

    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_suggestions("machine", &trending_only()).await }
    });
    wait_for_calls(&trending, 2).await;

    let gate_b = gates.remove(1);
    let gate_a = gates.remove(0);

    // A unwinds first; B is still in flight and must stay registered
    gate_a.send(vec!["machine learning".to_string()]).unwrap();
    assert!(a.await.unwrap().is_empty());
    assert_eq!(engine.in_flight_count(), 1);
    assert_eq!(engine.cache_stats().await.entries, 0);

    gate_b.send(vec!["machine vision".to_string()]).unwrap();
    let b_results = b.await.unwrap();
    assert_eq!(b_results[0].query, "machine vision");
    assert_eq!(engine.in_flight_count(), 0);

    let cached = engine.get_suggestions("machine", &trending_only()).await;
    assert_eq!(cached, b_results);
}

#[tokio::test(start_paused = true)]
async fn cached_lists_expire_after_ttl() {
    let (trending, mut gates) = GatedTrending::new(2);
    let engine = build_engine(Arc::new(MemoryStore::new()), Vec::new()).with_trending(trending.clone());

    gates.remove(0).send(vec!["machine learning".to_string()]).unwrap();
    engine.get_suggestions("machine", &trending_only()).await;

    tokio::time::advance(Duration::from_secs(301)).await;
    gates.remove(0).send(vec!["machine vision".to_string()]).unwrap();
    let refreshed = engine.get_suggestions("machine", &trending_only()).await;

    assert_eq!(refreshed[0].query, "machine vision");
    assert_eq!(trending.calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.cache_stats().await.expirations, 1);
}
