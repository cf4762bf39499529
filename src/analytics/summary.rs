use crate::models::{QueryComplexity, SearchEvent, SearchEventType, SearchSource};
use crate::utils::normalize_query;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const TOP_HOURS: usize = 5;
const TOP_QUERIES: usize = 10;
const SLOWEST_QUERIES: usize = 5;
const TOP_ERRORS: usize = 5;
const RECENT_SEARCHES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourCount {
    /// Hour of day, UTC
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryCount {
    pub query: String,
    pub count: usize,
}

/// Latest occurrence of a distinct query, used as the history view for suggestions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentSearch {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub count: usize,
}

/// Aggregates over the search events of a trailing window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchSummary {
    pub window_days: i64,
    pub total_events: usize,
    pub total_searches: usize,
    /// Percentage of searches that succeeded
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub avg_results_count: f64,
    pub complexity_distribution: HashMap<QueryComplexity, usize>,
    pub peak_hours: Vec<HourCount>,
    pub top_queries: Vec<QueryCount>,
    pub source_distribution: HashMap<SearchSource, usize>,
    pub recent_searches: Vec<RecentSearch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlowQuery {
    pub query: String,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorCount {
    pub error_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub sample_size: usize,
    pub p50_response_time_ms: u64,
    pub p95_response_time_ms: u64,
    pub p99_response_time_ms: u64,
    pub slowest_queries: Vec<SlowQuery>,
    /// Percentage of search events that failed
    pub error_rate: f64,
    pub top_errors: Vec<ErrorCount>,
}

/// Nearest-rank percentile over an ascending slice.
///
/// Uses `ceil(p/100 * n) - 1`, clamped into the slice.
pub fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

/// Events no older than `days` relative to `now`
pub fn within_window(events: &[SearchEvent], days: i64, now: DateTime<Utc>) -> Vec<&SearchEvent> {
    let cutoff = now - Duration::days(days);
    events.iter().filter(|e| e.timestamp >= cutoff).collect()
}

pub fn compute_summary(events: &[SearchEvent], days: i64, now: DateTime<Utc>) -> SearchSummary {
    let windowed = within_window(events, days, now);
    let searches: Vec<&SearchEvent> = windowed
        .iter()
        .copied()
        .filter(|e| e.event_type == SearchEventType::Search)
        .collect();

    let mut summary = SearchSummary {
        window_days: days,
        total_events: windowed.len(),
        total_searches: searches.len(),
        ..Default::default()
    };

    if searches.is_empty() {
        return summary;
    }

    let successes = searches.iter().filter(|e| e.success).count();
    summary.success_rate = successes as f64 / searches.len() as f64 * 100.0;

    summary.avg_response_time_ms = mean(searches.iter().filter_map(|e| e.response_time_ms.map(|v| v as f64)));
    summary.avg_results_count = mean(searches.iter().filter_map(|e| e.results_count.map(|v| v as f64)));

    let mut hours: HashMap<u32, usize> = HashMap::new();
    let mut queries: HashMap<String, usize> = HashMap::new();

    for event in &searches {
        *summary.complexity_distribution.entry(event.complexity).or_insert(0) += 1;
        *hours.entry(event.timestamp.hour()).or_insert(0) += 1;
        *queries.entry(normalize_query(&event.query)).or_insert(0) += 1;
        if let Some(source) = event.source {
            *summary.source_distribution.entry(source).or_insert(0) += 1;
        }
    }

    let mut peak_hours: Vec<HourCount> = hours
        .into_iter()
        .map(|(hour, count)| HourCount { hour, count })
        .collect();
    peak_hours.sort_by(|a, b| b.count.cmp(&a.count).then(a.hour.cmp(&b.hour)));
    peak_hours.truncate(TOP_HOURS);
    summary.peak_hours = peak_hours;

    let mut top_queries: Vec<QueryCount> = queries
        .iter()
        .filter(|(query, _)| !query.is_empty())
        .map(|(query, count)| QueryCount { query: query.clone(), count: *count })
        .collect();
    top_queries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
    top_queries.truncate(TOP_QUERIES);
    summary.top_queries = top_queries;

    let mut recent = distinct_queries(events, days, now);
    recent.truncate(RECENT_SEARCHES);
    summary.recent_searches = recent;

    summary
}

/// Every distinct search query of the window, newest occurrence first.
///
/// Unlike `SearchSummary::recent_searches` this is not capped, so older
/// queries stay visible no matter how many newer ones were made.
pub fn distinct_queries(events: &[SearchEvent], days: i64, now: DateTime<Utc>) -> Vec<RecentSearch> {
    let mut searches: Vec<&SearchEvent> = within_window(events, days, now)
        .into_iter()
        .filter(|e| e.event_type == SearchEventType::Search)
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for event in &searches {
        *counts.entry(normalize_query(&event.query)).or_insert(0) += 1;
    }

    searches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let mut seen = HashSet::new();
    searches
        .into_iter()
        .filter_map(|event| {
            let key = normalize_query(&event.query);
            if key.is_empty() || !seen.insert(key.clone()) {
                return None;
            }
            Some(RecentSearch {
                query: event.query.clone(),
                timestamp: event.timestamp,
                success: event.success,
                count: counts.get(&key).copied().unwrap_or(1),
            })
        })
        .collect()
}

pub fn compute_performance_metrics(events: &[SearchEvent]) -> PerformanceMetrics {
    let mut timed: Vec<&SearchEvent> = events.iter().filter(|e| e.response_time_ms.is_some()).collect();
    let mut durations: Vec<u64> = timed.iter().filter_map(|e| e.response_time_ms).collect();
    durations.sort_unstable();

    timed.sort_by(|a, b| b.response_time_ms.cmp(&a.response_time_ms));
    let slowest_queries = timed
        .iter()
        .take(SLOWEST_QUERIES)
        .map(|e| SlowQuery {
            query: e.query.clone(),
            response_time_ms: e.response_time_ms.unwrap_or_default(),
            timestamp: e.timestamp,
        })
        .collect();

    let searches: Vec<&SearchEvent> = events
        .iter()
        .filter(|e| e.event_type == SearchEventType::Search)
        .collect();
    let failures = searches.iter().filter(|e| !e.success).count();
    let error_rate = if searches.is_empty() {
        0.0
    } else {
        failures as f64 / searches.len() as f64 * 100.0
    };

    let mut errors: HashMap<&str, usize> = HashMap::new();
    for event in events {
        if let Some(error_type) = event.error_type.as_deref() {
            *errors.entry(error_type).or_insert(0) += 1;
        }
    }
    let mut top_errors: Vec<ErrorCount> = errors
        .into_iter()
        .map(|(error_type, count)| ErrorCount { error_type: error_type.to_string(), count })
        .collect();
    top_errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error_type.cmp(&b.error_type)));
    top_errors.truncate(TOP_ERRORS);

    PerformanceMetrics {
        sample_size: durations.len(),
        p50_response_time_ms: percentile(&durations, 50.0),
        p95_response_time_ms: percentile(&durations, 95.0),
        p99_response_time_ms: percentile(&durations, 99.0),
        slowest_queries,
        error_rate,
        top_errors,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
