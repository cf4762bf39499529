use crate::models::{MatchType, Suggestion, SuggestionMetadata, SuggestionSource};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Classify how `candidate` matches the normalized input.
///
/// Semantic candidates always classify as [`MatchType::Semantic`]. Other
/// candidates that do not contain the input return `None` and are dropped.
pub fn classify_match(candidate: &str, input: &str, source: SuggestionSource) -> Option<MatchType> {
    if source == SuggestionSource::AiSemantic {
        return Some(MatchType::Semantic);
    }

    let candidate = candidate.to_lowercase();
    if candidate.starts_with(input) {
        Some(MatchType::Exact)
    } else if candidate.split_whitespace().any(|word| word.starts_with(input)) {
        Some(MatchType::Fuzzy)
    } else if candidate.contains(input) {
        Some(MatchType::Substring)
    } else {
        None
    }
}

pub fn recency_multiplier(days: f64) -> f64 {
    if days <= 1.0 {
        1.5
    } else if days <= 7.0 {
        1.2
    } else if days <= 30.0 {
        1.0
    } else {
        0.5
    }
}

/// Quality factor for history candidates, from a success rate in percent
pub fn success_multiplier(success_rate: f64) -> f64 {
    if success_rate >= 90.0 {
        1.3
    } else if success_rate >= 70.0 {
        1.1
    } else if success_rate >= 50.0 {
        1.0
    } else {
        0.7
    }
}

/// Quality factor for saved searches
pub fn usage_multiplier(usage_count: u32) -> f64 {
    if usage_count > 10 {
        1.4
    } else if usage_count >= 3 {
        1.2
    } else {
        1.0
    }
}

/// Position-based fraction for ranked lists; the first item scores 1.0
pub fn rank_fraction(index: usize, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    (len.saturating_sub(index)) as f64 / len as f64
}

pub fn score(match_type: MatchType, recency_days: f64, quality: f64, source: SuggestionSource) -> f64 {
    match_type.base_score() * recency_multiplier(recency_days) * quality * source.weight()
}

/// Raw candidate from one source, before match classification
#[derive(Debug, Clone)]
pub struct Candidate {
    pub query: String,
    pub source: SuggestionSource,
    pub recency_days: f64,
    pub quality: f64,
    pub usage_count: Option<u32>,
    pub success_rate: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub related_queries: Option<Vec<String>>,
}

impl Candidate {
    pub fn new(query: impl Into<String>, source: SuggestionSource, recency_days: f64, quality: f64) -> Self {
        Self {
            query: query.into(),
            source,
            recency_days,
            quality,
            usage_count: None,
            success_rate: None,
            tags: None,
            related_queries: None,
        }
    }

    /// Score against the normalized input, or `None` when it does not match
    pub fn into_suggestion(self, input: &str) -> Option<Suggestion> {
        let match_type = classify_match(&self.query, input, self.source)?;
        let score = score(match_type, self.recency_days, self.quality, self.source);

        Some(Suggestion {
            id: Uuid::new_v4().to_string(),
            query: self.query,
            source: self.source,
            score,
            metadata: SuggestionMetadata {
                match_type,
                recency_days: self.recency_days,
                usage_count: self.usage_count,
                success_rate: self.success_rate,
                tags: self.tags,
                related_queries: self.related_queries,
            },
        })
    }
}

/// Keep the best-scoring suggestion per query text, highest score first
pub fn dedupe_and_rank(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut best: HashMap<String, Suggestion> = HashMap::new();
    for suggestion in suggestions {
        match best.get(&suggestion.query) {
            Some(existing) if existing.score >= suggestion.score => {}
            _ => {
                best.insert(suggestion.query.clone(), suggestion);
            }
        }
    }

    let mut ranked: Vec<Suggestion> = best.into_values().collect();
    ranked.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.query.cmp(&b.query),
        other => other,
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_classification() {
        let src = SuggestionSource::UserHistory;
        assert_eq!(classify_match("Machine Learning", "machine", src), Some(MatchType::Exact));
        assert_eq!(classify_match("applied machine learning", "machine", src), Some(MatchType::Fuzzy));
        assert_eq!(classify_match("supermachines", "machine", src), Some(MatchType::Substring));
        assert_eq!(classify_match("deep learning", "machine", src), None);
        assert_eq!(
            classify_match("deep learning", "machine", SuggestionSource::AiSemantic),
            Some(MatchType::Semantic)
        );
    }

    #[test]
    fn test_exact_beats_fuzzy_beats_substring() {
        let input = "graph";
        let make = |q: &str| Candidate::new(q, SuggestionSource::Trending, 0.0, 1.0).into_suggestion(input).unwrap();

        let exact = make("graph theory");
        let fuzzy = make("knowledge graph");
        let substring = make("paragraphs");

        assert!(exact.score > fuzzy.score);
        assert!(fuzzy.score > substring.score);
        assert_eq!(substring.metadata.match_type, MatchType::Substring);
    }

    #[test]
    fn test_multiplier_thresholds() {
        assert_eq!(recency_multiplier(0.5), 1.5);
        assert_eq!(recency_multiplier(7.0), 1.2);
        assert_eq!(recency_multiplier(30.0), 1.0);
        assert_eq!(recency_multiplier(31.0), 0.5);

        assert_eq!(success_multiplier(100.0), 1.3);
        assert_eq!(success_multiplier(70.0), 1.1);
        assert_eq!(success_multiplier(50.0), 1.0);
        assert_eq!(success_multiplier(0.0), 0.7);

        assert_eq!(usage_multiplier(15), 1.4);
        assert_eq!(usage_multiplier(10), 1.2);
        assert_eq!(usage_multiplier(3), 1.2);
        assert_eq!(usage_multiplier(1), 1.0);

        assert_eq!(rank_fraction(0, 4), 1.0);
        assert_eq!(rank_fraction(3, 4), 0.25);
        assert_eq!(rank_fraction(0, 0), 0.0);
    }

    #[test]
    fn test_score_formula() {
        // 100 * 1.5 * 1.4 * 0.3
        let s = score(MatchType::Exact, 0.0, usage_multiplier(15), SuggestionSource::SavedSearch);
        assert!((s - 63.0).abs() < 1e-9);
    }

    #[test]
    fn test_dedupe_keeps_highest() {
        let input = "rust";
        let low = Candidate::new("rust async", SuggestionSource::AiSemantic, 0.0, 1.0)
            .into_suggestion(input)
            .unwrap();
        let high = Candidate::new("rust async", SuggestionSource::UserHistory, 0.0, 1.3)
            .into_suggestion(input)
            .unwrap();
        let other = Candidate::new("rust traits", SuggestionSource::Trending, 0.0, 0.5)
            .into_suggestion(input)
            .unwrap();

        let ranked = dedupe_and_rank(vec![low, other, high]);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].query, "rust async");
        assert_eq!(ranked[0].source, SuggestionSource::UserHistory);
        assert!(ranked[0].score >= ranked[1].score);
    }
}
