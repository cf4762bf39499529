use crate::models::SearchEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written in place of every query when queries are excluded
pub const REDACTED_QUERY: &str = "[REDACTED]";

pub const CSV_HEADER: &str =
    "Timestamp,Event Type,Query,Query Length,Complexity,Response Time (ms),Results Count,Success,Source";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }
}

/// Inclusive time range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub date_range: Option<DateRange>,
    pub include_queries: bool,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            date_range: None,
            include_queries: true,
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn without_queries(mut self) -> Self {
        self.include_queries = false;
        self
    }
}

/// Apply the range filter and the redaction policy
pub fn prepare_events(events: Vec<SearchEvent>, options: &ExportOptions) -> Vec<SearchEvent> {
    events
        .into_iter()
        .filter(|e| options.date_range.map_or(true, |range| range.contains(e.timestamp)))
        .map(|mut e| {
            if !options.include_queries {
                e.query = REDACTED_QUERY.to_string();
            }
            e
        })
        .collect()
}

pub fn to_json(events: &[SearchEvent]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(events)
}

pub fn to_csv(events: &[SearchEvent]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for event in events {
        let row = [
            event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.event_type.as_str().to_string(),
            csv_field(&event.query),
            event.query_length.to_string(),
            event.complexity.as_str().to_string(),
            event.response_time_ms.map(|v| v.to_string()).unwrap_or_default(),
            event.results_count.map(|v| v.to_string()).unwrap_or_default(),
            event.success.to_string(),
            event.source.map(|s| s.as_str().to_string()).unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Quote a free-text field.
///
/// Values a spreadsheet would evaluate as a formula are quoted and prefixed
/// with `'` so they are read as text.
pub fn csv_field(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    if value.starts_with(['=', '+', '-', '@']) {
        format!("\"'{}\"", escaped)
    } else if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", escaped)
    } else {
        value.to_string()
    }
}
