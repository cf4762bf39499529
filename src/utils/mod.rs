pub mod deferred;

pub use deferred::DeferredTask;

/// Trimmed, lower-cased form of a query used as a lookup key
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Machine Learning "), "machine learning");
        assert_eq!(normalize_query("ÉTUDE"), "étude");
    }
}
