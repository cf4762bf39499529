use crate::database::KvStore;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

pub const PRIVACY_SETTINGS_KEY: &str = "search_privacy_settings";

/// User-controlled switches gating personalization features.
///
/// Fields missing from a stored record take their default value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrivacySettings {
    pub personalization_enabled: bool,
    pub history_based_suggestions: bool,
    pub trending_queries_enabled: bool,
    pub ai_suggestions_enabled: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            personalization_enabled: true,
            history_based_suggestions: true,
            trending_queries_enabled: true,
            ai_suggestions_enabled: false,
        }
    }
}

impl PrivacySettings {
    pub const FIELDS: [&'static str; 4] = [
        "personalization_enabled",
        "history_based_suggestions",
        "trending_queries_enabled",
        "ai_suggestions_enabled",
    ];

    /// Set a switch by its field name. Returns `false` for unknown names.
    pub fn set_field(&mut self, name: &str, enabled: bool) -> bool {
        let slot = match name {
            "personalization_enabled" | "personalization" => &mut self.personalization_enabled,
            "history_based_suggestions" | "history" => &mut self.history_based_suggestions,
            "trending_queries_enabled" | "trending" => &mut self.trending_queries_enabled,
            "ai_suggestions_enabled" | "ai" => &mut self.ai_suggestions_enabled,
            _ => return false,
        };
        *slot = enabled;
        true
    }
}

/// Durable home of the single privacy settings record
#[derive(Clone)]
pub struct PrivacyStore {
    store: Arc<dyn KvStore>,
}

impl PrivacyStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Current settings. Missing, unreadable or malformed records resolve to defaults.
    pub fn load(&self) -> PrivacySettings {
        let raw = match self.store.get(PRIVACY_SETTINGS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return PrivacySettings::default(),
            Err(e) => {
                error!(error = %e, "failed to read privacy settings, using defaults");
                return PrivacySettings::default();
            }
        };

        match serde_json::from_str::<PrivacySettings>(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "discarding malformed privacy settings record");
                if let Err(e) = self.store.remove(PRIVACY_SETTINGS_KEY) {
                    error!(error = %e, "failed to remove malformed privacy settings");
                }
                PrivacySettings::default()
            }
        }
    }

    pub fn save(&self, settings: &PrivacySettings) -> Result<(), StorageError> {
        let raw = serde_json::to_string(settings)
            .map_err(|e| StorageError::Corruption(e.to_string()))?;
        self.store.set(PRIVACY_SETTINGS_KEY, &raw)
    }
}
