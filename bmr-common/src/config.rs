//! Engine and provider configuration surface
//!
//! Settings here are pure data consumed by the query coordinator; persistence
//! belongs to the caller. The tree round-trips through JSON for import/export
//! and can also be loaded from a TOML file resolved in the platform config
//! directory.
//!
//! Validation never fails hard: `validate` returns a list of human-readable
//! messages so a UI can show all problems at once.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rate limit shaping for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Minimum delay between consecutive requests in milliseconds
    pub request_delay_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 1_000,
            request_delay_ms: 100,
        }
    }
}

/// Timeout shaping for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Whole-operation timeout in milliseconds (multi-request searches)
    pub operation_timeout_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            operation_timeout_ms: 30_000,
        }
    }
}

/// Per-provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Whether this provider participates in queries
    pub enabled: bool,
    /// Static presentation priority (higher first); must be non-negative
    pub priority: i32,
    /// Rate limit shaping
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Timeout shaping
    #[serde(default)]
    pub timeout: TimeoutSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 0,
            rate_limit: RateLimitSettings::default(),
            timeout: TimeoutSettings::default(),
        }
    }
}

/// Full engine settings tree: global defaults plus per-provider overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Defaults applied when a provider has no explicit entry
    #[serde(default)]
    pub defaults: ProviderSettings,
    /// Per-provider overrides, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

impl EngineSettings {
    /// Effective settings for a provider (explicit entry or defaults)
    pub fn for_provider(&self, name: &str) -> ProviderSettings {
        self.providers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Export the settings tree as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import a settings tree from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the whole tree, returning one message per problem
    ///
    /// An empty vec means the settings are usable. Messages are written for
    /// humans ("priority must be non-negative"), not for matching.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate_provider("defaults", &self.defaults, &mut problems);
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        for name in names {
            validate_provider(name, &self.providers[name], &mut problems);
        }
        problems
    }
}

fn validate_provider(scope: &str, settings: &ProviderSettings, problems: &mut Vec<String>) {
    if settings.priority < 0 {
        problems.push(format!("{}: priority must be non-negative", scope));
    }
    if settings.rate_limit.max_requests == 0 {
        problems.push(format!("{}: rate limit max_requests must be at least 1", scope));
    }
    if settings.rate_limit.window_ms == 0 {
        problems.push(format!("{}: rate limit window_ms must be positive", scope));
    }
    if settings.timeout.request_timeout_ms == 0 {
        problems.push(format!("{}: request timeout must be positive", scope));
    }
    if settings.timeout.operation_timeout_ms < settings.timeout.request_timeout_ms {
        problems.push(format!(
            "{}: operation timeout must be at least the request timeout",
            scope
        ));
    }
}

/// Load settings from a TOML file
pub fn load_settings_file(path: &Path) -> Result<EngineSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read settings failed: {}", e)))?;
    let settings: EngineSettings = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse settings failed: {}", e)))?;
    debug!(path = %path.display(), providers = settings.providers.len(), "Loaded engine settings");
    Ok(settings)
}

/// Default settings file path for the platform
///
/// `~/.config/bmr/config.toml` on Linux, the platform equivalent elsewhere.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("bmr").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./bmr_config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate_clean() {
        let settings = EngineSettings::default();
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn test_negative_priority_reported() {
        let mut settings = EngineSettings::default();
        settings.providers.insert(
            "openlibrary".to_string(),
            ProviderSettings {
                priority: -1,
                ..Default::default()
            },
        );

        let problems = settings.validate();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0], "openlibrary: priority must be non-negative");
    }

    #[test]
    fn test_multiple_problems_all_reported() {
        let mut settings = EngineSettings::default();
        settings.defaults.rate_limit.max_requests = 0;
        settings.providers.insert(
            "worldcat".to_string(),
            ProviderSettings {
                timeout: TimeoutSettings {
                    request_timeout_ms: 10_000,
                    operation_timeout_ms: 5_000,
                },
                ..Default::default()
            },
        );

        let problems = settings.validate();
        assert_eq!(problems.len(), 2, "Both problems should be listed: {:?}", problems);
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = EngineSettings::default();
        settings.providers.insert(
            "google_books".to_string(),
            ProviderSettings {
                enabled: false,
                priority: 7,
                ..Default::default()
            },
        );

        let json = settings.to_json().unwrap();
        let restored = EngineSettings::from_json(&json).unwrap();
        assert_eq!(restored, settings);
        assert_eq!(restored.for_provider("google_books").priority, 7);
    }

    #[test]
    fn test_load_settings_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[defaults]
enabled = true
priority = 1

[providers.openlibrary]
enabled = true
priority = 9

[providers.openlibrary.rate_limit]
max_requests = 5
window_ms = 2000
request_delay_ms = 250
"#,
        )
        .unwrap();

        let settings = load_settings_file(&path).unwrap();
        assert_eq!(settings.defaults.priority, 1);
        let ol = settings.for_provider("openlibrary");
        assert_eq!(ol.priority, 9);
        assert_eq!(ol.rate_limit.request_delay_ms, 250);
        // Unlisted sections fall back to defaults
        assert_eq!(ol.timeout, TimeoutSettings::default());
    }

    #[test]
    fn test_load_settings_missing_file_is_config_error() {
        let err = load_settings_file(Path::new("/nonexistent/bmr/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Read settings failed"));
    }

    #[test]
    fn test_for_provider_falls_back_to_defaults() {
        let settings = EngineSettings {
            defaults: ProviderSettings {
                priority: 3,
                ..Default::default()
            },
            providers: HashMap::new(),
        };
        assert_eq!(settings.for_provider("unknown").priority, 3);
    }
}
