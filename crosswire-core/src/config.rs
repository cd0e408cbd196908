use serde::{Deserialize, Serialize};

/// Top-level crosswire configuration, matching `.crosswire/config.toml`.
///
/// Every field has a default so a missing or partial file still yields a
/// usable configuration. The values are immutable for the duration of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrosswireConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub splitter: SplitterSection,
    #[serde(default)]
    pub matcher: MatcherSection,
}

/// Knobs for the reconciliation and batching core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Maximum summed line count per splitter batch. A single job larger
    /// than this forms its own batch.
    pub batch_line_budget: u32,
    /// Maximum gap (in lines) across which two regions of change are
    /// treated as a single unit for re-analysis.
    pub adjacency_threshold: u32,
    /// CPU workers for per-file diff/reconcile work; 0 = one per core.
    pub cpu_workers: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            batch_line_budget: 5000,
            adjacency_threshold: 3,
            cpu_workers: 0,
        }
    }
}

/// Configuration for the external splitter service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterSection {
    /// Provider kind: `anthropic`, `openai`, or `custom`.
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Base URL override (for custom providers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Retry attempts for transient failures.
    pub retries: u32,
    /// Max concurrent splitter calls.
    pub concurrency: u32,
}

impl Default for SplitterSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            retries: 3,
            concurrency: 2,
        }
    }
}

/// Configuration for the cross-project matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSection {
    /// Minimum similarity score for an accepted match.
    pub threshold: f64,
}

impl Default for MatcherSection {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CrosswireConfig::default();
        assert_eq!(config.engine.batch_line_budget, 5000);
        assert_eq!(config.engine.adjacency_threshold, 3);
        assert_eq!(config.engine.cpu_workers, 0);
        assert_eq!(config.splitter.retries, 3);
        assert_eq!(config.splitter.concurrency, 2);
        assert_eq!(config.splitter.provider, "anthropic");
        assert!((config.matcher.threshold - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[engine]
batch_line_budget = 2000
adjacency_threshold = 5

[splitter]
provider = "openai"
model = "gpt-4o"
retries = 5
concurrency = 4

[matcher]
threshold = 0.75
"#;
        let config: CrosswireConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.batch_line_budget, 2000);
        assert_eq!(config.engine.adjacency_threshold, 5);
        assert_eq!(config.splitter.provider, "openai");
        assert_eq!(config.splitter.retries, 5);
        assert_eq!(config.splitter.concurrency, 4);
        assert!((config.matcher.threshold - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
[engine]
batch_line_budget = 100
"#;
        let config: CrosswireConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.batch_line_budget, 100);
        // Unspecified fields get defaults
        assert_eq!(config.engine.adjacency_threshold, 3);
        assert_eq!(config.splitter.concurrency, 2);
        assert!((config.matcher.threshold - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_toml_is_valid() {
        let config: CrosswireConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.batch_line_budget, 5000);
    }
}
