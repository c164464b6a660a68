//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Link traversal limits
    pub crawl: CrawlConfig,

    /// Element discovery and interaction limits
    pub interaction: InteractionConfig,

    /// Heuristic failure thresholds
    pub thresholds: ThresholdConfig,

    /// Per-operation timeouts
    pub timeouts: TimeoutConfig,

    /// Session retry policy
    pub retry: RetryConfig,

    /// Optional external judgment service
    pub judge: JudgeConfig,

    /// Event noise filtering
    pub noise: NoiseConfig,

    /// Browser launch settings
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Whether to explore same-origin links beyond the root page
    pub enabled: bool,

    /// Maximum number of hops from the root page
    pub max_depth: usize,

    /// Maximum number of pages per session, root included
    pub max_pages: usize,

    /// Maximum link candidates taken from one page
    pub max_links_per_page: usize,

    /// Navigation attempts per link (1 = no retry)
    pub navigation_attempts: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: 2,
            max_pages: 15,
            max_links_per_page: 10,
            navigation_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Elements exercised per category per page
    pub elements_per_category: usize,

    /// Exercise every discovered element instead of a bounded sample
    pub comprehensive: bool,

    /// Maximum fields exercised per form
    pub max_form_fields: usize,

    /// Settle delay after scrolling an element into view
    pub settle_delay_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            elements_per_category: 3,
            comprehensive: false,
            max_form_fields: 20,
            settle_delay_ms: 150,
        }
    }
}

impl InteractionConfig {
    /// Per-category bound, `None` in comprehensive mode
    pub fn category_limit(&self) -> Option<usize> {
        if self.comprehensive {
            None
        } else {
            Some(self.elements_per_category)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Broken elements at or above which a session fails
    pub broken_element_threshold: usize,

    /// High-severity failures at or above which a session fails
    pub critical_error_threshold: usize,

    /// Script errors tolerated on one page before EXCESSIVE_JS_ERRORS
    pub max_js_errors_per_page: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            broken_element_threshold: 2,
            critical_error_threshold: 3,
            max_js_errors_per_page: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub action_ms: u64,
    pub evaluate_ms: u64,
    pub navigation_ms: u64,
    pub judge_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            action_ms: 3_000,
            evaluate_ms: 5_000,
            navigation_ms: 15_000,
            judge_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn evaluate(&self) -> Duration {
        Duration::from_millis(self.evaluate_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn judge(&self) -> Duration {
        Duration::from_millis(self.judge_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per session before it is finalized as FAIL
    pub max_attempts: u32,

    /// Backoff base; delay for attempt n is base * n
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 2_000,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub enabled: bool,

    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,

    pub model: String,

    /// Environment variable holding the bearer token
    pub api_key_env: String,

    /// Characters of page HTML included in the prompt
    pub html_sample_chars: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "SITECHECK_JUDGE_API_KEY".to_string(),
            html_sample_chars: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Substrings of request URLs whose failures are ignored
    pub ignored_url_patterns: Vec<String>,

    /// Substrings of script errors that never count against a page
    pub benign_errors: Vec<String>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            ignored_url_patterns: [
                "favicon",
                "google-analytics.com",
                "googletagmanager.com",
                "doubleclick.net",
                "facebook.net",
                "hotjar.com",
                "segment.io",
                "/analytics",
                "sentry.io",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            benign_errors: [
                "ResizeObserver loop",
                "Non-Error promise rejection captured",
                "favicon",
                "Failed to load resource",
                "third-party cookie",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// chromium, firefox, or webkit
    pub browser: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub mobile_viewport_width: u32,
    pub mobile_viewport_height: u32,

    /// Directory whose node_modules provides the playwright package
    pub node_project_dir: Option<std::path::PathBuf>,

    /// Node executable
    pub node_binary: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: "chromium".to_string(),
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            mobile_viewport_width: 375,
            mobile_viewport_height: 667,
            node_project_dir: None,
            node_binary: "node".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> EngineResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> EngineResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.crawl.max_pages == 0 {
            return Err(EngineError::InvalidConfig(
                "crawl.max_pages must be at least 1".to_string(),
            ));
        }
        if self.crawl.navigation_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "crawl.navigation_attempts must be at least 1".to_string(),
            ));
        }
        if !matches!(self.browser.browser.as_str(), "chromium" | "firefox" | "webkit") {
            return Err(EngineError::InvalidConfig(format!(
                "unknown browser '{}'",
                self.browser.browser
            )));
        }
        if self.judge.enabled && self.judge.api_url.is_empty() {
            return Err(EngineError::InvalidConfig(
                "judge.api_url is required when the judge is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.broken_element_threshold, 2);
        assert_eq!(config.thresholds.critical_error_threshold, 3);
        assert_eq!(config.crawl.max_pages, 15);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
[crawl]
max_depth = 4

[thresholds]
broken_element_threshold = 5
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.crawl.max_depth, 4);
        assert_eq!(config.crawl.max_pages, 15);
        assert_eq!(config.thresholds.broken_element_threshold, 5);
        assert_eq!(config.thresholds.critical_error_threshold, 3);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/sitecheck.toml")).unwrap();
        assert!(config.crawl.enabled);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sitecheck.toml");
        let mut config = EngineConfig::default();
        config.interaction.comprehensive = true;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert!(loaded.interaction.comprehensive);
        assert_eq!(loaded.interaction.category_limit(), None);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unknown_browser() {
        let mut config = EngineConfig::default();
        config.browser.browser = "netscape".to_string();
        assert!(config.validate().is_err());
    }
}
