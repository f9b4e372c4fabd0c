use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Connection settings for the automation driver server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Target platform, decides which element attribute rules apply.
    /// Supported: "android", "mac".
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Raw capability object sent verbatim when the session is created.
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

fn default_server_url() -> String {
    "http://localhost:4723".to_string()
}

fn default_platform() -> String {
    "android".to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            platform: default_platform(),
            capabilities: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Settings for the text-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_class_prompt")]
    pub class_generator_prompt: String,
    #[serde(default = "default_tester_prompt")]
    pub tester_prompt: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_class_prompt() -> String {
    CLASS_GENERATOR_PROMPT.to_string()
}

fn default_tester_prompt() -> String {
    TESTER_PROMPT.to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            class_generator_prompt: default_class_prompt(),
            tester_prompt: default_tester_prompt(),
        }
    }
}

/// Prompt for synthesizing a view interaction script. Placeholders:
/// `{class_name}` and `{elements_json}`.
pub const CLASS_GENERATOR_PROMPT: &str = r#"You are modeling one screen of a mobile/desktop application for UI automation.

Write a Rhai script named {class_name} that exposes one function per meaningful user interaction on this screen.

Rules:
- The script MUST define `fn view_name() { "{class_name}" }`.
- Each interaction is a top-level function with a snake_case name (e.g. click_login, enter_username).
- Inside functions, use only these primitives: click(strategy, value), enter_text(strategy, value, text), get_text(strategy, value), is_displayed(strategy, value), swipe(sx, sy, ex, ey, duration_ms), scroll_to(strategy, value), wait_for_element(strategy, value, timeout_secs).
- Do not redefine any primitive.
- A function taking free-form options receives them as a map in its last parameter.
- Locator strategy and value come from the element data below.

Elements on screen:
{elements_json}
"#;

/// Prompt for proposing next actions. Placeholders: `{class_api}` and
/// `{previous_steps}`.
pub const TESTER_PROMPT: &str = r#"You are exploring an application screen by screen.

The current view exposes this API:
{class_api}

Calls executed so far, oldest first:
{previous_steps}

Propose the most plausible next user actions as candidates. For each candidate give:
- view: the view name
- action: a function name from the API (or a /regex/ matching one)
- args: comma-separated double-quoted strings, or empty
- kwargs: comma-separated key=value pairs, or empty

Prefer actions not tried yet. Order candidates by how likely a real user would do them next.
"#;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// `APPMODELER_API_KEY` wins over the config file so the key never has
    /// to live on disk.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("APPMODELER_API_KEY") {
            if !key.is_empty() {
                self.ai.api_key = key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.driver.server_url, "http://localhost:4723");
        assert_eq!(config.driver.platform, "android");
        assert_eq!(config.ai.model, "gpt-4o-mini");
        assert!(config.ai.class_generator_prompt.contains("{class_name}"));
        assert!(config.ai.tester_prompt.contains("{previous_steps}"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{"driver": {"platform": "mac"}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.driver.platform, "mac");
        assert_eq!(config.driver.server_url, "http://localhost:4723");
        assert!(!config.ai.tester_prompt.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let mut config = Config::default();
        config.driver.platform = "mac".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths.config_file()).unwrap();
        assert_eq!(loaded.driver.platform, "mac");
    }
}
