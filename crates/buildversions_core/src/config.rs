use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::render::DEFAULT_COMMIT_URL_TEMPLATE;

pub const DEFAULT_CONFIG_PATH: &str = ".buildversions/config.toml";
pub const DEFAULT_USER_AGENT: &str = "buildversions/0.2";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PAGE_NAME: &str = "Build versions";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BuildVersionsConfig {
    #[serde(default)]
    pub confluence: ConfluenceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ConfluenceSection {
    pub commit_url_template: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl BuildVersionsConfig {
    /// Resolve the commit link template: env BUILDVERSIONS_COMMIT_URL_TEMPLATE > config > default.
    pub fn commit_url_template(&self) -> String {
        self.commit_url_template_with(env_lookup)
    }

    /// Resolve user agent: env BUILDVERSIONS_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        self.user_agent_with(env_lookup)
    }

    /// Resolve request timeout: env BUILDVERSIONS_HTTP_TIMEOUT_MS > config > DEFAULT_TIMEOUT_MS.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms_with(env_lookup)
    }

    fn commit_url_template_with(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup("BUILDVERSIONS_COMMIT_URL_TEMPLATE")
            .or_else(|| self.confluence.commit_url_template.clone())
            .unwrap_or_else(|| DEFAULT_COMMIT_URL_TEMPLATE.to_string())
    }

    fn user_agent_with(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup("BUILDVERSIONS_USER_AGENT")
            .or_else(|| self.confluence.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    fn timeout_ms_with(&self, lookup: impl Fn(&str) -> Option<String>) -> u64 {
        lookup("BUILDVERSIONS_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.confluence.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}

fn env_lookup(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Load and parse a config from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BuildVersionsConfig> {
    if !config_path.exists() {
        return Ok(BuildVersionsConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BuildVersionsConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, BuildVersionsConfig::default());
    }

    #[test]
    fn load_config_parses_confluence_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[confluence]
commit_url_template = "https://git.example.org/app/-/commit/{commit}"
user_agent = "ci-publisher/1.0"
timeout_ms = 5000
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.commit_url_template_with(no_env),
            "https://git.example.org/app/-/commit/{commit}"
        );
        assert_eq!(config.user_agent_with(no_env), "ci-publisher/1.0");
        assert_eq!(config.timeout_ms_with(no_env), 5000);
    }

    #[test]
    fn load_config_tolerates_unrelated_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[paths]\nroot = \"/repo\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.confluence.user_agent.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[confluence\ntimeout_ms = 1").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let config = BuildVersionsConfig::default();
        assert_eq!(config.commit_url_template_with(no_env), DEFAULT_COMMIT_URL_TEMPLATE);
        assert_eq!(config.user_agent_with(no_env), DEFAULT_USER_AGENT);
        assert_eq!(config.timeout_ms_with(no_env), DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn env_overrides_config_values() {
        let mut config = BuildVersionsConfig::default();
        config.confluence.user_agent = Some("from-file".to_string());
        config.confluence.timeout_ms = Some(1_000);
        let lookup = |key: &str| match key {
            "BUILDVERSIONS_USER_AGENT" => Some("from-env".to_string()),
            "BUILDVERSIONS_HTTP_TIMEOUT_MS" => Some("not-a-number".to_string()),
            _ => None,
        };
        assert_eq!(config.user_agent_with(lookup), "from-env");
        assert_eq!(config.timeout_ms_with(lookup), 1_000);
    }
}
