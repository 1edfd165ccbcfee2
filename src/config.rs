use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{GmailError, Result};
use crate::rules::{default_rules, RuleConfig, RuleSet};

/// Upper bound for `organizer.max_messages`
pub const MAX_MESSAGES_LIMIT: u32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub organizer: OrganizerConfig,
    #[serde(default = "default_rule_sets")]
    pub rule_sets: BTreeMap<String, Vec<RuleConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            organizer: OrganizerConfig::default(),
            rule_sets: default_rule_sets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizerConfig {
    /// How many of the most recent messages one run looks at
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Name of the entry in `rule_sets` to apply
    #[serde(default = "default_rule_set_name")]
    pub rule_set: String,
    /// Optional Gmail search query narrowing the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    /// Log running totals every this many processed messages
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            rule_set: default_rule_set_name(),
            query: None,
            dry_run: false,
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_max_messages() -> u32 {
    100
}

fn default_rule_set_name() -> String {
    "default".to_string()
}

fn default_progress_interval() -> usize {
    10
}

fn default_rule_sets() -> BTreeMap<String, Vec<RuleConfig>> {
    BTreeMap::from([(default_rule_set_name(), default_rules())])
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_toml(&content)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GmailError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.organizer.max_messages == 0 {
            return Err(GmailError::ConfigError(
                "organizer.max_messages must be at least 1".to_string(),
            ));
        }
        if self.organizer.max_messages > MAX_MESSAGES_LIMIT {
            return Err(GmailError::ConfigError(format!(
                "organizer.max_messages cannot exceed {}",
                MAX_MESSAGES_LIMIT
            )));
        }
        if self.organizer.progress_interval == 0 {
            return Err(GmailError::ConfigError(
                "organizer.progress_interval must be at least 1".to_string(),
            ));
        }
        if self.organizer.query.as_deref().is_some_and(|q| q.trim().is_empty()) {
            return Err(GmailError::ConfigError(
                "organizer.query cannot be blank; omit it instead".to_string(),
            ));
        }

        if !self.rule_sets.contains_key(&self.organizer.rule_set) {
            return Err(GmailError::ConfigError(format!(
                "organizer.rule_set '{}' is not defined in rule_sets",
                self.organizer.rule_set
            )));
        }

        for (name, rules) in &self.rule_sets {
            if rules.is_empty() {
                return Err(GmailError::ConfigError(format!(
                    "rule set '{}' has no rules",
                    name
                )));
            }
            for rule in rules {
                rule.validate().map_err(|e| match e {
                    GmailError::ConfigError(msg) => {
                        GmailError::ConfigError(format!("rule set '{}': {}", name, msg))
                    }
                    other => other,
                })?;
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Build the named rule set, or the configured default when `name` is `None`
    pub fn rule_set(&self, name: Option<&str>) -> Result<RuleSet> {
        let name = name.unwrap_or(&self.organizer.rule_set);
        let rules = self.rule_sets.get(name).ok_or_else(|| {
            GmailError::ConfigError(format!(
                "unknown rule set '{}' (available: {})",
                name,
                self.rule_sets.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        RuleSet::from_config(rules)
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
