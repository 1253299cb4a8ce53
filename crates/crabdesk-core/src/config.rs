use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Startup-fatal configuration problems. Anything listed here aborts the
/// process before any message is handled; nothing is validated per call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("escalation keyword vocabulary is empty")]
    EmptyEscalationVocabulary,

    #[error("cancellation label set is empty")]
    EmptyCancellationLabels,

    #[error("social watch is enabled but the hashtag set is empty")]
    EmptyHashtags,

    #[error("threshold {name} out of range: {value}")]
    BadThreshold { name: &'static str, value: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub env: String,
}

fn default_low_confidence() -> f32 {
    0.5
}

fn default_severe_sentiment() -> f32 {
    -0.7
}

fn default_high_sentiment() -> f32 {
    -0.85
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationThresholds {
    /// Confidence below this escalates.
    #[serde(default = "default_low_confidence")]
    pub low_confidence: f32,
    /// Sentiment below this escalates.
    #[serde(default = "default_severe_sentiment")]
    pub severe_sentiment: f32,
    /// Sentiment at or below this ranks the ticket high.
    #[serde(default = "default_high_sentiment")]
    pub high_sentiment: f32,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            low_confidence: default_low_confidence(),
            severe_sentiment: default_severe_sentiment(),
            high_sentiment: default_high_sentiment(),
        }
    }
}

fn default_context_ttl_secs() -> i64 {
    86_400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Keywords that flag a message for human handling.
    pub keywords: Vec<String>,
    /// Legal/regulatory keywords. Matches always escalate, at urgent.
    #[serde(default)]
    pub legal_keywords: Vec<String>,
    /// Intent labels that count as a cancellation request.
    pub cancellation_labels: Vec<String>,
    #[serde(default)]
    pub thresholds: EscalationThresholds,
    /// A conversation idle longer than this starts fresh, resetting its
    /// prior-escalation counter.
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: i64,
}

fn default_engine_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base_url: String,
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_replies_per_window() -> usize {
    3
}

fn default_reply_window_secs() -> i64 {
    3_600
}

fn default_seen_window_secs() -> i64 {
    86_400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default)]
    pub enabled: bool,
    pub instance_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Public replies allowed per author per rolling window.
    #[serde(default = "default_replies_per_window")]
    pub replies_per_window: usize,
    #[serde(default = "default_reply_window_secs")]
    pub reply_window_secs: i64,
    /// How long processed post ids are remembered.
    #[serde(default = "default_seen_window_secs")]
    pub seen_window_secs: i64,
    /// Base URL the contact reference link points at.
    pub contact_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    pub app: AppConfig,
    pub escalation: EscalationConfig,
    pub engine: EngineConfig,
    pub social: SocialConfig,
    pub storage: StorageConfig,
}

/// Expand `${VAR}` references from the process environment. Unset
/// variables expand to the empty string.
pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

pub fn load_config(root: &Path) -> Result<DeskConfig> {
    let path = root.join("crabdesk.yaml");
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: DeskConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))?;

    config.engine.base_url = resolve_env_var(&config.engine.base_url);
    config.social.instance_url = resolve_env_var(&config.social.instance_url);
    config.social.access_token = resolve_env_var(&config.social.access_token);

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &DeskConfig) -> Result<()> {
    if config.escalation.keywords.is_empty() {
        return Err(ConfigError::EmptyEscalationVocabulary.into());
    }
    if config.escalation.cancellation_labels.is_empty() {
        return Err(ConfigError::EmptyCancellationLabels.into());
    }
    if config.social.enabled && config.social.hashtags.is_empty() {
        return Err(ConfigError::EmptyHashtags.into());
    }

    let t = &config.escalation.thresholds;
    if !(0.0..=1.0).contains(&t.low_confidence) {
        return Err(ConfigError::BadThreshold {
            name: "low_confidence",
            value: t.low_confidence,
        }
        .into());
    }
    if !(-1.0..=1.0).contains(&t.severe_sentiment) {
        return Err(ConfigError::BadThreshold {
            name: "severe_sentiment",
            value: t.severe_sentiment,
        }
        .into());
    }
    if !(-1.0..=1.0).contains(&t.high_sentiment) || t.high_sentiment > t.severe_sentiment {
        return Err(ConfigError::BadThreshold {
            name: "high_sentiment",
            value: t.high_sentiment,
        }
        .into());
    }

    Ok(())
}
