//! TOML configuration.
//!
//! Every field carries a default, so an empty file (or no file at all) is a
//! valid configuration. A handful of environment variables override the file
//! after it is parsed, which keeps container deployments free of config
//! templating:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `REP_BIND` | `server.bind` |
//! | `OLLAMA_API_URL` | `inference.url` |
//! | `OLLAMA_MODEL` | `inference.model` |
//! | `OLLAMA_TIMEOUT_MS` | `inference.timeout_ms` |
//! | `RATE_LIMIT_RPM` | `rate_limit.max_requests` |
//! | `REP_SITE_URL` | `chat.site_url` |
//!
//! Invariant violations (a zero-length rate window, a zero timeout, ...) are
//! rejected by [`load_config`] so they surface at startup, never per request.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3100".to_string()
}

/// Where the knowledge base lives and how it is cut into snippets.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Heading blocks shorter than this (trimmed, heading included) are noise.
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    /// Blocks whose body below the heading is shorter than this are dropped.
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root: default_knowledge_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            min_section_chars: default_min_section_chars(),
            min_body_chars: default_min_body_chars(),
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_knowledge_root() -> PathBuf {
    PathBuf::from("./data/knowledge")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_min_section_chars() -> usize {
    20
}
fn default_min_body_chars() -> usize {
    10
}
fn default_top_k() -> usize {
    4
}
fn default_min_score() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_max_requests() -> usize {
    20
}
fn default_window_ms() -> u64 {
    60_000
}
fn default_sweep_interval_secs() -> u64 {
    300
}

/// Ollama-compatible chat backend settings.
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_inference_url(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            num_predict: default_num_predict(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

fn default_inference_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_num_predict() -> u32 {
    512
}
fn default_health_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Longest history a caller may submit.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// How many of the most recent history messages reach the model.
    #[serde(default = "default_prompt_history")]
    pub prompt_history: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_support_email")]
    pub support_email: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            prompt_history: default_prompt_history(),
            max_message_chars: default_max_message_chars(),
            site_url: default_site_url(),
            support_email: default_support_email(),
        }
    }
}

fn default_max_history() -> usize {
    20
}
fn default_prompt_history() -> usize {
    10
}
fn default_max_message_chars() -> usize {
    1000
}
fn default_site_url() -> String {
    "https://uchooseweprint.com".to_string()
}
fn default_support_email() -> String {
    "support@uchooseweprint.com".to_string()
}

/// Load configuration from `path`, apply environment overrides and validate.
///
/// A missing file yields the defaults; an unreadable or malformed one is an
/// error.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parse a TOML document into a [`Config`] without validating it.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides using `lookup` as the variable source.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = lookup("REP_BIND") {
        config.server.bind = bind;
    }
    if let Some(url) = lookup("OLLAMA_API_URL") {
        config.inference.url = url;
    }
    if let Some(model) = lookup("OLLAMA_MODEL") {
        config.inference.model = model;
    }
    if let Some(timeout) = lookup("OLLAMA_TIMEOUT_MS") {
        config.inference.timeout_ms = timeout
            .trim()
            .parse()
            .with_context(|| format!("OLLAMA_TIMEOUT_MS is not a number: '{}'", timeout))?;
    }
    if let Some(rpm) = lookup("RATE_LIMIT_RPM") {
        config.rate_limit.max_requests = rpm
            .trim()
            .parse()
            .with_context(|| format!("RATE_LIMIT_RPM is not a number: '{}'", rpm))?;
    }
    if let Some(site) = lookup("REP_SITE_URL") {
        config.chat.site_url = site;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    // Rate limiting
    if config.rate_limit.window_ms == 0 {
        bail!("rate_limit.window_ms must be > 0");
    }
    if config.rate_limit.max_requests == 0 {
        bail!("rate_limit.max_requests must be > 0");
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        bail!("rate_limit.sweep_interval_secs must be > 0");
    }

    // Retrieval
    if config.knowledge.top_k == 0 {
        bail!("knowledge.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.knowledge.min_score) {
        bail!("knowledge.min_score must be in [0.0, 1.0]");
    }

    // Inference
    if config.inference.timeout_ms == 0 {
        bail!("inference.timeout_ms must be > 0");
    }
    if config.inference.health_timeout_ms == 0 {
        bail!("inference.health_timeout_ms must be > 0");
    }
    if config.inference.model.trim().is_empty() {
        bail!("inference.model must not be empty");
    }

    // Chat
    if config.chat.max_message_chars == 0 {
        bail!("chat.max_message_chars must be > 0");
    }
    if config.chat.prompt_history > config.chat.max_history {
        bail!(
            "chat.prompt_history ({}) must not exceed chat.max_history ({})",
            config.chat.prompt_history,
            config.chat.max_history
        );
    }

    Ok(())
}
