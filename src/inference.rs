//! Inference backend abstraction and the Ollama HTTP client.
//!
//! The chat pipeline only sees [`ChatBackend`]: an ordered list of
//! role-tagged messages in, one assistant message out. Deadlines are applied
//! by the caller, so implementations make a single attempt and never retry.
//!
//! [`OllamaBackend`] talks to a local Ollama server:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`chat`](ChatBackend::chat) | `POST {url}/api/chat` with `stream: false` |
//! | [`health`](ChatBackend::health) | `GET {url}/api/tags` |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{Config, InferenceConfig};
use crate::models::Message;

/// Reachability of the inference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Ok,
    Down,
}

/// Result of a backend health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    pub status: BackendStatus,
    /// Configured model when installed, `"model not found"` otherwise.
    /// Absent when the backend is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl BackendHealth {
    pub fn down() -> Self {
        Self {
            status: BackendStatus::Down,
            model: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == BackendStatus::Ok
    }
}

/// A language-model service that answers one conversation per call.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier sent with every request.
    fn model_name(&self) -> &str;

    /// Send `messages` and return the assistant's raw text.
    ///
    /// Any non-success status, transport failure or malformed body is an
    /// error.
    async fn chat(&self, messages: &[Message]) -> Result<String>;

    /// Probe the backend. Never fails; an unreachable backend is
    /// [`BackendStatus::Down`].
    async fn health(&self) -> BackendHealth;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// [`ChatBackend`] backed by an Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    health_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            num_predict: config.num_predict,
            health_timeout: config.health_timeout(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: SamplingOptions {
                temperature: self.temperature,
                top_p: self.top_p,
                num_predict: self.num_predict,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama returned {}: {}", status, body_text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Invalid Ollama response body")?;
        Ok(parsed.message.content)
    }

    async fn health(&self) -> BackendHealth {
        let response = match self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return BackendHealth::down(),
        };

        let Ok(tags) = response.json::<TagsResponse>().await else {
            return BackendHealth::down();
        };

        let family = model_family(&self.model);
        let installed = tags.models.iter().any(|m| m.name.starts_with(family));
        BackendHealth {
            status: BackendStatus::Ok,
            model: Some(if installed {
                self.model.clone()
            } else {
                "model not found".to_string()
            }),
        }
    }
}

/// The part of a model tag before `:`, e.g. `llama3.1` for `llama3.1:8b`.
pub fn model_family(model: &str) -> &str {
    model.split(':').next().unwrap_or(model)
}

/// `rep health`: probe the configured backend.
pub async fn run_health(config: &Config) -> Result<()> {
    let backend = OllamaBackend::new(&config.inference)?;
    let health = backend.health().await;

    println!("backend: {}", backend.url());
    match health.status {
        BackendStatus::Ok => println!("status:  ok"),
        BackendStatus::Down => println!("status:  down"),
    }
    if let Some(model) = &health.model {
        println!("model:   {}", model);
    }
    Ok(())
}
