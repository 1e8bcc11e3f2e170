//! The chat pipeline.
//!
//! ```text
//! message ─▶ retrieve ─▶ build prompt ─▶ backend.chat (one timed attempt)
//!                                            │ ok            │ error / timeout / unparseable
//!                                            ▼               ▼
//!                                     parse_model_reply   fallback::best_match
//!                                            └──────┬────────┘
//!                                                   ▼
//!                                          workflow::enrich ─▶ ChatReply
//! ```
//!
//! Admission is checked separately with [`Assistant::check_and_record`]
//! before a turn is handled. [`Assistant::handle_chat_turn`] itself never
//! fails: every backend problem is logged and replaced by a canned reply.
//! No lock is held while the backend call is in flight.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::config::{ChatConfig, Config};
use crate::fallback;
use crate::inference::{ChatBackend, OllamaBackend};
use crate::intent::classify;
use crate::knowledge::LazyIndex;
use crate::models::{ChatReply, Message, RetrievedSnippet, Role};
use crate::rate_limit::{RateDecision, RateGovernor};
use crate::search::{retrieve, RetrievalParams};
use crate::workflow::{enrich, parse_model_reply, render_all, ModelReply};

/// Persona and output contract sent as the system message.
pub const SYSTEM_PROMPT: &str = r#"You are Ava, the customer support representative for U Choose We Print (uchooseweprint.com), a DTF (Direct-to-Film) print-on-demand shop.

The shop sells custom DTF transfers and gang sheets, custom apparel (Gildan, Next Level, Bella+Canvas, Comfort Colors, Champion), sublimation prints, home decor and promotional products, to retail customers and approved wholesale accounts.

Useful pages: /shop (catalog), /builder (gang sheet builder), /track (shipment tracking), /account/orders (order history), /login and /register.

Guidelines:
- Be friendly, concise and concrete. Prefer short paragraphs and bullet lists.
- Only state prices, sizes and timelines that appear in the knowledge base context. If you are unsure, say so and point the customer to support.
- Never invent order details. For order-specific problems ask for the order number and refer to support@uchooseweprint.com.

Respond with ONLY a JSON object in exactly this format:
{
  "reply": "your answer to the customer",
  "intent": "one of: pricing, file_prep, turnaround, dtf_info, gang_sheet, refund, order_status, general, greeting",
  "questions": ["up to 3 short follow-up questions the customer might ask next"],
  "actions": [{"label": "button text", "url": "https://uchooseweprint.com/...", "type": "link"}]
}"#;

/// Assemble the message list for one inference call.
///
/// The system message is `system_prompt` followed by a context block with
/// every retrieved snippet. Only the last `history_limit` history messages
/// are forwarded, and caller-supplied system messages are dropped.
pub fn build_prompt(
    system_prompt: &str,
    context: &[RetrievedSnippet],
    history: &[Message],
    history_limit: usize,
    message: &str,
) -> Vec<Message> {
    let mut system = system_prompt.to_string();
    if !context.is_empty() {
        system.push_str("\n\nRelevant knowledge base context:\n");
        let blocks: Vec<String> = context
            .iter()
            .map(|c| format!("[Source: {} — {}]\n{}", c.source_name, c.heading, c.content))
            .collect();
        system.push_str(&blocks.join("\n\n"));
    }

    let conversation: Vec<&Message> = history.iter().filter(|m| m.role != Role::System).collect();
    let skip = conversation.len().saturating_sub(history_limit);

    let mut messages = Vec::with_capacity(conversation.len() - skip + 2);
    messages.push(Message::new(Role::System, system));
    messages.extend(conversation.into_iter().skip(skip).cloned());
    messages.push(Message::new(Role::User, message));
    messages
}

/// Canned reply for `message`, shaped like a parsed model reply.
///
/// When only the catch-all entry matches, the intent comes from the keyword
/// classifier so the reply still gets intent-specific actions.
pub fn fallback_reply(message: &str, chat: &ChatConfig) -> ModelReply {
    let entry = fallback::best_match(message);
    let intent = if entry.is_default() {
        classify(message)
    } else {
        entry.intent
    };
    ModelReply {
        reply: entry.reply.to_string(),
        intent,
        questions: entry.questions.iter().map(|q| q.to_string()).collect(),
        actions: render_all(entry.actions, chat),
    }
}

/// Owns the shared state of the chat service.
pub struct Assistant {
    config: Config,
    index: LazyIndex,
    governor: Arc<RateGovernor>,
    backend: Arc<dyn ChatBackend>,
}

impl Assistant {
    pub fn new(config: Config, backend: Arc<dyn ChatBackend>) -> Self {
        let index = LazyIndex::new(config.knowledge.clone());
        Self::with_index(config, index, backend)
    }

    pub fn with_index(config: Config, index: LazyIndex, backend: Arc<dyn ChatBackend>) -> Self {
        let governor = Arc::new(RateGovernor::from_config(&config.rate_limit));
        Self {
            config,
            index,
            governor,
            backend,
        }
    }

    /// Build an assistant backed by the configured Ollama server.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = Arc::new(OllamaBackend::new(&config.inference)?);
        Ok(Self::new(config, backend))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &LazyIndex {
        &self.index
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Admission check for `client_key`. Rejections are logged here.
    pub fn check_and_record(&self, client_key: &str) -> RateDecision {
        let decision = self.governor.check_and_record(client_key);
        if !decision.allowed {
            tracing::warn!(client = client_key, "rate limit exceeded");
        }
        decision
    }

    /// Grounding snippets for `query`, building the index on first use.
    pub fn retrieve(&self, query: &str) -> Vec<RetrievedSnippet> {
        let index = self.index.get();
        retrieve(&index, query, RetrievalParams::from(&self.config))
    }

    /// Answer one chat turn.
    pub async fn handle_chat_turn(
        &self,
        client_key: &str,
        message: &str,
        history: &[Message],
    ) -> ChatReply {
        let context = self.retrieve(message);
        let prompt = build_prompt(
            SYSTEM_PROMPT,
            &context,
            history,
            self.config.chat.prompt_history,
            message,
        );

        let parsed = self
            .ask_backend(&prompt)
            .await
            .and_then(|raw| parse_model_reply(&raw, message));

        let reply = match parsed {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    client = client_key,
                    error = %format!("{:#}", e),
                    "inference unavailable, using fallback reply"
                );
                fallback_reply(message, &self.config.chat)
            }
        };

        let enrichment = enrich(reply.intent, reply.actions, &self.config.chat);
        let questions = if reply.questions.is_empty() {
            enrichment.questions
        } else {
            reply.questions
        };

        ChatReply {
            reply: reply.reply,
            intent: reply.intent,
            questions,
            actions: enrichment.actions,
            sources: context.iter().map(RetrievedSnippet::citation).collect(),
        }
    }

    /// One bounded attempt; the call is dropped (cancelled) at the deadline.
    async fn ask_backend(&self, prompt: &[Message]) -> Result<String> {
        let timeout = self.config.inference.timeout();
        match tokio::time::timeout(timeout, self.backend.chat(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "inference timed out after {} ms",
                timeout.as_millis()
            )),
        }
    }
}

/// `rep ask`: run one full turn and print the reply as JSON.
pub async fn run_ask(config: &Config, message: &str) -> Result<()> {
    let assistant = Assistant::from_config(config.clone())?;

    let decision = assistant.check_and_record("cli");
    if !decision.allowed {
        anyhow::bail!("Rate limit exceeded");
    }

    let reply = assistant.handle_chat_turn("cli", message, &[]).await;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}
