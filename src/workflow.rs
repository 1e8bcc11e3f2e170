//! Follow-up actions and questions attached to every reply.
//!
//! Model-suggested actions keep their order and come first; the intent's
//! default actions are appended after them unless an action with the same
//! label is already present. Labels compare exactly (case-sensitive) and the
//! merged list never exceeds [`MAX_ACTIONS`].
//!
//! This module also owns [`parse_model_reply`], which turns raw inference
//! output into the same `{reply, intent, questions, actions}` shape the
//! fallback engine produces, so both paths are enriched identically.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::config::ChatConfig;
use crate::intent::classify;
use crate::models::{Action, ActionKind, Intent};

/// Upper bound on actions shown with one reply.
pub const MAX_ACTIONS: usize = 4;

/// Where an action points, resolved against [`ChatConfig`] at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    None,
    /// A path on the storefront, joined to `site_url`.
    Site(&'static str),
    /// `mailto:` the configured support address.
    SupportEmail,
}

/// A statically declared [`Action`].
#[derive(Debug, Clone, Copy)]
pub struct ActionTemplate {
    pub label: &'static str,
    pub target: Target,
    pub kind: ActionKind,
}

impl ActionTemplate {
    pub const fn link(label: &'static str, path: &'static str) -> Self {
        Self {
            label,
            target: Target::Site(path),
            kind: ActionKind::Link,
        }
    }

    pub const fn email(label: &'static str) -> Self {
        Self {
            label,
            target: Target::SupportEmail,
            kind: ActionKind::Link,
        }
    }

    pub const fn action(label: &'static str) -> Self {
        Self {
            label,
            target: Target::None,
            kind: ActionKind::Action,
        }
    }

    pub fn render(&self, chat: &ChatConfig) -> Action {
        let url = match self.target {
            Target::None => None,
            Target::Site(path) => Some(format!("{}{}", chat.site_url.trim_end_matches('/'), path)),
            Target::SupportEmail => Some(format!("mailto:{}", chat.support_email)),
        };
        Action::new(self.label, url, self.kind)
    }
}

pub fn render_all(templates: &[ActionTemplate], chat: &ChatConfig) -> Vec<Action> {
    templates.iter().map(|t| t.render(chat)).collect()
}

/// Default actions offered for each intent.
pub fn default_actions(intent: Intent) -> &'static [ActionTemplate] {
    const PRICING: &[ActionTemplate] = &[ActionTemplate::link("View Pricing", "/shop")];
    const FILE_PREP: &[ActionTemplate] = &[
        ActionTemplate::action("Check My Image"),
        ActionTemplate::link("File Prep Guide", "/help/file-prep"),
    ];
    const TURNAROUND: &[ActionTemplate] = &[ActionTemplate::link("Track Order", "/track")];
    const DTF_INFO: &[ActionTemplate] = &[ActionTemplate::link("Browse Products", "/shop")];
    const GANG_SHEET: &[ActionTemplate] = &[ActionTemplate::link("Open Builder", "/builder")];
    const REFUND: &[ActionTemplate] = &[ActionTemplate::email("Contact Support")];
    const ORDER_STATUS: &[ActionTemplate] = &[
        ActionTemplate::link("My Orders", "/account/orders"),
        ActionTemplate::link("Track Shipment", "/track"),
    ];
    const GENERAL: &[ActionTemplate] = &[ActionTemplate::link("Visit Shop", "/shop")];
    const GREETING: &[ActionTemplate] = &[
        ActionTemplate::link("Browse Products", "/shop"),
        ActionTemplate::link("Start a Gang Sheet", "/builder"),
    ];

    match intent {
        Intent::Pricing => PRICING,
        Intent::FilePrep => FILE_PREP,
        Intent::Turnaround => TURNAROUND,
        Intent::DtfInfo => DTF_INFO,
        Intent::GangSheet => GANG_SHEET,
        Intent::Refund => REFUND,
        Intent::OrderStatus => ORDER_STATUS,
        Intent::General => GENERAL,
        Intent::Greeting => GREETING,
    }
}

/// Default follow-up questions, used when the reply carries none.
pub fn default_questions(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Pricing => &[
            "What gang sheet sizes are available?",
            "Do you offer wholesale pricing?",
        ],
        Intent::FilePrep => &[
            "What DPI should my file be?",
            "How do I remove a white background?",
        ],
        Intent::Turnaround => &[
            "How long does standard production take?",
            "Is rush processing available?",
        ],
        Intent::DtfInfo => &[
            "What fabrics work with DTF?",
            "How do I heat press a transfer?",
        ],
        Intent::GangSheet => &[
            "How do I use the gang sheet builder?",
            "What file format should I upload?",
        ],
        Intent::Refund => &[
            "What qualifies for a reprint?",
            "How do I request a refund?",
        ],
        Intent::OrderStatus => &[
            "How do I track my order?",
            "When will my order ship?",
        ],
        Intent::General => &[
            "What products do you offer?",
            "How does DTF printing work?",
        ],
        Intent::Greeting => &[
            "What products do you offer?",
            "How do I place an order?",
        ],
    }
}

/// Result of [`enrich`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrichment {
    pub actions: Vec<Action>,
    pub questions: Vec<String>,
}

/// Merge `primary` with `defaults`, dropping repeated labels and capping the
/// result at [`MAX_ACTIONS`]. The first action with a given label wins.
pub fn merge_actions(primary: Vec<Action>, defaults: Vec<Action>) -> Vec<Action> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(defaults)
        .filter(|a| seen.insert(a.label.clone()))
        .take(MAX_ACTIONS)
        .collect()
}

/// Finalize the actions and questions for a reply classified as `intent`.
pub fn enrich(intent: Intent, model_actions: Vec<Action>, chat: &ChatConfig) -> Enrichment {
    let defaults = render_all(default_actions(intent), chat);
    Enrichment {
        actions: merge_actions(model_actions, defaults),
        questions: default_questions(intent)
            .iter()
            .map(|q| q.to_string())
            .collect(),
    }
}

/// Structured content extracted from one inference response.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub reply: String,
    pub intent: Intent,
    pub questions: Vec<String>,
    pub actions: Vec<Action>,
}

/// Parse raw model output into a [`ModelReply`].
///
/// The outermost `{ ... }` span is taken as the JSON payload, so prose or
/// code fences around it are ignored. Missing or malformed `questions` and
/// `actions` become empty; an absent or unknown `intent` is replaced by
/// [`classify`] on the user's message; an empty `reply` falls back to the
/// raw text. Output with no parseable JSON object is an error.
pub fn parse_model_reply(raw: &str, user_message: &str) -> Result<ModelReply> {
    let start = raw.find('{').context("model output contains no JSON object")?;
    let end = raw
        .rfind('}')
        .filter(|&end| end > start)
        .context("model output contains no JSON object")?;

    let value: Value =
        serde_json::from_str(&raw[start..=end]).context("model output is not valid JSON")?;
    let object = value
        .as_object()
        .context("model output JSON is not an object")?;

    let reply = match object.get("reply").and_then(Value::as_str).map(str::trim) {
        Some(reply) if !reply.is_empty() => reply.to_string(),
        _ => raw.trim().to_string(),
    };

    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Intent>().ok())
        .unwrap_or_else(|| classify(user_message));

    let questions = object
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let actions = object
        .get("actions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|a| serde_json::from_value::<Action>(a.clone()).ok())
                .filter(|a| !a.label.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(ModelReply {
        reply,
        intent,
        questions,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(l: &str) -> Action {
        Action::new(l, None, ActionKind::Link)
    }

    fn labels(actions: &[Action]) -> Vec<&str> {
        actions.iter().map(|a| a.label.as_str()).collect()
    }

    #[test]
    fn test_merge_skips_duplicate_labels() {
        let merged = merge_actions(vec![label("A")], vec![label("A"), label("B")]);
        assert_eq!(labels(&merged), vec!["A", "B"]);
    }

    #[test]
    fn test_merge_never_exceeds_cap() {
        let model: Vec<Action> = (0..6).map(|i| label(&format!("m{}", i))).collect();
        let defaults: Vec<Action> = (0..6).map(|i| label(&format!("d{}", i))).collect();
        let merged = merge_actions(model, defaults);
        assert_eq!(merged.len(), MAX_ACTIONS);
        assert_eq!(labels(&merged), vec!["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let merged = merge_actions(vec![label("open builder")], vec![label("Open Builder")]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_enrich_renders_site_links() {
        let chat = ChatConfig {
            site_url: "https://shop.example/".to_string(),
            support_email: "help@shop.example".to_string(),
            ..ChatConfig::default()
        };

        let order = enrich(Intent::OrderStatus, Vec::new(), &chat);
        assert_eq!(labels(&order.actions), vec!["My Orders", "Track Shipment"]);
        assert_eq!(
            order.actions[0].url.as_deref(),
            Some("https://shop.example/account/orders")
        );
        assert!(!order.questions.is_empty());

        let refund = enrich(Intent::Refund, Vec::new(), &chat);
        assert_eq!(refund.actions[0].url.as_deref(), Some("mailto:help@shop.example"));

        let prep = enrich(Intent::FilePrep, Vec::new(), &chat);
        assert_eq!(prep.actions[0].kind, ActionKind::Action);
        assert!(prep.actions[0].url.is_none());
    }

    #[test]
    fn test_every_intent_has_defaults() {
        for intent in Intent::ALL {
            assert!(!default_actions(intent).is_empty(), "{} has no actions", intent);
            assert!(!default_questions(intent).is_empty(), "{} has no questions", intent);
        }
    }

    #[test]
    fn test_parse_model_reply_with_surrounding_text() {
        let raw = "Sure! Here you go:\n```json\n{\"reply\":\"Gang sheets are 22 inches wide.\",\"intent\":\"gang_sheet\",\"questions\":[\"What sizes?\"],\"actions\":[{\"label\":\"Open Builder\",\"url\":\"/builder\",\"type\":\"link\"}]}\n```";
        let parsed = parse_model_reply(raw, "how wide are gang sheets").unwrap();
        assert_eq!(parsed.reply, "Gang sheets are 22 inches wide.");
        assert_eq!(parsed.intent, Intent::GangSheet);
        assert_eq!(parsed.questions, vec!["What sizes?"]);
        assert_eq!(labels(&parsed.actions), vec!["Open Builder"]);
    }

    #[test]
    fn test_parse_model_reply_unknown_intent_uses_classifier() {
        let raw = r#"{"reply":"We can help.","intent":"shipping_question"}"#;
        let parsed = parse_model_reply(raw, "I want a refund for a damaged transfer").unwrap();
        assert_eq!(parsed.intent, Intent::Refund);

        let null_intent = r#"{"reply":"We can help.","intent":null}"#;
        let parsed = parse_model_reply(null_intent, "hi").unwrap();
        assert_eq!(parsed.intent, Intent::Greeting);
    }

    #[test]
    fn test_parse_model_reply_tolerates_bad_fields() {
        let raw = r#"{"reply":"","questions":"not a list","actions":[{"label":"Ok"},{"nope":1},{"label":"Bad","type":"button"}]}"#;
        let parsed = parse_model_reply(raw, "hello").unwrap();
        assert_eq!(parsed.reply, raw);
        assert!(parsed.questions.is_empty());
        assert_eq!(labels(&parsed.actions), vec!["Ok"]);
    }

    #[test]
    fn test_parse_model_reply_rejects_non_json() {
        assert!(parse_model_reply("I'm not sure, sorry.", "hi").is_err());
        assert!(parse_model_reply("} backwards {", "hi").is_err());
        assert!(parse_model_reply("{not json at all}", "hi").is_err());
    }
}
