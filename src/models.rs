//! Core data models shared by the retrieval, workflow and chat layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of purposes a customer message can have.
///
/// Declaration order matters: the intent classifier breaks score ties in
/// favour of the intent declared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Pricing,
    FilePrep,
    Turnaround,
    DtfInfo,
    GangSheet,
    Refund,
    OrderStatus,
    General,
    Greeting,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::Pricing,
        Intent::FilePrep,
        Intent::Turnaround,
        Intent::DtfInfo,
        Intent::GangSheet,
        Intent::Refund,
        Intent::OrderStatus,
        Intent::General,
        Intent::Greeting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Pricing => "pricing",
            Intent::FilePrep => "file_prep",
            Intent::Turnaround => "turnaround",
            Intent::DtfInfo => "dtf_info",
            Intent::GangSheet => "gang_sheet",
            Intent::Refund => "refund",
            Intent::OrderStatus => "order_status",
            Intent::General => "general",
            Intent::Greeting => "greeting",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown intent: '{}'", s))
    }
}

/// How the widget should render an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Link,
    Info,
    Action,
}

/// A suggested follow-up affordance. Deduplicated by `label` when merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(label: impl Into<String>, url: Option<String>, kind: ActionKind) -> Self {
        Self {
            label: label.into(),
            url,
            kind,
        }
    }
}

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message, used both for caller history and model prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A retrievable unit of knowledge-base text. Immutable once indexed.
#[derive(Debug, Clone)]
pub struct Snippet {
    pub content: String,
    pub source_name: String,
    pub heading: String,
    /// Max-normalized term frequencies, every weight in `(0, 1]`.
    pub term_vector: BTreeMap<String, f64>,
}

/// A snippet selected by the retriever, with its cosine score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSnippet {
    pub content: String,
    pub source_name: String,
    pub heading: String,
    pub score: f64,
}

impl RetrievedSnippet {
    /// `"<source>: <heading>"`, the form reported back to callers.
    pub fn citation(&self) -> String {
        format!("{}: {}", self.source_name, self.heading)
    }
}

/// The fully structured answer to one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub intent: Intent,
    pub questions: Vec<String>,
    pub actions: Vec<Action>,
    pub sources: Vec<String>,
}
