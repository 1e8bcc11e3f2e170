//! Keyword-scoring intent classifier.
//!
//! Short messages (under 20 characters) are checked against the greeting
//! keywords first, by prefix or exact match. Everything else is scored per
//! intent by counting how many of that intent's keywords occur as
//! substrings of the lower-cased message. The strictly highest score wins,
//! so ties go to the intent listed first in [`INTENT_KEYWORDS`]. A message
//! with no keyword hits is [`Intent::General`].

use crate::models::Intent;

/// Messages shorter than this are eligible for the greeting shortcut.
const GREETING_MAX_CHARS: usize = 20;

const GREETING_KEYWORDS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "sup",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

/// Scored intents in tie-break order.
pub const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Pricing,
        &["price", "cost", "how much", "rate", "fee", "cheap", "expensive", "discount", "coupon"],
    ),
    (
        Intent::FilePrep,
        &[
            "file",
            "image",
            "png",
            "dpi",
            "resolution",
            "upload",
            "format",
            "prepare",
            "prep",
            "photoshop",
            "transparent",
        ],
    ),
    (
        Intent::Turnaround,
        &[
            "turnaround",
            "shipping",
            "delivery",
            "how long",
            "when",
            "time",
            "days",
            "rush",
            "fast",
            "quick",
            "track",
        ],
    ),
    (
        Intent::DtfInfo,
        &["dtf", "direct to film", "sublimation", "screen print", "heat press", "transfer", "vinyl"],
    ),
    (
        Intent::GangSheet,
        &["gang sheet", "sheet", "builder", "canvas", "arrange", "layout", "size"],
    ),
    (
        Intent::Refund,
        &["refund", "return", "cancel", "wrong", "defect", "damage", "money back", "complaint"],
    ),
    (
        Intent::OrderStatus,
        &["order", "status", "tracking", "where", "shipped", "package"],
    ),
];

/// Classify a customer message into exactly one [`Intent`].
pub fn classify(message: &str) -> Intent {
    let lower = message.to_lowercase();

    if lower.chars().count() < GREETING_MAX_CHARS
        && GREETING_KEYWORDS.iter().any(|k| lower.starts_with(k))
    {
        return Intent::Greeting;
    }

    let mut best = Intent::General;
    let mut best_score = 0;
    for (intent, keywords) in INTENT_KEYWORDS {
        let score = keywords.iter().filter(|k| lower.contains(*k)).count();
        if score > best_score {
            best_score = score;
            best = *intent;
        }
    }
    best
}

/// `rep classify`: print the intent for a message.
pub fn run_classify(message: &str) {
    println!("{}", classify(message));
}
