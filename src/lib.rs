//! # Printshop Rep
//!
//! Customer support chat core for a print-on-demand storefront.
//!
//! A small Markdown knowledge base is cut into snippets and ranked with
//! TF-IDF cosine similarity; the best snippets ground a prompt for a local
//! language model. When the model is slow, down, or answers with something
//! that is not the expected JSON, a pattern-matched library of canned replies
//! answers instead, so every request gets a well-formed structured reply.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!  request ─────▶│ RateGovernor │── rejected ──▶ 429
//!                └──────┬───────┘
//!                       ▼
//!   ┌───────────┐  ┌──────────┐   ┌─────────────┐
//!   │ Knowledge │─▶│ Retriever│──▶│ ChatBackend │── ok ──▶ parse ─┐
//!   │   Index   │  └──────────┘   └──────┬──────┘                 │
//!   └───────────┘                        │ error / timeout        ▼
//!                                        └──▶ Fallback ──▶ Workflow enrich ──▶ reply
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rep sources                              # list knowledge documents
//! rep search "how wide is a gang sheet"    # ranked snippets
//! rep classify "where is my package"       # intent
//! rep ask "what DPI do I need?"            # one full chat turn, JSON out
//! rep serve                                # start the HTTP service
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`knowledge`] | Snippet parser, term statistics, lazily built index |
//! | [`search`] | TF-IDF cosine retriever |
//! | [`rate_limit`] | Per-client sliding-window governor |
//! | [`intent`] | Keyword intent classifier |
//! | [`fallback`] | Canned replies for backend outages |
//! | [`workflow`] | Action/question enrichment and model output parsing |
//! | [`inference`] | Backend trait and Ollama client |
//! | [`assistant`] | The chat pipeline |
//! | [`server`] | HTTP service |
//! | [`sources`] | Knowledge document listing |

pub mod assistant;
pub mod config;
pub mod fallback;
pub mod inference;
pub mod intent;
pub mod knowledge;
pub mod models;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod sources;
pub mod workflow;
