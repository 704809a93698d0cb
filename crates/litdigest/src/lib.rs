//! Weekly literature digest built on PubMed E-utilities.
//!
//! This crate provides:
//! - Boolean query and rolling-window construction for a topic profile
//! - Retrying access to the index's search, summary and metadata endpoints
//! - Duplicate collapsing, recency ranking and snippet extraction
//! - HTML, plain-text and abstracts-page rendering
//! - SMTP delivery and optional AI summaries

pub mod config;
pub mod digest;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod query;

// Re-export main types
pub use config::{DigestConfig, SmtpConfig, TopicProfile};
pub use error::{DigestError, Result};
pub use index::{ArticleRecord, CandidateId};
pub use pipeline::{AssembledDigest, Pipeline, RunOutcome, RunReport, RunStatus};
pub use query::{QueryBuilder, SearchWindow};
