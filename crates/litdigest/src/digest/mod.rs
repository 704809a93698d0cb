//! Digest assembly: ranking, excerpts, summaries, rendering and delivery.

mod dedup;
mod email;
mod item;
mod page;
mod render;
mod snippet;
mod summarizer;

pub use dedup::{dedup_and_rank, DedupKey};
pub use email::{DispatchError, Mailer, SmtpMailer};
pub use item::DigestItem;
pub use page::{FilePageSink, PageError, PageLocation, PageSink};
pub use render::{empty_message, DigestRenderer, RenderedDigest};
pub use snippet::{trim_words, Snippet, SnippetExtractor, SnippetSource, ELLIPSIS};
pub use summarizer::{
    summarize_or_fallback, AnthropicSummarizer, SummarizeError, Summarizer, Summary,
    DEFAULT_MODEL, FALLBACK_SUMMARY,
};
