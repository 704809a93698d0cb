//! Literature index access (NCBI E-utilities).

mod client;
pub mod http;
mod metadata;
mod search;
mod types;

pub use client::EutilsClient;
pub use http::{HttpError, HttpRequest, RetryPolicy, RetryingHttpClient, Sleeper, TokioSleeper};
pub use metadata::MetadataEnricher;
pub use search::{SearchGateway, SearchHits};
pub(crate) use types::collapse_whitespace;
pub use types::{parse_index_date, AbstractSection, ArticleMetadata, ArticleRecord, CandidateId};
