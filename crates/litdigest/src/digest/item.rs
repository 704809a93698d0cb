//! The unit handed to rendering.

use crate::index::{AbstractSection, ArticleRecord};

use super::snippet::Snippet;
use super::summarizer::Summary;

/// One ranked article with whatever enrichment succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestItem {
    pub record: ArticleRecord,
    pub snippet: Option<Snippet>,
    pub summary: Option<Summary>,
    /// Full abstract for the abstracts page, in document order.
    pub sections: Vec<AbstractSection>,
    /// Deep link into the published abstracts page.
    pub page_link: Option<String>,
}

impl DigestItem {
    pub fn new(record: ArticleRecord) -> Self {
        Self {
            record,
            snippet: None,
            summary: None,
            sections: Vec::new(),
            page_link: None,
        }
    }
}
