//! Duplicate collapsing and recency ordering for article records.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::index::{ArticleRecord, CandidateId};

/// Identity used to collapse records that describe the same article.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Case-insensitive DOI.
    Doi(String),
    /// Index identifier, used when no DOI is known.
    Id(CandidateId),
}

impl DedupKey {
    pub fn for_record(record: &ArticleRecord) -> Self {
        match record.doi.as_deref().map(str::trim) {
            Some(doi) if !doi.is_empty() => Self::Doi(doi.to_lowercase()),
            _ => Self::Id(record.id.clone()),
        }
    }
}

/// Drop later duplicates, then order newest first.
///
/// The sort is stable, so records with equal dates keep their index order.
/// Records whose date cannot be parsed go last.
pub fn dedup_and_rank(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let before = records.len();
    let mut seen = HashSet::with_capacity(records.len());
    let mut unique: Vec<ArticleRecord> = records
        .into_iter()
        .filter(|record| seen.insert(DedupKey::for_record(record)))
        .collect();

    if unique.len() < before {
        tracing::debug!(removed = before - unique.len(), "Collapsed duplicate records");
    }

    unique.sort_by(|a, b| match (a.parsed_sort_date(), b.parsed_sort_date()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    unique
}
