//! Records returned by the literature index.

use chrono::NaiveDate;
use std::fmt;

/// Base URL for article landing pages.
const ARTICLE_URL_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// Opaque identifier returned by the search phase (a PMID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public landing page for this identifier.
    pub fn article_url(&self) -> String {
        format!("{ARTICLE_URL_BASE}/{}/", self.0)
    }

    /// Anchor used on the abstracts page.
    pub fn anchor(&self) -> String {
        format!("pmid-{}", self.0)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One article as reported by the summary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub id: CandidateId,
    pub title: String,
    pub journal: String,
    /// Date used for ordering, as reported by the index (`2024/03/10 00:00`).
    pub sort_date: String,
    /// Human-readable publication date (`2024 Mar 10`).
    pub pub_date: String,
    pub url: String,
    pub doi: Option<String>,
}

impl ArticleRecord {
    /// Sort date as a calendar date, if any known shape matches.
    pub fn parsed_sort_date(&self) -> Option<NaiveDate> {
        parse_index_date(&self.sort_date).or_else(|| parse_index_date(&self.pub_date))
    }

    /// Date shown to readers: the publication date, else the sort date.
    pub fn display_date(&self) -> String {
        if !self.pub_date.trim().is_empty() {
            self.pub_date.trim().to_string()
        } else if let Some(date) = parse_index_date(&self.sort_date) {
            date.to_string()
        } else {
            self.sort_date.trim().to_string()
        }
    }

    pub fn doi_url(&self) -> Option<String> {
        self.doi.as_ref().map(|doi| format!("https://doi.org/{doi}"))
    }
}

/// Fold runs of whitespace into single spaces and drop control characters,
/// leaving text that fits on one line.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the date shapes the index emits.
///
/// Accepts `YYYY/MM/DD[ HH:MM]`, `YYYY-MM-DD`, `YYYY Mon DD`, `YYYY Mon` and
/// `YYYY`. Partial dates resolve to the first day of the period.
pub fn parse_index_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    for format in ["%Y/%m/%d", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }

    let parts: Vec<&str> = raw.split_whitespace().collect();
    match parts.as_slice() {
        [year, month, day, ..] => {
            // "2024 Mar 10" or a season/range like "2024 Mar-Apr" in the month slot.
            let month = month_number(month)?;
            let day: u32 = day
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(1);
            NaiveDate::from_ymd_opt(year.parse().ok()?, month, day)
                .or_else(|| NaiveDate::from_ymd_opt(year.parse().ok()?, month, 1))
        }
        [year, month] => NaiveDate::from_ymd_opt(year.parse().ok()?, month_number(month)?, 1),
        [year] if year.len() == 4 => NaiveDate::from_ymd_opt(year.parse().ok()?, 1, 1),
        _ => None,
    }
}

fn month_number(token: &str) -> Option<u32> {
    let token = token.split('-').next()?.to_ascii_lowercase();
    let month = match token.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// One labeled part of a structured abstract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractSection {
    /// Label as printed (`CONCLUSIONS`), if the abstract is structured.
    pub label: Option<String>,
    /// Normalized category (`CONCLUSIONS`, `RESULTS`, ...), if provided.
    pub category: Option<String>,
    pub text: String,
}

impl AbstractSection {
    /// True when the label or category names a conclusion section.
    pub fn is_conclusion(&self) -> bool {
        [&self.label, &self.category]
            .into_iter()
            .flatten()
            .any(|s| s.to_lowercase().contains("conclusion"))
    }
}

/// Abstract text fetched for one identifier. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleMetadata {
    /// All abstract sections joined in document order, conclusions included.
    pub abstract_text: Option<String>,
    /// Conclusion-labeled sections joined in document order.
    pub conclusion: Option<String>,
    /// Sections as they appear, for the abstracts page.
    pub sections: Vec<AbstractSection>,
}

impl ArticleMetadata {
    /// Build metadata from parsed sections, dropping empty ones.
    pub fn from_sections(sections: Vec<AbstractSection>) -> Self {
        let sections: Vec<AbstractSection> = sections
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();

        let abstract_text = join_non_empty(sections.iter().map(|s| s.text.as_str()));
        let conclusion = join_non_empty(
            sections
                .iter()
                .filter(|s| s.is_conclusion())
                .map(|s| s.text.as_str()),
        );

        Self {
            abstract_text,
            conclusion,
            sections,
        }
    }
}

fn join_non_empty<'a>(parts: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined = parts
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_index_date_shapes() {
        assert_eq!(parse_index_date("2024/03/10 00:00"), Some(ymd(2024, 3, 10)));
        assert_eq!(parse_index_date("2024-03-10"), Some(ymd(2024, 3, 10)));
        assert_eq!(parse_index_date("2024 Mar 10"), Some(ymd(2024, 3, 10)));
        assert_eq!(parse_index_date("2024 Mar"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_index_date("2024 Mar-Apr"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_index_date("2024"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_index_date("Spring"), None);
        assert_eq!(parse_index_date(""), None);
        assert_eq!(parse_index_date("not a date at all"), None);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Pain\n\n fell.\tAgain\r\n"), "Pain fell. Again");
        assert_eq!(collapse_whitespace("bell\u{7}ringing \u{0}"), "bellringing");
        assert_eq!(collapse_whitespace("\n\n"), "");
    }

    #[test]
    fn test_metadata_keeps_conclusion_in_abstract() {
        let meta = ArticleMetadata::from_sections(vec![
            AbstractSection {
                label: Some("BACKGROUND".to_string()),
                category: Some("BACKGROUND".to_string()),
                text: "Pain is common.".to_string(),
            },
            AbstractSection {
                label: Some("Conclusions and Relevance".to_string()),
                category: Some("CONCLUSIONS".to_string()),
                text: "It helps.".to_string(),
            },
        ]);

        assert_eq!(meta.abstract_text.as_deref(), Some("Pain is common. It helps."));
        assert_eq!(meta.conclusion.as_deref(), Some("It helps."));
    }

    #[test]
    fn test_metadata_without_sections() {
        let meta = ArticleMetadata::from_sections(vec![AbstractSection {
            label: None,
            category: None,
            text: "   ".to_string(),
        }]);
        assert_eq!(meta, ArticleMetadata::default());
    }

    #[test]
    fn test_candidate_links() {
        let id = CandidateId::new("38000001");
        assert_eq!(id.article_url(), "https://pubmed.ncbi.nlm.nih.gov/38000001/");
        assert_eq!(id.anchor(), "pmid-38000001");
    }
}
