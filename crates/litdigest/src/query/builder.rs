//! Boolean search expression builder.

use crate::config::TopicProfile;

/// Clause AND'd in when the profile is restricted to adults.
const ADULT_CLAUSE: &str = "\"adult\"[MeSH Terms]";

/// Builds the index search expression for a topic profile.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Render `(journals) AND (keywords) [AND demographic]`.
    ///
    /// Empty clauses are left out entirely. An empty profile yields an empty
    /// string; configuration validation rejects that case before we get here.
    #[must_use]
    pub fn build(profile: &TopicProfile) -> String {
        let mut clauses = Vec::with_capacity(3);

        if let Some(journals) = or_group(profile.journals.iter().map(|j| journal_token(j))) {
            clauses.push(journals);
        }
        if let Some(keywords) = or_group(profile.keywords.iter().map(|k| keyword_token(k))) {
            clauses.push(keywords);
        }
        if profile.adults_only {
            clauses.push(ADULT_CLAUSE.to_string());
        }

        clauses.join(" AND ")
    }
}

fn or_group(tokens: impl Iterator<Item = String>) -> Option<String> {
    let tokens: Vec<String> = tokens.collect();
    if tokens.is_empty() {
        None
    } else {
        Some(format!("({})", tokens.join(" OR ")))
    }
}

fn journal_token(journal: &str) -> String {
    format!("\"{}\"[ta]", strip_quotes(journal))
}

/// Keywords carrying their own field tag (`"pain"[MeSH Terms]`) pass through.
fn keyword_token(keyword: &str) -> String {
    if keyword.contains('[') && keyword.ends_with(']') {
        keyword.to_string()
    } else {
        format!("\"{}\"", strip_quotes(keyword))
    }
}

fn strip_quotes(term: &str) -> String {
    term.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(journals: &[&str], keywords: &[&str], adults_only: bool) -> TopicProfile {
        TopicProfile::new(
            journals.iter().copied(),
            keywords.iter().copied(),
            adults_only,
        )
    }

    #[test]
    fn test_single_top_level_and() {
        let query = QueryBuilder::build(&profile(
            &["Pain", "Neurology"],
            &["chronic pain", "low back pain"],
            false,
        ));

        assert_eq!(
            query,
            r#"("Pain"[ta] OR "Neurology"[ta]) AND ("chronic pain" OR "low back pain")"#
        );

        // Only one AND outside the parenthesized groups.
        let mut depth = 0i32;
        let mut top_level_ands = 0;
        let bytes = query.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            match b {
                b'(' => depth += 1,
                b')' => depth -= 1,
                b'A' if depth == 0 && query[i..].starts_with("AND") => top_level_ands += 1,
                _ => {}
            }
        }
        assert_eq!(top_level_ands, 1);
    }

    #[test]
    fn test_empty_clauses_omitted() {
        assert_eq!(
            QueryBuilder::build(&profile(&[], &["sciatica"], false)),
            r#"("sciatica")"#
        );
        assert_eq!(
            QueryBuilder::build(&profile(&["Pain"], &[], false)),
            r#"("Pain"[ta])"#
        );
        assert!(!QueryBuilder::build(&profile(&["Pain"], &[], true)).contains("()"));
        assert_eq!(QueryBuilder::build(&profile(&[], &[], false)), "");
    }

    #[test]
    fn test_demographic_clause() {
        let query = QueryBuilder::build(&profile(&["Pain"], &["migraine"], true));
        assert_eq!(
            query,
            r#"("Pain"[ta]) AND ("migraine") AND "adult"[MeSH Terms]"#
        );
    }

    #[test]
    fn test_tagged_keyword_passes_through() {
        let query = QueryBuilder::build(&profile(&[], &["\"Pain Management\"[MeSH Terms]"], false));
        assert_eq!(query, r#"("Pain Management"[MeSH Terms])"#);
    }

    #[test]
    fn test_embedded_quotes_stripped() {
        let query = QueryBuilder::build(&profile(&["\"Pain\""], &[], false));
        assert_eq!(query, r#"("Pain"[ta])"#);
    }
}
