//! Search and summary phases against the index.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::EutilsClient;
use super::http::HttpError;
use super::types::{ArticleRecord, CandidateId};
use crate::query::SearchWindow;

/// Identifiers matched by one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHits {
    /// Identifiers in the order the index returned them.
    pub ids: Vec<CandidateId>,
    /// Total matches reported by the index, which may exceed `ids`.
    pub total: usize,
}

impl SearchHits {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// True when the index matched more than it returned.
    pub fn truncated(&self) -> bool {
        self.total > self.ids.len()
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    fulljournalname: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    sortpubdate: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    elocationid: String,
    #[serde(default)]
    articleids: Vec<ArticleIdEntry>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdEntry {
    #[serde(default)]
    idtype: String,
    #[serde(default)]
    value: String,
}

/// Runs the date-bounded search and resolves identifiers to records.
pub struct SearchGateway {
    client: Arc<EutilsClient>,
}

impl SearchGateway {
    pub fn new(client: Arc<EutilsClient>) -> Self {
        Self { client }
    }

    /// Identifiers entered into the index within the window, capped at
    /// the configured maximum.
    pub async fn search_ids(
        &self,
        query: &str,
        window: &SearchWindow,
    ) -> Result<SearchHits, HttpError> {
        let settings = self.client.settings();
        let params = vec![
            ("term".to_string(), query.to_string()),
            ("retmode".to_string(), "json".to_string()),
            ("retmax".to_string(), settings.max_results.to_string()),
            ("datetype".to_string(), "edat".to_string()),
            ("mindate".to_string(), window.index_start()),
            ("maxdate".to_string(), window.index_end()),
        ];

        debug!(query = %query, window = %window, "Searching index");
        let body = self.client.esearch(params).await?;
        let hits = parse_search(&body).map_err(|reason| HttpError::Decode {
            url: "esearch".to_string(),
            reason,
        })?;

        if hits.truncated() {
            warn!(
                returned = hits.ids.len(),
                total = hits.total,
                "Search matched more items than the result cap; digest is truncated"
            );
        }
        info!(ids = hits.ids.len(), total = hits.total, "Search complete");
        Ok(hits)
    }

    /// Records for the given identifiers, in the order the index returns them.
    ///
    /// Identifiers the index cannot resolve yet are skipped with a warning.
    pub async fn fetch_summaries(
        &self,
        ids: &[CandidateId],
    ) -> Result<Vec<ArticleRecord>, HttpError> {
        let chunk_size = self.client.settings().summary_chunk.max(1);
        let mut records = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(chunk_size) {
            let joined = chunk
                .iter()
                .map(CandidateId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let params = vec![
                ("id".to_string(), joined),
                ("retmode".to_string(), "json".to_string()),
            ];

            let body = self.client.esummary(params).await?;
            let parsed = parse_summaries(&body).map_err(|reason| HttpError::Decode {
                url: "esummary".to_string(),
                reason,
            })?;
            debug!(requested = chunk.len(), resolved = parsed.len(), "Summary chunk");
            records.extend(parsed);
        }

        Ok(records)
    }
}

fn parse_search(body: &str) -> Result<SearchHits, String> {
    let envelope: SearchEnvelope = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let result = envelope.esearchresult;
    if let Some(error) = result.error {
        return Err(format!("index rejected query: {error}"));
    }

    let ids: Vec<CandidateId> = result
        .idlist
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(CandidateId::new)
        .collect();
    let total = result
        .count
        .and_then(|c| c.trim().parse::<usize>().ok())
        .unwrap_or(ids.len())
        .max(ids.len());

    Ok(SearchHits { ids, total })
}

fn parse_summaries(body: &str) -> Result<Vec<ArticleRecord>, String> {
    let root: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let Some(result) = root.get("result").and_then(Value::as_object) else {
        if let Some(error) = root.get("error").and_then(Value::as_str) {
            return Err(format!("index reported: {error}"));
        }
        return Err("response has no result object".to_string());
    };

    // Object keys come back sorted; `uids` carries the index's order.
    let uids: Vec<String> = result
        .get("uids")
        .and_then(Value::as_array)
        .map(|uids| {
            uids.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_else(|| result.keys().filter(|k| *k != "uids").cloned().collect());

    let mut records = Vec::with_capacity(uids.len());
    for uid in uids {
        let Some(raw) = result.get(&uid) else {
            warn!(id = %uid, "Summary missing for identifier, skipping");
            continue;
        };
        let entry: SummaryEntry = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(id = %uid, error = %e, "Malformed summary entry, skipping");
                continue;
            }
        };
        if let Some(error) = &entry.error {
            warn!(id = %uid, error = %error, "Index could not summarize identifier, skipping");
            continue;
        }
        match into_record(CandidateId::new(uid.clone()), entry) {
            Some(record) => records.push(record),
            None => warn!(id = %uid, "Summary entry has no title, skipping"),
        }
    }
    Ok(records)
}

fn into_record(id: CandidateId, entry: SummaryEntry) -> Option<ArticleRecord> {
    let title = entry.title.trim().to_string();
    if title.is_empty() {
        return None;
    }

    let journal = if entry.fulljournalname.trim().is_empty() {
        entry.source.trim().to_string()
    } else {
        entry.fulljournalname.trim().to_string()
    };

    let doi = entry
        .articleids
        .iter()
        .find(|a| a.idtype.eq_ignore_ascii_case("doi"))
        .map(|a| a.value.trim().to_string())
        .filter(|d| !d.is_empty())
        .or_else(|| doi_from_elocation(&entry.elocationid));

    Some(ArticleRecord {
        url: id.article_url(),
        id,
        title,
        journal,
        sort_date: entry.sortpubdate.trim().to_string(),
        pub_date: entry.pubdate.trim().to_string(),
        doi,
    })
}

/// `elocationid` looks like `doi: 10.1000/xyz. pii: S123`.
fn doi_from_elocation(raw: &str) -> Option<String> {
    let start = raw.find("doi:")? + "doi:".len();
    let doi = raw[start..]
        .split_whitespace()
        .next()?
        .trim_end_matches(['.', ';', ',']);
    if doi.is_empty() {
        None
    } else {
        Some(doi.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexSettings;
    use crate::index::http::tests::RecordingSleeper;
    use crate::index::http::{RetryPolicy, RetryingHttpClient};
    use chrono::NaiveDate;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer, tweak: impl FnOnce(&mut IndexSettings)) -> SearchGateway {
        let mut settings = IndexSettings::with_base_url(&server.uri()).unwrap();
        settings.email = Some("ops@example.com".to_string());
        tweak(&mut settings);
        let http =
            RetryingHttpClient::with_policy(RetryPolicy::default(), Arc::new(RecordingSleeper::default()))
                .unwrap();
        SearchGateway::new(Arc::new(EutilsClient::new(http, settings).unwrap()))
    }

    fn window() -> SearchWindow {
        SearchWindow::between(
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        )
    }

    fn summary_body() -> serde_json::Value {
        serde_json::json!({
            "header": {"type": "esummary"},
            "result": {
                "uids": ["300", "100", "200"],
                "100": {
                    "uid": "100",
                    "title": "Spinal cord stimulation for low back pain.",
                    "fulljournalname": "Pain medicine (Malden, Mass.)",
                    "source": "Pain Med",
                    "sortpubdate": "2024/03/10 00:00",
                    "pubdate": "2024 Mar 10",
                    "articleids": [
                        {"idtype": "pubmed", "value": "100"},
                        {"idtype": "doi", "value": "10.1000/abc"}
                    ]
                },
                "200": {"uid": "200", "error": "cannot get document summary"},
                "300": {
                    "uid": "300",
                    "title": "Neuropathic pain in adults.",
                    "fulljournalname": "",
                    "source": "Pain",
                    "sortpubdate": "2024/03/12 00:00",
                    "pubdate": "2024 Mar",
                    "elocationid": "doi: 10.1097/j.pain.0001. pii: 0001",
                    "articleids": []
                }
            }
        })
    }

    #[tokio::test]
    async fn test_search_sends_window_and_identification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("db", "pubmed"))
            .and(query_param("datetype", "edat"))
            .and(query_param("mindate", "2024/03/08"))
            .and(query_param("maxdate", "2024/03/15"))
            .and(query_param("retmax", "300"))
            .and(query_param("tool", "litdigest"))
            .and(query_param("email", "ops@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "2", "retmax": "2", "idlist": ["100", "200"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = gateway(&server, |_| {})
            .search_ids("(\"Pain\"[ta])", &window())
            .await
            .unwrap();
        assert_eq!(hits.ids, vec![CandidateId::new("100"), CandidateId::new("200")]);
        assert!(!hits.truncated());
    }

    #[tokio::test]
    async fn test_search_reports_truncation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "350", "idlist": ["1", "2"]}
            })))
            .mount(&server)
            .await;

        let hits = gateway(&server, |s| s.max_results = 2)
            .search_ids("x", &window())
            .await
            .unwrap();
        assert_eq!(hits.total, 350);
        assert!(hits.truncated());
    }

    #[tokio::test]
    async fn test_search_error_field_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"ERROR": "Invalid query"}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server, |_| {})
            .search_ids("x", &window())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_summaries_follow_index_order_and_skip_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/esummary.fcgi"))
            .and(body_string_contains("retmode=json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .expect(1)
            .mount(&server)
            .await;

        let ids: Vec<CandidateId> = ["300", "100", "200"].into_iter().map(CandidateId::new).collect();
        let records = gateway(&server, |_| {}).fetch_summaries(&ids).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "300");
        assert_eq!(records[0].journal, "Pain");
        assert_eq!(records[0].doi.as_deref(), Some("10.1097/j.pain.0001"));
        assert_eq!(records[1].id.as_str(), "100");
        assert_eq!(records[1].journal, "Pain medicine (Malden, Mass.)");
        assert_eq!(records[1].doi.as_deref(), Some("10.1000/abc"));
        assert_eq!(records[1].url, "https://pubmed.ncbi.nlm.nih.gov/100/");
    }

    #[tokio::test]
    async fn test_summaries_chunked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/esummary.fcgi"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"result": {"uids": []}})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let ids: Vec<CandidateId> = (0..5).map(|i| CandidateId::new(i.to_string())).collect();
        let records = gateway(&server, |s| s.summary_chunk = 2)
            .fetch_summaries(&ids)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_doi_from_elocation() {
        assert_eq!(
            doi_from_elocation("doi: 10.1000/xyz. pii: S1"),
            Some("10.1000/xyz".to_string())
        );
        assert_eq!(doi_from_elocation("pii: S1"), None);
    }
}
