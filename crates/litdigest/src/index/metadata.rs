//! Abstract retrieval from the index's bulk XML endpoint.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::EutilsClient;
use super::types::{collapse_whitespace, AbstractSection, ArticleMetadata, CandidateId};

/// Fetches abstracts and conclusions for ranked items.
pub struct MetadataEnricher {
    client: Arc<EutilsClient>,
}

impl MetadataEnricher {
    pub fn new(client: Arc<EutilsClient>) -> Self {
        Self { client }
    }

    /// Metadata for as many identifiers as the index returns.
    ///
    /// A failed chunk is logged and skipped; its items render without
    /// abstract content.
    pub async fn fetch(&self, ids: &[CandidateId]) -> HashMap<CandidateId, ArticleMetadata> {
        let chunk_size = self.client.settings().metadata_chunk.max(1);
        let mut metadata = HashMap::with_capacity(ids.len());

        for (index, chunk) in ids.chunks(chunk_size).enumerate() {
            let joined = chunk
                .iter()
                .map(CandidateId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let params = vec![
                ("id".to_string(), joined),
                ("retmode".to_string(), "xml".to_string()),
                ("rettype".to_string(), "abstract".to_string()),
            ];

            let body = match self.client.efetch(params).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(chunk = index, ids = chunk.len(), error = %e, "Metadata chunk failed, continuing without it");
                    continue;
                }
            };

            let parsed = parse_articles(&body);
            debug!(chunk = index, requested = chunk.len(), parsed = parsed.len(), "Metadata chunk");
            if parsed.len() < chunk.len() {
                warn!(
                    chunk = index,
                    missing = chunk.len() - parsed.len(),
                    "Metadata chunk returned fewer records than requested"
                );
            }
            for (id, meta) in parsed {
                metadata.entry(id).or_insert(meta);
            }
        }

        metadata
    }
}

#[derive(Default)]
struct ArticleState {
    pmid: Option<String>,
    sections: Vec<AbstractSection>,
    open_section: Option<AbstractSection>,
    malformed: bool,
}

/// Parse a `PubmedArticleSet` document.
///
/// Each `PubmedArticle` is read on its own, so a syntax error only costs the
/// article it occurs in. Articles without an identifier, or with undecodable
/// text, are skipped.
pub(crate) fn parse_articles(xml: &str) -> Vec<(CandidateId, ArticleMetadata)> {
    let starts = article_offsets(xml);
    let mut articles = Vec::with_capacity(starts.len());

    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(xml.len());
        if let Some(article) = parse_article(&xml[start..end]) {
            articles.push(article);
        }
    }

    articles
}

/// Byte offsets of every `<PubmedArticle>` start tag.
fn article_offsets(xml: &str) -> Vec<usize> {
    const TAG: &str = "<PubmedArticle";
    xml.match_indices(TAG)
        .map(|(offset, _)| offset)
        .filter(|&offset| {
            matches!(
                xml.as_bytes().get(offset + TAG.len()).copied(),
                Some(b'>' | b' ' | b'\t' | b'\r' | b'\n')
            )
        })
        .collect()
}

/// Read one article from a fragment that starts at its opening tag.
fn parse_article(fragment: &str) -> Option<(CandidateId, ArticleMetadata)> {
    let mut reader = Reader::from_str(fragment);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut article = ArticleState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                if name == b"AbstractText" && path.last().map(Vec::as_slice) == Some(&b"Abstract"[..]) {
                    article.open_section = Some(section_from_attributes(&e));
                }
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Undecodable text in article record");
                        article.malformed = true;
                        continue;
                    }
                };
                if let Some(section) = article.open_section.as_mut() {
                    section.text.push_str(&text);
                } else if article.pmid.is_none() && ends_with(&path, &[b"MedlineCitation".as_slice(), b"PMID".as_slice()]) {
                    let pmid = text.trim();
                    if !pmid.is_empty() {
                        article.pmid = Some(pmid.to_string());
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(section) = article.open_section.as_mut() {
                    section.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(e)) => {
                path.pop();
                match e.name().as_ref() {
                    b"AbstractText" => {
                        if let Some(mut section) = article.open_section.take() {
                            section.text = collapse_whitespace(&section.text);
                            article.sections.push(section);
                        }
                    }
                    b"PubmedArticle" if path.is_empty() => return finish_article(article),
                    _ => {}
                }
            }
            Ok(Event::Eof) => {
                warn!(id = ?article.pmid, "Article record ends early, skipping");
                return None;
            }
            Err(e) => {
                warn!(
                    id = ?article.pmid,
                    position = reader.buffer_position(),
                    error = %e,
                    "Malformed article XML, skipping to the next record"
                );
                return None;
            }
            _ => {}
        }
    }
}

fn finish_article(article: ArticleState) -> Option<(CandidateId, ArticleMetadata)> {
    let Some(pmid) = article.pmid else {
        warn!("Article record without identifier, skipping");
        return None;
    };
    if article.malformed {
        warn!(id = %pmid, "Article record has undecodable text, skipping");
        return None;
    }
    Some((CandidateId::new(pmid), ArticleMetadata::from_sections(article.sections)))
}

fn section_from_attributes(e: &BytesStart<'_>) -> AbstractSection {
    let mut label = None;
    let mut category = None;
    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v.trim().to_string(),
            Err(_) => continue,
        };
        if value.is_empty() {
            continue;
        }
        match attr.key.as_ref() {
            b"Label" => label = Some(value),
            b"NlmCategory" => category = Some(value),
            _ => {}
        }
    }
    AbstractSection {
        label,
        category,
        text: String::new(),
    }
}

fn ends_with(path: &[Vec<u8>], suffix: &[&[u8]]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a.as_slice() == *b)
}
