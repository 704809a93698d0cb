//! Short excerpts derived from abstract text.

use std::fmt;

use crate::index::ArticleMetadata;

/// Marker appended when a snippet is cut short.
pub const ELLIPSIS: char = '…';

/// Number of closing sentences used when no conclusion is labeled.
const TAIL_SENTENCES: usize = 2;

/// Where a snippet came from. Always shown next to the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetSource {
    Conclusion,
    Abstract,
}

impl SnippetSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Conclusion => "Conclusion",
            Self::Abstract => "From abstract",
        }
    }
}

impl fmt::Display for SnippetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub source: SnippetSource,
    pub text: String,
}

impl Snippet {
    pub fn label(&self) -> &'static str {
        self.source.label()
    }
}

/// Picks a snippet per article: the labeled conclusion, else the closing
/// sentences of the abstract. Only ever returns text present in the input.
#[derive(Debug, Clone, Copy)]
pub struct SnippetExtractor {
    max_words: usize,
}

impl SnippetExtractor {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
        }
    }

    pub fn extract(&self, metadata: &ArticleMetadata) -> Option<Snippet> {
        let (source, text) = if let Some(conclusion) = non_blank(metadata.conclusion.as_deref()) {
            (SnippetSource::Conclusion, conclusion.to_string())
        } else {
            let abstract_text = non_blank(metadata.abstract_text.as_deref())?;
            let tail = last_sentences(abstract_text, TAIL_SENTENCES)
                .unwrap_or_else(|| abstract_text.to_string());
            (SnippetSource::Abstract, tail)
        };

        Some(Snippet {
            source,
            text: trim_words(&text, self.max_words),
        })
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Split after `.`, `!` or `?` when followed by whitespace or the end.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn last_sentences(text: &str, count: usize) -> Option<String> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return None;
    }
    let from = sentences.len().saturating_sub(count);
    Some(sentences[from..].join(" "))
}

/// Keep at most `max_words` words, marking a cut with a trailing ellipsis.
pub fn trim_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let mut trimmed = words[..max_words].join(" ");
    trimmed.push(ELLIPSIS);
    trimmed
}
