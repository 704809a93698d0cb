//! Static abstracts page publishing.

use chrono::NaiveDate;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::index::CandidateId;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Refusing to write outside the page directory: {0}")]
    InvalidPath(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for the rendered abstracts page.
pub trait PageSink: Send + Sync {
    /// Write `content` at `path`, relative to the sink's root.
    fn write(&self, content: &str, path: &str) -> Result<(), PageError>;
}

/// Writes pages under a local directory, creating it as needed.
#[derive(Debug, Clone)]
pub struct FilePageSink {
    root: PathBuf,
}

impl FilePageSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PageSink for FilePageSink {
    fn write(&self, content: &str, path: &str) -> Result<(), PageError> {
        let relative = Path::new(path);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || !confined {
            return Err(PageError::InvalidPath(path.to_string()));
        }

        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&target, content).map_err(|source| PageError::Io {
            path: target.clone(),
            source,
        })?;
        tracing::info!(path = %target.display(), bytes = content.len(), "Wrote abstracts page");
        Ok(())
    }
}

/// File name and public URL of one run's abstracts page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub file_name: String,
    pub url: Url,
}

impl PageLocation {
    /// `abstracts-<end date>.html` under the public base URL.
    pub fn for_window_end(base_url: &Url, end: NaiveDate) -> Result<Self, url::ParseError> {
        let file_name = format!("abstracts-{end}.html");
        let url = base_url.join(&file_name)?;
        Ok(Self { file_name, url })
    }

    /// Deep link to one item's section.
    pub fn link_for(&self, id: &CandidateId) -> String {
        let mut url = self.url.clone();
        url.set_fragment(Some(&id.anchor()));
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilePageSink::new(dir.path().join("public"));

        sink.write("<html></html>", "2024/abstracts-2024-03-15.html").unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("public/2024/abstracts-2024-03-15.html")).unwrap();
        assert_eq!(written, "<html></html>");
    }

    #[test]
    fn test_file_sink_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilePageSink::new(dir.path());
        assert!(matches!(sink.write("x", "../evil.html"), Err(PageError::InvalidPath(_))));
        assert!(matches!(sink.write("x", "/etc/evil.html"), Err(PageError::InvalidPath(_))));
    }

    #[test]
    fn test_deep_links() {
        let base = Url::parse("https://example.org/digest/").unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let page = PageLocation::for_window_end(&base, end).unwrap();

        assert_eq!(page.file_name, "abstracts-2024-03-15.html");
        assert_eq!(
            page.link_for(&CandidateId::new("38000001")),
            "https://example.org/digest/abstracts-2024-03-15.html#pmid-38000001"
        );
    }
}
