//! Digest pipeline - sequences search, enrichment, rendering and delivery.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DigestConfig;
use crate::digest::{
    dedup_and_rank, summarize_or_fallback, DigestItem, DigestRenderer, FilePageSink, Mailer,
    PageLocation, PageSink, RenderedDigest, SnippetExtractor, Summarizer, Summary,
};
use crate::error::{DigestError, Result};
use crate::index::{
    ArticleMetadata, ArticleRecord, CandidateId, EutilsClient, MetadataEnricher, RetryingHttpClient,
    SearchGateway,
};
use crate::query::{QueryBuilder, SearchWindow};

/// Counts gathered while assembling one digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Matches reported by the index, before the result cap.
    pub total_matches: usize,
    /// Identifiers returned by the search phase.
    pub found: usize,
    /// Records the summary phase resolved.
    pub summarized: usize,
    /// Items left after duplicate collapsing.
    pub ranked: usize,
    /// Items with abstract metadata.
    pub with_metadata: usize,
    /// Items with a snippet.
    pub snippets: usize,
    /// Summaries that fell back to the fixed text.
    pub summary_fallbacks: usize,
    /// Published abstracts page, if written.
    pub page_url: Option<String>,
}

/// A digest ready to deliver.
#[derive(Debug, Clone)]
pub struct AssembledDigest {
    pub window: SearchWindow,
    pub query: String,
    pub items: Vec<DigestItem>,
    pub digest: RenderedDigest,
    pub report: RunReport,
}

impl AssembledDigest {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Top-level outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Nothing matched in the window.
    NoNewItems { delivered: bool },
    /// A digest with items was delivered.
    Delivered { items: usize },
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub assembled: AssembledDigest,
}

/// Digest pipeline orchestrator.
pub struct Pipeline {
    config: DigestConfig,
    search: SearchGateway,
    metadata: MetadataEnricher,
    renderer: DigestRenderer,
    summarizer: Option<Arc<dyn Summarizer>>,
    page_sink: Option<Arc<dyn PageSink>>,
}

impl Pipeline {
    /// Create a pipeline, rejecting unusable configuration before any call.
    pub fn new(config: DigestConfig, http: RetryingHttpClient) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(EutilsClient::new(http, config.index.clone())?);
        let page_sink = config.page.as_ref().map(|page| {
            Arc::new(FilePageSink::new(page.output_dir.clone())) as Arc<dyn PageSink>
        });

        Ok(Self {
            search: SearchGateway::new(client.clone()),
            metadata: MetadataEnricher::new(client),
            renderer: DigestRenderer::new(config.title.clone(), config.profile.journals.clone()),
            summarizer: None,
            page_sink,
            config,
        })
    }

    /// Attach the summarizer used when AI summaries are enabled.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Replace the sink the abstracts page is written to.
    #[must_use]
    pub fn with_page_sink(mut self, sink: Arc<dyn PageSink>) -> Self {
        self.page_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Window and search expression a run at `reference` would use.
    pub fn plan(&self, reference: DateTime<Utc>) -> (SearchWindow, String) {
        (
            SearchWindow::ending_at(reference, &self.config.window),
            QueryBuilder::build(&self.config.profile),
        )
    }

    /// Assemble and deliver the digest for the window ending at `reference`.
    pub async fn run_at(&self, reference: DateTime<Utc>, mailer: &dyn Mailer) -> Result<RunOutcome> {
        let assembled = self.assemble(reference).await?;

        if assembled.is_empty() && !self.config.send_when_empty {
            tracing::info!(window = %assembled.window, "No new items, nothing sent");
            return Ok(RunOutcome {
                status: RunStatus::NoNewItems { delivered: false },
                assembled,
            });
        }

        let digest = &assembled.digest;
        mailer
            .deliver(&digest.subject, &digest.text, &digest.html)
            .await
            .map_err(DigestError::Dispatch)?;

        let status = if assembled.is_empty() {
            RunStatus::NoNewItems { delivered: true }
        } else {
            RunStatus::Delivered {
                items: assembled.items.len(),
            }
        };
        tracing::info!(status = ?status, subject = %digest.subject, "Digest dispatched");
        Ok(RunOutcome { status, assembled })
    }

    /// Run every stage up to rendering without sending anything.
    pub async fn assemble(&self, reference: DateTime<Utc>) -> Result<AssembledDigest> {
        let (window, query) = self.plan(reference);
        let mut report = RunReport::default();
        tracing::info!(window = %window, "Starting digest run");

        let hits = self
            .search
            .search_ids(&query, &window)
            .await
            .map_err(|e| DigestError::fetch("search", e))?;
        report.total_matches = hits.total;
        report.found = hits.ids.len();

        let mut items = Vec::new();
        if hits.is_empty() {
            tracing::info!(window = %window, "No new items in window");
        } else {
            let records = self
                .search
                .fetch_summaries(&hits.ids)
                .await
                .map_err(|e| DigestError::fetch("summary", e))?;
            report.summarized = records.len();

            let ranked = dedup_and_rank(records);
            report.ranked = ranked.len();

            let metadata = self.fetch_metadata(&ranked).await;
            report.with_metadata = metadata.len();

            items = self.build_items(ranked, metadata, &mut report).await;
        }

        if !items.is_empty() {
            report.page_url = self.publish_page(&window, &mut items);
        }

        let digest = self.renderer.render(&window, &items);
        tracing::info!(
            found = report.found,
            summarized = report.summarized,
            items = report.ranked,
            with_metadata = report.with_metadata,
            snippets = report.snippets,
            summary_fallbacks = report.summary_fallbacks,
            "Digest assembled"
        );

        Ok(AssembledDigest {
            window,
            query,
            items,
            digest,
            report,
        })
    }

    async fn fetch_metadata(
        &self,
        records: &[ArticleRecord],
    ) -> HashMap<CandidateId, ArticleMetadata> {
        if !self.config.needs_metadata() || records.is_empty() {
            return HashMap::new();
        }
        let ids: Vec<CandidateId> = records.iter().map(|r| r.id.clone()).collect();
        self.metadata.fetch(&ids).await
    }

    async fn build_items(
        &self,
        records: Vec<ArticleRecord>,
        mut metadata: HashMap<CandidateId, ArticleMetadata>,
        report: &mut RunReport,
    ) -> Vec<DigestItem> {
        let extractor = SnippetExtractor::new(self.config.snippets.max_words);
        if self.config.ai_summaries && self.summarizer.is_none() {
            tracing::warn!("AI summaries enabled but no summarizer configured");
        }

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let meta = metadata.remove(&record.id).unwrap_or_default();
            let mut item = DigestItem::new(record);

            if self.config.snippets.enabled {
                item.snippet = extractor.extract(&meta);
            }
            if self.config.ai_summaries {
                if let Some(text) = meta.abstract_text.as_deref() {
                    let summary = match &self.summarizer {
                        Some(summarizer) => summarize_or_fallback(summarizer.as_ref(), text).await,
                        None => Summary::Fallback,
                    };
                    if summary.is_fallback() {
                        report.summary_fallbacks += 1;
                    }
                    item.summary = Some(summary);
                }
            }
            if self.config.page.is_some() {
                item.sections = meta.sections;
            }

            if item.snippet.is_some() {
                report.snippets += 1;
            }
            items.push(item);
        }
        items
    }

    /// Write the abstracts page and link items to it. Failures only cost the links.
    fn publish_page(&self, window: &SearchWindow, items: &mut [DigestItem]) -> Option<String> {
        let (page, sink) = (self.config.page.as_ref()?, self.page_sink.as_ref()?);

        let location = match PageLocation::for_window_end(&page.base_url, window.end()) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build abstracts page URL, skipping page");
                return None;
            }
        };

        let content = self.renderer.render_page(window, items);
        if let Err(e) = sink.write(&content, &location.file_name) {
            tracing::warn!(error = %e, "Failed to write abstracts page, sending digest without links");
            return None;
        }

        for item in items.iter_mut() {
            item.page_link = Some(location.link_for(&item.record.id));
        }
        Some(location.url.to_string())
    }
}
