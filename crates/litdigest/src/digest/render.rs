//! Digest content rendering.
//!
//! Builds the HTML body, the plain-text body and the abstracts page from the
//! same list of items. Every string that came from the index is escaped for
//! HTML before it is embedded.

use std::fmt::Write;

use super::item::DigestItem;
use crate::index::collapse_whitespace;
use crate::query::SearchWindow;

/// Rendered message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDigest {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Renders digests for one topic profile.
#[derive(Debug, Clone)]
pub struct DigestRenderer {
    title: String,
    journals: Vec<String>,
}

impl DigestRenderer {
    pub fn new(title: impl Into<String>, journals: Vec<String>) -> Self {
        Self {
            title: title.into(),
            journals,
        }
    }

    /// `<title> — <end date>`.
    pub fn subject(&self, window: &SearchWindow) -> String {
        format!("{} — {}", self.title, window.end())
    }

    /// Both message bodies plus the subject line.
    pub fn render(&self, window: &SearchWindow, items: &[DigestItem]) -> RenderedDigest {
        RenderedDigest {
            subject: self.subject(window),
            html: self.render_html(window, items),
            text: self.render_text(window, items),
        }
    }

    /// Generate the HTML email body.
    #[must_use]
    pub fn render_html(&self, window: &SearchWindow, items: &[DigestItem]) -> String {
        let mut body = String::new();
        if items.is_empty() {
            let _ = write!(
                body,
                r#"<p class="empty">{}</p>"#,
                html_escape(&empty_message(window))
            );
        } else {
            body.push_str("<ol class=\"items\">\n");
            for item in items {
                Self::write_html_item(&mut body, item);
            }
            body.push_str("</ol>\n");
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', sans-serif;
            line-height: 1.5;
            color: #1f2937;
            background-color: #f8fafc;
            margin: 0;
            padding: 20px;
        }}
        .container {{
            max-width: 720px;
            margin: 0 auto;
            background: #ffffff;
            border: 1px solid #e2e8f0;
            border-radius: 10px;
            overflow: hidden;
        }}
        .header {{
            background: #0e7490;
            color: white;
            padding: 24px;
        }}
        .header h1 {{ margin: 0 0 6px 0; font-size: 24px; }}
        .header .subtitle {{ opacity: 0.9; font-size: 14px; }}
        .content {{ padding: 20px 24px; }}
        .items li {{ margin-bottom: 18px; }}
        .items a.title {{ font-weight: 600; color: #0e7490; text-decoration: none; }}
        .meta {{ color: #64748b; font-size: 13px; }}
        .meta a {{ color: #64748b; }}
        .snippet, .summary {{ margin: 6px 0 0 0; font-size: 14px; }}
        .label {{ font-weight: 600; color: #334155; }}
        .empty {{ color: #64748b; font-style: italic; }}
        .footer {{ padding: 16px 24px; color: #94a3b8; font-size: 12px; border-top: 1px solid #e2e8f0; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{title}</h1>
            <div class="subtitle">New items from {start} to {end} &middot; {count} {noun}</div>
            <div class="subtitle">Journals: {journals}</div>
        </div>
        <div class="content">
{body}
        </div>
        <div class="footer">Source: PubMed (NCBI E-utilities). Dates follow PubMed entry dates.</div>
    </div>
</body>
</html>
"#,
            title = html_escape(&self.title),
            start = window.start(),
            end = window.end(),
            count = items.len(),
            noun = if items.len() == 1 { "item" } else { "items" },
            journals = html_escape(&self.journal_list()),
            body = body,
        )
    }

    fn write_html_item(out: &mut String, item: &DigestItem) {
        let record = &item.record;
        let mut meta = format!(
            "{} &middot; {}",
            html_escape(&record.journal),
            html_escape(&record.display_date())
        );
        if let Some(doi_url) = record.doi_url() {
            let _ = write!(meta, r#" &middot; <a href="{}">DOI</a>"#, html_escape(&doi_url));
        }
        if let Some(link) = &item.page_link {
            let _ = write!(meta, r#" &middot; <a href="{}">Abstract</a>"#, html_escape(link));
        }

        let _ = write!(
            out,
            r#"<li class="item">
    <a class="title" href="{url}">{title}</a>
    <div class="meta">{meta}</div>
"#,
            url = html_escape(&record.url),
            title = html_escape(&record.title),
            meta = meta,
        );
        if let Some(snippet) = &item.snippet {
            let _ = writeln!(
                out,
                r#"    <p class="snippet"><span class="label">{}:</span> {}</p>"#,
                snippet.label(),
                html_escape(&snippet.text)
            );
        }
        if let Some(summary) = &item.summary {
            let _ = writeln!(
                out,
                r#"    <p class="summary"><span class="label">AI summary:</span> {}</p>"#,
                html_escape(summary.text())
            );
        }
        out.push_str("</li>\n");
    }

    /// Generate the plain-text email body.
    ///
    /// Each field is folded onto one line so continuation lines keep their
    /// indent.
    #[must_use]
    pub fn render_text(&self, window: &SearchWindow, items: &[DigestItem]) -> String {
        let mut text = format!(
            "{title}\nNew items from {start} to {end}\nJournals: {journals}\n{rule}\n\n",
            title = collapse_whitespace(&self.title),
            start = window.start(),
            end = window.end(),
            journals = collapse_whitespace(&self.journal_list()),
            rule = "=".repeat(72),
        );

        if items.is_empty() {
            text.push_str(&empty_message(window));
            text.push('\n');
        }

        for (position, item) in items.iter().enumerate() {
            let record = &item.record;
            let _ = write!(
                text,
                "{n}. {title}\n   {journal} · {date}\n   {url}\n",
                n = position + 1,
                title = collapse_whitespace(&record.title),
                journal = collapse_whitespace(&record.journal),
                date = collapse_whitespace(&record.display_date()),
                url = collapse_whitespace(&record.url),
            );
            if let Some(doi_url) = record.doi_url() {
                let _ = writeln!(text, "   DOI: {}", collapse_whitespace(&doi_url));
            }
            if let Some(link) = &item.page_link {
                let _ = writeln!(text, "   Abstract: {}", collapse_whitespace(link));
            }
            if let Some(snippet) = &item.snippet {
                let _ = writeln!(text, "   {}: {}", snippet.label(), collapse_whitespace(&snippet.text));
            }
            if let Some(summary) = &item.summary {
                let _ = writeln!(text, "   AI summary: {}", collapse_whitespace(summary.text()));
            }
            text.push('\n');
        }

        text.push_str("---\nSource: PubMed (NCBI E-utilities)\n");
        text
    }

    /// Generate the browsable abstracts page, one anchored section per item.
    #[must_use]
    pub fn render_page(&self, window: &SearchWindow, items: &[DigestItem]) -> String {
        let mut sections = String::new();
        for item in items {
            let record = &item.record;
            let _ = write!(
                sections,
                r#"<section id="{anchor}">
    <h2><a href="{url}">{title}</a></h2>
    <p class="meta">{journal} &middot; {date}</p>
"#,
                anchor = html_escape(&record.id.anchor()),
                url = html_escape(&record.url),
                title = html_escape(&record.title),
                journal = html_escape(&record.journal),
                date = html_escape(&record.display_date()),
            );
            if item.sections.is_empty() {
                sections.push_str("    <p class=\"muted\">No abstract available.</p>\n");
            }
            for part in &item.sections {
                match &part.label {
                    Some(label) => {
                        let _ = writeln!(
                            sections,
                            "    <p><strong>{}</strong> {}</p>",
                            html_escape(label),
                            html_escape(&part.text)
                        );
                    }
                    None => {
                        let _ = writeln!(sections, "    <p>{}</p>", html_escape(&part.text));
                    }
                }
            }
            sections.push_str("</section>\n");
        }
        if items.is_empty() {
            let _ = writeln!(sections, "<p class=\"muted\">{}</p>", html_escape(&empty_message(window)));
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} abstracts, {end}</title>
    <style>
        body {{ font-family: Georgia, 'Times New Roman', serif; max-width: 760px; margin: 0 auto; padding: 24px; color: #1f2937; }}
        section {{ border-top: 1px solid #e2e8f0; padding-top: 12px; margin-top: 20px; }}
        h2 {{ font-size: 19px; margin: 0 0 4px 0; }}
        h2 a {{ color: #0e7490; text-decoration: none; }}
        .meta, .muted {{ color: #64748b; font-size: 14px; }}
    </style>
</head>
<body>
<h1>{title}</h1>
<p class="meta">Abstracts for items entered {start} to {end}</p>
{sections}</body>
</html>
"#,
            title = html_escape(&self.title),
            start = window.start(),
            end = window.end(),
            sections = sections,
        )
    }

    fn journal_list(&self) -> String {
        if self.journals.is_empty() {
            "any".to_string()
        } else {
            self.journals.join(", ")
        }
    }
}

/// Message shown in place of items when the window is empty.
pub fn empty_message(window: &SearchWindow) -> String {
    format!("No new items between {} and {}", window.start(), window.end())
}

/// Escape text for HTML element content and quoted attributes.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
