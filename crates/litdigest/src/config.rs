//! Configuration for the literature digest.
//!
//! Everything the pipeline needs is carried by [`DigestConfig`], built once at
//! startup and passed in by value. Nothing below this module reads the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use lettre::message::Mailbox;
use thiserror::Error;
use url::Url;

/// Default E-utilities endpoint.
pub const DEFAULT_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

/// Default client identification sent as `tool`.
pub const DEFAULT_TOOL: &str = "litdigest";

/// Default rolling window length in days.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Default timezone used to pin the window to calendar dates.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Maximum identifiers requested from the search phase.
pub const DEFAULT_MAX_RESULTS: usize = 300;

/// Identifiers per summary request.
pub const DEFAULT_SUMMARY_CHUNK: usize = 200;

/// Identifiers per metadata request.
pub const DEFAULT_METADATA_CHUNK: usize = 100;

/// Default snippet length in words.
pub const DEFAULT_SNIPPET_WORDS: usize = 70;

/// Default digest title, also used as the subject prefix.
pub const DEFAULT_TITLE: &str = "Pain Literature Weekly";

/// Default Gmail SMTP port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Journals searched when none are configured.
pub const DEFAULT_JOURNALS: &[&str] = &[
    "Pain",
    "Journal of Pain",
    "Neurology",
    "Pain Medicine",
    "PAIN Reports",
];

/// Keywords searched when none are configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "chronic pain",
    "neuropathic pain",
    "low back pain",
    "radiofrequency ablation",
];

/// Configuration problems detected before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting was provided but cannot be used.
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The topic profile has neither journals nor keywords.
    #[error("Topic profile has no journals and no keywords")]
    EmptyProfile,
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Journals and keywords that define what the digest covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicProfile {
    /// Journal title abbreviations, searched with the `[ta]` tag.
    pub journals: Vec<String>,
    /// Free-text or MeSH terms.
    pub keywords: Vec<String>,
    /// Restrict results to adult populations.
    pub adults_only: bool,
}

impl TopicProfile {
    /// Build a profile, dropping blank and repeated entries while keeping order.
    pub fn new(
        journals: impl IntoIterator<Item = impl Into<String>>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
        adults_only: bool,
    ) -> Self {
        Self {
            journals: clean_terms(journals),
            keywords: clean_terms(keywords),
            adults_only,
        }
    }

    /// True when the profile would produce an empty query.
    pub fn is_empty(&self) -> bool {
        self.journals.is_empty() && self.keywords.is_empty() && !self.adults_only
    }
}

impl Default for TopicProfile {
    fn default() -> Self {
        Self::new(
            DEFAULT_JOURNALS.iter().copied(),
            DEFAULT_KEYWORDS.iter().copied(),
            false,
        )
    }
}

fn clean_terms(terms: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for term in terms {
        let term: String = term.into();
        let term = term.trim();
        if !term.is_empty() && !out.iter().any(|t| t == term) {
            out.push(term.to_string());
        }
    }
    out
}

/// Rolling window settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    /// Number of days covered, counted back from the reference date.
    pub lookback_days: u32,
    /// Timezone that decides which calendar day "today" is.
    pub timezone: Tz,
}

impl WindowSettings {
    /// Parse an IANA timezone name.
    pub fn new(lookback_days: u32, timezone: &str) -> Result<Self, ConfigError> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::invalid("timezone", e.to_string()))?;
        Ok(Self {
            lookback_days,
            timezone,
        })
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            timezone: chrono_tz::America::New_York,
        }
    }
}

/// Connection settings for the literature index.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// E-utilities base URL; endpoint names are joined onto it.
    pub base_url: Url,
    /// Client identification token (`tool`).
    pub tool: String,
    /// Contact address (`email`).
    pub email: Option<String>,
    /// API key, raises the allowed request rate.
    pub api_key: Option<String>,
    /// Cap on identifiers returned by the search phase.
    pub max_results: usize,
    /// Identifiers per summary request.
    pub summary_chunk: usize,
    /// Identifiers per metadata request.
    pub metadata_chunk: usize,
    /// Timeout for search and summary calls.
    pub timeout: Duration,
    /// Timeout for bulk metadata calls.
    pub metadata_timeout: Duration,
}

impl IndexSettings {
    /// Settings pointing at a custom endpoint, otherwise defaults.
    pub fn with_base_url(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("index base URL", base_url)?,
            ..Self::default()
        })
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_EUTILS_BASE).expect("default E-utilities URL is valid"),
            tool: DEFAULT_TOOL.to_string(),
            email: None,
            api_key: None,
            max_results: DEFAULT_MAX_RESULTS,
            summary_chunk: DEFAULT_SUMMARY_CHUNK,
            metadata_chunk: DEFAULT_METADATA_CHUNK,
            timeout: Duration::from_secs(30),
            metadata_timeout: Duration::from_secs(60),
        }
    }
}

/// Snippet extraction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetSettings {
    /// Fetch abstracts and show a snippet per item.
    pub enabled: bool,
    /// Maximum words per snippet.
    pub max_words: usize,
}

impl Default for SnippetSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: DEFAULT_SNIPPET_WORDS,
        }
    }
}

/// Where the browsable abstracts page is published.
#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Public URL of the directory the page is served from.
    pub base_url: Url,
    /// Local directory the page file is written to.
    pub output_dir: PathBuf,
}

impl PageSettings {
    pub fn new(base_url: &str, output_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("abstracts page base URL", base_url)?,
            output_dir: output_dir.into(),
        })
    }
}

/// Parse a base URL, forcing a trailing slash so relative joins keep the path.
fn parse_base_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, "scheme must be http or https"));
    }
    Ok(url)
}

/// Full configuration for one digest run.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub profile: TopicProfile,
    pub window: WindowSettings,
    pub index: IndexSettings,
    pub snippets: SnippetSettings,
    /// Abstracts page, only published when configured.
    pub page: Option<PageSettings>,
    /// Digest title shown in the header and subject.
    pub title: String,
    /// Deliver a "no new items" digest when the window is empty.
    pub send_when_empty: bool,
    /// Ask the summarizer for a short summary per item.
    pub ai_summaries: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            profile: TopicProfile::default(),
            window: WindowSettings::default(),
            index: IndexSettings::default(),
            snippets: SnippetSettings::default(),
            page: None,
            title: DEFAULT_TITLE.to_string(),
            send_when_empty: true,
            ai_summaries: false,
        }
    }
}

impl DigestConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.is_empty() {
            return Err(ConfigError::EmptyProfile);
        }
        if self.window.lookback_days == 0 {
            return Err(ConfigError::invalid("lookback days", "must be at least 1"));
        }
        if self.index.tool.trim().is_empty() {
            return Err(ConfigError::Missing("index client identification (tool)"));
        }
        if self.index.max_results == 0 {
            return Err(ConfigError::invalid("max results", "must be at least 1"));
        }
        if self.index.summary_chunk == 0 || self.index.metadata_chunk == 0 {
            return Err(ConfigError::invalid("chunk size", "must be at least 1"));
        }
        if self.snippets.enabled && self.snippets.max_words == 0 {
            return Err(ConfigError::invalid("snippet max words", "must be at least 1"));
        }
        if self.title.trim().is_empty() {
            return Err(ConfigError::Missing("digest title"));
        }
        Ok(())
    }

    /// Whether any stage needs abstract text.
    pub fn needs_metadata(&self) -> bool {
        self.snippets.enabled || self.page.is_some() || self.ai_summaries
    }
}

/// SMTP settings for the mail transport.
#[derive(Clone)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// SMTP username.
    pub username: String,
    /// SMTP password or app password.
    pub password: String,
    /// Sender address.
    pub from: Mailbox,
    /// Recipient addresses.
    pub to: Vec<Mailbox>,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl SmtpConfig {
    /// Build SMTP settings from raw values, checking every address.
    ///
    /// `to` may hold several comma-separated recipients.
    pub fn new(
        host: Option<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Self, ConfigError> {
        let host = non_blank(host).ok_or(ConfigError::Missing("SMTP_HOST"))?;
        let username = non_blank(username).ok_or(ConfigError::Missing("SMTP_USER"))?;
        let password = non_blank(password).ok_or(ConfigError::Missing("SMTP_PASS"))?;
        let from = non_blank(from).unwrap_or_else(|| username.clone());
        let to = non_blank(to).ok_or(ConfigError::Missing("EMAIL_TO"))?;

        let from: Mailbox = from
            .parse()
            .map_err(|e| ConfigError::invalid("EMAIL_FROM", format!("{e}")))?;
        let to = to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| ConfigError::invalid("EMAIL_TO", format!("{addr}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(ConfigError::Missing("EMAIL_TO"));
        }

        Ok(Self {
            host,
            port,
            username,
            password,
            from,
            to,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DigestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.profile.journals.len(), 5);
        assert_eq!(config.window.lookback_days, 7);
        assert_eq!(config.index.max_results, 300);
    }

    #[test]
    fn test_empty_profile_rejected() {
        let config = DigestConfig {
            profile: TopicProfile::new(Vec::<String>::new(), vec!["  ", ""], false),
            ..DigestConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyProfile)));
    }

    #[test]
    fn test_profile_drops_blanks_and_repeats() {
        let profile = TopicProfile::new(vec!["Pain", " Pain ", "", "Neurology"], vec!["x"], false);
        assert_eq!(profile.journals, vec!["Pain", "Neurology"]);
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let mut config = DigestConfig::default();
        config.window.lookback_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_timezone_rejected() {
        assert!(WindowSettings::new(7, "Mars/Olympus_Mons").is_err());
        assert!(WindowSettings::new(7, "Europe/Berlin").is_ok());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let settings = IndexSettings::with_base_url("http://localhost:8080/eutils").unwrap();
        assert_eq!(settings.base_url.as_str(), "http://localhost:8080/eutils/");
        assert!(IndexSettings::with_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_smtp_requires_credentials() {
        let err = SmtpConfig::new(
            Some("smtp.example.com".to_string()),
            587,
            None,
            Some("secret".to_string()),
            None,
            Some("to@example.com".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SMTP_USER")));
    }

    #[test]
    fn test_smtp_parses_recipients() {
        let config = SmtpConfig::new(
            Some("smtp.example.com".to_string()),
            587,
            Some("bot@example.com".to_string()),
            Some("secret".to_string()),
            None,
            Some("a@example.com, b@example.com".to_string()),
        )
        .unwrap();
        assert_eq!(config.to.len(), 2);
        assert_eq!(config.from.email.to_string(), "bot@example.com");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
