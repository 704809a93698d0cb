//! litdigest CLI - weekly PubMed literature digest.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use litdigest::config::{
    ConfigError, DigestConfig, IndexSettings, PageSettings, SmtpConfig, SnippetSettings,
    TopicProfile, WindowSettings, DEFAULT_EUTILS_BASE, DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_RESULTS,
    DEFAULT_SMTP_PORT, DEFAULT_SNIPPET_WORDS, DEFAULT_TIMEZONE, DEFAULT_TITLE, DEFAULT_TOOL,
};
use litdigest::digest::{AnthropicSummarizer, SmtpMailer, DEFAULT_MODEL};
use litdigest::index::RetryingHttpClient;
use litdigest::pipeline::{Pipeline, RunStatus};

/// litdigest - Fetch recent journal articles and mail a weekly digest.
#[derive(Parser)]
#[command(name = "litdigest")]
#[command(about = "Weekly PubMed literature digest")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    digest: DigestArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the digest and send it (for CronJob use)
    Run {
        /// Print the plain-text digest instead of sending it
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        smtp: SmtpArgs,
    },

    /// Build the digest and write digest.html / digest.txt without sending
    Preview {
        /// Directory for the preview files
        #[arg(long, default_value = "./preview")]
        out: PathBuf,
    },

    /// Print the search expression and window (no network)
    Query,

    /// Send a test email to verify SMTP settings
    TestEmail {
        #[command(flatten)]
        smtp: SmtpArgs,
    },
}

/// Topic profile, index and rendering settings.
#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct DigestArgs {
    /// Journal title abbreviations, comma separated
    #[arg(long, env = "DIGEST_JOURNALS", value_delimiter = ',')]
    journals: Vec<String>,

    /// Keywords or MeSH terms, comma separated
    #[arg(long, env = "DIGEST_KEYWORDS", value_delimiter = ',')]
    keywords: Vec<String>,

    /// Restrict results to adult populations
    #[arg(long, env = "DIGEST_ADULTS_ONLY")]
    adults_only: bool,

    /// Days covered by the rolling window
    #[arg(long, env = "DIGEST_LOOKBACK_DAYS", default_value_t = DEFAULT_LOOKBACK_DAYS)]
    lookback_days: u32,

    /// IANA timezone that decides the window's end date
    #[arg(long, env = "DIGEST_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// Show a conclusion or abstract snippet per item
    #[arg(long, env = "DIGEST_SNIPPETS", default_value_t = true, action = ArgAction::Set)]
    snippets: bool,

    /// Maximum words per snippet
    #[arg(long, env = "DIGEST_SNIPPET_MAX_WORDS", default_value_t = DEFAULT_SNIPPET_WORDS)]
    snippet_max_words: usize,

    /// Digest title, also the subject prefix
    #[arg(long, env = "DIGEST_TITLE", default_value = DEFAULT_TITLE)]
    title: String,

    /// Send a "no new items" digest when nothing matched
    #[arg(long, env = "DIGEST_SEND_WHEN_EMPTY", default_value_t = true, action = ArgAction::Set)]
    send_when_empty: bool,

    /// E-utilities base URL
    #[arg(long, env = "NCBI_EUTILS_BASE", default_value = DEFAULT_EUTILS_BASE)]
    eutils_base: String,

    /// Client identification sent to the index
    #[arg(long, env = "NCBI_TOOL", default_value = DEFAULT_TOOL)]
    tool: String,

    /// Contact address sent to the index
    #[arg(long, env = "NCBI_EMAIL")]
    ncbi_email: Option<String>,

    /// Index API key
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    ncbi_api_key: Option<String>,

    /// Maximum identifiers taken from the search
    #[arg(long, env = "DIGEST_MAX_RESULTS", default_value_t = DEFAULT_MAX_RESULTS)]
    max_results: usize,

    /// Public base URL of the abstracts page; enables the page
    #[arg(long, env = "ABSTRACTS_BASE_URL")]
    abstracts_base_url: Option<String>,

    /// Local directory the abstracts page is written to
    #[arg(long, env = "ABSTRACTS_DIR", default_value = "./public")]
    abstracts_dir: PathBuf,

    /// Add an AI summary per item
    #[arg(long, env = "DIGEST_AI_SUMMARY")]
    ai_summary: bool,

    /// Model used for AI summaries
    #[arg(long, env = "DIGEST_AI_MODEL", default_value = DEFAULT_MODEL)]
    ai_model: String,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
}

/// Mail transport settings.
#[derive(Args)]
pub struct SmtpArgs {
    /// SMTP server hostname
    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    smtp_host: String,

    /// SMTP server port (STARTTLS)
    #[arg(long, env = "SMTP_PORT", default_value_t = DEFAULT_SMTP_PORT)]
    smtp_port: u16,

    /// SMTP username
    #[arg(long, env = "SMTP_USER")]
    smtp_user: Option<String>,

    /// SMTP password or app password
    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    smtp_pass: Option<String>,

    /// Sender address (defaults to the SMTP username)
    #[arg(long, env = "EMAIL_FROM")]
    email_from: Option<String>,

    /// Recipient addresses, comma separated
    #[arg(long, env = "EMAIL_TO")]
    email_to: Option<String>,
}

impl DigestArgs {
    fn to_config(&self) -> Result<DigestConfig, ConfigError> {
        let profile = if self.journals.is_empty() && self.keywords.is_empty() {
            TopicProfile {
                adults_only: self.adults_only,
                ..TopicProfile::default()
            }
        } else {
            TopicProfile::new(&self.journals, &self.keywords, self.adults_only)
        };

        let mut index = IndexSettings::with_base_url(&self.eutils_base)?;
        index.tool.clone_from(&self.tool);
        index.email.clone_from(&self.ncbi_email);
        index.api_key.clone_from(&self.ncbi_api_key);
        index.max_results = self.max_results;

        let page = self
            .abstracts_base_url
            .as_deref()
            .map(|base| PageSettings::new(base, self.abstracts_dir.clone()))
            .transpose()?;

        let config = DigestConfig {
            profile,
            window: WindowSettings::new(self.lookback_days, &self.timezone)?,
            index,
            snippets: SnippetSettings {
                enabled: self.snippets,
                max_words: self.snippet_max_words,
            },
            page,
            title: self.title.clone(),
            send_when_empty: self.send_when_empty,
            ai_summaries: self.ai_summary,
        };
        config.validate()?;
        Ok(config)
    }

    fn pipeline(&self) -> Result<Pipeline> {
        let config = self.to_config()?;
        let http = RetryingHttpClient::new().context("Failed to create HTTP client")?;
        let mut pipeline = Pipeline::new(config, http)?;

        if self.ai_summary {
            let key = self
                .anthropic_api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;
            let summarizer = AnthropicSummarizer::new(key, self.ai_model.clone())
                .context("Failed to create summarizer")?;
            pipeline = pipeline.with_summarizer(Arc::new(summarizer));
        }
        Ok(pipeline)
    }
}

impl SmtpArgs {
    fn to_config(&self) -> Result<SmtpConfig, ConfigError> {
        SmtpConfig::new(
            Some(self.smtp_host.clone()),
            self.smtp_port,
            self.smtp_user.clone(),
            self.smtp_pass.clone(),
            self.email_from.clone(),
            self.email_to.clone(),
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("litdigest=debug,info")
    } else {
        EnvFilter::new("litdigest=info,warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { dry_run, smtp } => run_digest(&cli.digest, &smtp, dry_run).await,
        Commands::Preview { out } => run_preview(&cli.digest, out).await,
        Commands::Query => run_query(&cli.digest),
        Commands::TestEmail { smtp } => run_test_email(&smtp).await,
    }
}

async fn run_digest(digest: &DigestArgs, smtp: &SmtpArgs, dry_run: bool) -> Result<()> {
    let pipeline = digest.pipeline()?;

    if dry_run {
        let assembled = pipeline.assemble(Utc::now()).await?;
        println!("Query: {}", assembled.query);
        println!("Subject: {}\n", assembled.digest.subject);
        println!("{}", assembled.digest.text);
        return Ok(());
    }

    // Fail on missing credentials before touching the network.
    let mailer = SmtpMailer::new(smtp.to_config()?);
    let outcome = pipeline.run_at(Utc::now(), &mailer).await?;

    match outcome.status {
        RunStatus::Delivered { items } => {
            println!("Digest sent: {items} items ({})", outcome.assembled.window);
        }
        RunStatus::NoNewItems { delivered: true } => {
            println!("No new items in {}; empty digest sent", outcome.assembled.window);
        }
        RunStatus::NoNewItems { delivered: false } => {
            println!("No new items in {}; nothing sent", outcome.assembled.window);
        }
    }
    if let Some(url) = &outcome.assembled.report.page_url {
        println!("Abstracts page: {url}");
    }
    Ok(())
}

async fn run_preview(digest: &DigestArgs, out: PathBuf) -> Result<()> {
    let pipeline = digest.pipeline()?;
    let assembled = pipeline.assemble(Utc::now()).await?;

    std::fs::create_dir_all(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let html_path = out.join("digest.html");
    let text_path = out.join("digest.txt");
    std::fs::write(&html_path, &assembled.digest.html)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    std::fs::write(&text_path, &assembled.digest.text)
        .with_context(|| format!("Failed to write {}", text_path.display()))?;

    println!("Query: {}", assembled.query);
    println!("Subject: {}", assembled.digest.subject);
    println!("Items: {}", assembled.items.len());
    println!("Wrote {} and {}", html_path.display(), text_path.display());
    Ok(())
}

fn run_query(digest: &DigestArgs) -> Result<()> {
    let config = digest.to_config()?;
    let http = RetryingHttpClient::new().context("Failed to create HTTP client")?;
    let pipeline = Pipeline::new(config, http)?;
    let (window, query) = pipeline.plan(Utc::now());

    println!("Window: {window} (entry date)");
    println!("Query:  {query}");
    Ok(())
}

async fn run_test_email(smtp: &SmtpArgs) -> Result<()> {
    let mailer = SmtpMailer::new(smtp.to_config()?);
    mailer.send_test().await?;
    println!("Test email sent");
    Ok(())
}
