//! Digest delivery over SMTP.

use async_trait::async_trait;
use lettre::message::{header::ContentType, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to build email message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Delivers one rendered digest.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, subject: &str, text_body: &str, html_body: &str)
        -> Result<(), DispatchError>;
}

/// Mailer using an authenticated STARTTLS SMTP session.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Send a simple test email to verify configuration.
    pub async fn send_test(&self) -> Result<(), DispatchError> {
        let subject = "litdigest - Test Email";
        let html_body = r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; padding: 20px; }
        .container { max-width: 600px; margin: 0 auto; }
        h1 { color: #0e7490; }
        .success { color: #16a34a; font-weight: bold; }
    </style>
</head>
<body>
    <div class="container">
        <h1>litdigest</h1>
        <p class="success">Email configuration is working.</p>
        <p>If you can read this, weekly digests will reach this inbox.</p>
    </div>
</body>
</html>
"#;
        let text_body = "litdigest - Test Email\n\nEmail configuration is working.\nIf you can read this, weekly digests will reach this inbox.\n";

        self.deliver(subject, text_body, html_body).await
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(
        &self,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), DispatchError> {
        let mut builder = Message::builder()
            .from(self.config.from.clone())
            .subject(subject);
        for recipient in &self.config.to {
            builder = builder.to(recipient.clone());
        }

        // Alternative parts go from least to most preferred.
        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text_body.to_string()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html_body.to_string()),
                ),
        )?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
                .port(self.config.port)
                .credentials(creds)
                .build();

        mailer.send(email).await?;

        tracing::info!(
            recipients = self.config.to.len(),
            subject = subject,
            "Email sent successfully"
        );
        Ok(())
    }
}
