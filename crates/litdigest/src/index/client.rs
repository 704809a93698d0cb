//! Shared plumbing for E-utilities endpoints.

use std::time::Duration;
use url::Url;

use super::http::{HttpError, HttpRequest, RetryingHttpClient};
use crate::config::{ConfigError, IndexSettings};

/// Thin wrapper that knows the endpoint URLs and the identification
/// parameters every call must carry.
pub struct EutilsClient {
    http: RetryingHttpClient,
    settings: IndexSettings,
    esearch: Url,
    esummary: Url,
    efetch: Url,
}

impl EutilsClient {
    pub fn new(http: RetryingHttpClient, settings: IndexSettings) -> Result<Self, ConfigError> {
        let join = |endpoint: &str| {
            settings
                .base_url
                .join(endpoint)
                .map_err(|e| ConfigError::invalid("index base URL", e.to_string()))
        };
        Ok(Self {
            esearch: join("esearch.fcgi")?,
            esummary: join("esummary.fcgi")?,
            efetch: join("efetch.fcgi")?,
            http,
            settings,
        })
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// `db`, `tool`, and the optional `email`/`api_key` parameters.
    fn identification(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("db".to_string(), "pubmed".to_string()),
            ("tool".to_string(), self.settings.tool.clone()),
        ];
        if let Some(email) = &self.settings.email {
            params.push(("email".to_string(), email.clone()));
        }
        if let Some(key) = &self.settings.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }
        params
    }

    pub(crate) async fn esearch(&self, params: Vec<(String, String)>) -> Result<String, HttpError> {
        let mut query = self.identification();
        query.extend(params);
        let request = HttpRequest::get(self.esearch.clone(), query, self.settings.timeout);
        self.http.send(&request).await
    }

    /// Summary lookups go over POST so long id lists fit; the endpoint is read-only.
    pub(crate) async fn esummary(&self, params: Vec<(String, String)>) -> Result<String, HttpError> {
        self.post(self.esummary.clone(), params, self.settings.timeout)
            .await
    }

    pub(crate) async fn efetch(&self, params: Vec<(String, String)>) -> Result<String, HttpError> {
        self.post(self.efetch.clone(), params, self.settings.metadata_timeout)
            .await
    }

    async fn post(
        &self,
        url: Url,
        params: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<String, HttpError> {
        let mut form = self.identification();
        form.extend(params);
        let request = HttpRequest::post_form(url, form, timeout).idempotent();
        self.http.send(&request).await
    }
}
