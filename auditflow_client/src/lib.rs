//! HTTP client for the audit log pagination source
//!
//! The source pages through a server-side result set keyed by a
//! client-supplied session identifier: every request carries the same query
//! parameters and the server advances its cursor on session identity alone.
//! This crate only knows how to fetch one page; the loop that drives the
//! session to completion lives in `auditflow_write`.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{
    IntoUrl,
    header::{ACCEPT, AUTHORIZATION},
};
use secrecy::{ExposeSecret, Secret};
use tracing::debug;
use url::Url;

use auditflow_types::AuditLogPage;

pub use reqwest::StatusCode;

/// Unified Audit Log endpoint queried when no override is configured
pub const DEFAULT_ENDPOINT: &str = "https://outlook.office365.com/psws/service.svc/UnifiedAuditLog";

/// Primary error type for the audit log source
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("failed to send audit log request: {0}")]
    RequestSend(#[source] reqwest::Error),

    #[error("failed to read the API response bytes: {0}")]
    Bytes(#[source] reqwest::Error),

    #[error("failed to parse JSON response: {0}")]
    Json(#[source] serde_json::Error),

    #[error("audit log API responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Capability to fetch one page of audit records for a fixed parameter set
#[async_trait]
pub trait AuditLogSource: std::fmt::Debug + Send + Sync {
    async fn fetch_page(&self, params: &[(String, String)]) -> Result<AuditLogPage>;
}

/// [`AuditLogSource`] backed by the audit log HTTP API
///
/// Holds no per-drain state; construct it once at process start and share it
/// across drain invocations.
#[derive(Debug, Clone)]
pub struct HttpAuditLogSource {
    /// The full URL of the audit log endpoint
    endpoint: Url,
    /// `user:password` credentials sent as a `Basic` authorization header
    credentials: Option<Secret<String>>,
    /// A [`reqwest::Client`] for handling HTTP requests
    http_client: reqwest::Client,
}

impl HttpAuditLogSource {
    /// Create a new [`HttpAuditLogSource`] against the given endpoint
    pub fn new<U: IntoUrl>(endpoint: U) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into_url().map_err(Error::BaseUrl)?,
            credentials: None,
            http_client: reqwest::Client::new(),
        })
    }

    /// Set the `user:password` credentials sent with each request
    pub fn with_basic_credentials<S: Into<String>>(mut self, credentials: S) -> Self {
        self.credentials = Some(Secret::new(credentials.into()));
        self
    }
}

#[async_trait]
impl AuditLogSource for HttpAuditLogSource {
    async fn fetch_page(&self, params: &[(String, String)]) -> Result<AuditLogPage> {
        let mut request = self
            .http_client
            .get(self.endpoint.clone())
            .query(params)
            .header(ACCEPT, "application/json");
        if let Some(credentials) = &self.credentials {
            let encoded = BASE64.encode(credentials.expose_secret());
            request = request.header(AUTHORIZATION, format!("Basic {encoded}"));
        }

        let response = request.send().await.map_err(Error::RequestSend)?;
        let code = response.status();
        if !code.is_success() {
            let message = response.text().await.map_err(Error::Bytes)?;
            return Err(Error::ApiError { code, message });
        }

        let body = response.bytes().await.map_err(Error::Bytes)?;
        let page: AuditLogPage = serde_json::from_slice(&body).map_err(Error::Json)?;
        debug!(records = page.records.len(), "fetched audit log page");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test_log::test(tokio::test)]
    async fn fetch_page_parses_records_from_value_field() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/UnifiedAuditLog")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("SessionId".into(), "abc".into()),
                Matcher::UrlEncoded("ResultSize".into(), "300".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"value": [
                    {"CreationDate": "2024-03-01T10:00:00", "AuditData": "one"},
                    {"CreationDate": "2024-03-01T11:00:00", "AuditData": "two"}
                ]}"#,
            )
            .create_async()
            .await;

        let source =
            HttpAuditLogSource::new(format!("{}/UnifiedAuditLog", server.url())).unwrap();
        let page = source
            .fetch_page(&params(&[("SessionId", "abc"), ("ResultSize", "300")]))
            .await
            .unwrap();

        assert_eq!(page.records.len(), 2);
        mock.assert_async().await;
    }

    #[test_log::test(tokio::test)]
    async fn fetch_page_sends_basic_credentials() {
        let mut server = Server::new_async().await;
        // "user:pass" base64-encoded
        let mock = server
            .mock("GET", "/UnifiedAuditLog")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(r#"{"value": []}"#)
            .create_async()
            .await;

        let source = HttpAuditLogSource::new(format!("{}/UnifiedAuditLog", server.url()))
            .unwrap()
            .with_basic_credentials("user:pass");
        let page = source.fetch_page(&[]).await.unwrap();

        assert!(page.is_empty());
        mock.assert_async().await;
    }

    #[test_log::test(tokio::test)]
    async fn non_success_status_surfaces_code_and_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/UnifiedAuditLog")
            .with_status(503)
            .with_body("throttled, come back later")
            .create_async()
            .await;

        let source =
            HttpAuditLogSource::new(format!("{}/UnifiedAuditLog", server.url())).unwrap();
        let err = source.fetch_page(&[]).await.unwrap_err();

        match err {
            Error::ApiError { code, message } => {
                assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "throttled, come back later");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn body_without_value_field_is_an_empty_page() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/UnifiedAuditLog")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let source =
            HttpAuditLogSource::new(format!("{}/UnifiedAuditLog", server.url())).unwrap();
        let page = source.fetch_page(&[]).await.unwrap();

        assert!(page.is_empty());
    }

    #[test]
    fn source_creation_with_invalid_url_errors() {
        assert!(matches!(
            HttpAuditLogSource::new("not a url"),
            Err(Error::BaseUrl(_))
        ));
    }
}
