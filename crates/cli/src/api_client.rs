//! HTTP client for the calsnap wire protocol.

use async_trait::async_trait;
use bytes::Bytes;
use calsnap_core::{SnapshotId, SnapshotInfo, SnapshotWindow};
use reqwest::{StatusCode, Url};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Failure talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("server rejected the owner credentials")]
    Unauthorized,

    #[error("server returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// The calls a sync needs from the server.
#[async_trait]
pub trait SnapshotTransport: Send + Sync {
    /// Create the owner, or log in if it exists.
    async fn reserve_or_authenticate(&self) -> Result<(), TransportError>;

    async fn upload_full(&self, data: Bytes) -> Result<(), TransportError>;

    async fn upload_partial(&self, window: SnapshotWindow, data: Bytes)
    -> Result<(), TransportError>;
}

/// Owner name and passphrase hash as sent on the wire.
#[derive(Clone)]
pub struct OwnerCredentials {
    pub owner_name: String,
    pub passphrase_hash: String,
}

impl std::fmt::Debug for OwnerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerCredentials")
            .field("owner_name", &self.owner_name)
            .field("passphrase_hash", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: OwnerCredentials,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: OwnerCredentials) -> Result<Self, TransportError> {
        Self::build(base_url, credentials, reqwest::Client::builder())
    }

    /// Like [`ApiClient::new`], additionally trusting the PEM certificate at `ca_cert`.
    pub fn with_ca_cert(
        base_url: &str,
        credentials: OwnerCredentials,
        ca_cert: &Path,
    ) -> Result<Self, TransportError> {
        let pem = std::fs::read(ca_cert)
            .map_err(|e| TransportError::Certificate(format!("{}: {e}", ca_cert.display())))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| TransportError::Certificate(e.to_string()))?;
        Self::build(
            base_url,
            credentials,
            reqwest::Client::builder().add_root_certificate(cert),
        )
    }

    fn build(
        base_url: &str,
        credentials: OwnerCredentials,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url)?;
        let http = builder
            .user_agent(concat!("calsnap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    fn url(&self, route: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(&format!("calendar/{route}"))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }

    fn with_credentials(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.query(&[
            ("ownerName", self.credentials.owner_name.as_str()),
            ("passphraseHash", self.credentials.passphrase_hash.as_str()),
        ])
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let response = self.with_credentials(req).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Check credentials without creating the owner.
    pub async fn authenticate(&self) -> Result<(), TransportError> {
        let url = self.url("Authenticate")?;
        self.send(self.http.get(url)).await?;
        Ok(())
    }

    /// List the owner's snapshots, oldest first.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, TransportError> {
        let url = self.url("GetAvailableSnapshots")?;
        let response = self.send(self.http.get(url)).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Download one snapshot payload.
    pub async fn fetch_snapshot(&self, id: SnapshotId) -> Result<Bytes, TransportError> {
        let url = self.url("GetSnapshotData")?;
        let req = self.http.get(url).query(&[("id", id.get())]);
        let response = self.send(req).await?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl SnapshotTransport for ApiClient {
    async fn reserve_or_authenticate(&self) -> Result<(), TransportError> {
        let url = self.url("ReserveName")?;
        self.send(self.http.post(url)).await?;
        Ok(())
    }

    async fn upload_full(&self, data: Bytes) -> Result<(), TransportError> {
        let url = self.url("AddFullSnapshot")?;
        let req = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        self.send(req).await?;
        Ok(())
    }

    async fn upload_partial(
        &self,
        window: SnapshotWindow,
        data: Bytes,
    ) -> Result<(), TransportError> {
        let url = self.url("AddPartialSnapshot")?;
        let start = format_instant(window.start())?;
        let end = format_instant(window.end())?;
        let req = self
            .http
            .post(url)
            .query(&[("windowStart", start), ("windowEnd", end)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        self.send(req).await?;
        Ok(())
    }
}

/// Parse a server URL, requiring http(s) and a trailing slash so routes join
/// below any path prefix.
pub fn normalize_base_url(url: &str) -> Result<Url, TransportError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(TransportError::InvalidUrl(
            "server URL must start with http:// or https://".to_string(),
        ));
    }
    let with_slash = format!("{}/", url.trim_end_matches('/'));
    Url::parse(&with_slash).map_err(|e| TransportError::InvalidUrl(e.to_string()))
}

fn format_instant(at: OffsetDateTime) -> Result<String, TransportError> {
    at.format(&Rfc3339)
        .map_err(|e| TransportError::Decode(format!("cannot format {at}: {e}")))
}
