//! Outbound HTTP client for the origin static-file host.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::domain::projects::ProjectManifest;

/// Sub-folder of every project that holds its media files.
const MEDIA_FOLDER: &str = "media";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("invalid origin url: {0}")]
    Url(#[from] url::ParseError),
}

/// Thin wrapper over `reqwest` that owns the origin base URL and applies a
/// uniform request timeout and status check to every fetch.
#[derive(Debug, Clone)]
pub struct OriginClient {
    http: reqwest::Client,
    base: Url,
}

impl OriginClient {
    pub fn new(mut base: Url, request_timeout: Duration) -> Result<Self, FetchError> {
        // Url::join treats a base without a trailing slash as a file.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of a media file inside a project folder.
    pub fn media_url(&self, folder: &str, filename: &str) -> Result<Url, FetchError> {
        Ok(self.base.join(&format!("{folder}/{MEDIA_FOLDER}/{filename}"))?)
    }

    /// Fetch the origin root directory listing.
    pub async fn root_listing(&self) -> Result<String, FetchError> {
        self.fetch_text(self.base.clone()).await
    }

    /// Fetch and decode a project's `manifest.json`.
    pub async fn manifest(&self, folder: &str) -> Result<ProjectManifest, FetchError> {
        let url = self.base.join(&format!("{folder}/manifest.json"))?;
        let response = self.checked(url).await?;
        Ok(response.json().await?)
    }

    /// Fetch a project's `media/` directory listing.
    pub async fn media_listing(&self, folder: &str) -> Result<String, FetchError> {
        let url = self.base.join(&format!("{folder}/{MEDIA_FOLDER}/"))?;
        self.fetch_text(url).await
    }

    pub async fn fetch_text(&self, url: Url) -> Result<String, FetchError> {
        let response = self.checked(url).await?;
        Ok(response.text().await?)
    }

    pub async fn fetch_bytes(&self, url: Url) -> Result<Bytes, FetchError> {
        let response = self.checked(url).await?;
        Ok(response.bytes().await?)
    }

    async fn checked(&self, url: Url) -> Result<reqwest::Response, FetchError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}
