use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::token::{ReadToken, TokenPermissions, TokenRequest};

const COPY_SOURCE_HEADER: &str = "x-ms-copy-source";
const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments: {0}")]
    BaseUrl(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("credential cannot issue read tokens for share {0}")]
    TokensUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// How requests against a share are authorized.
#[derive(Clone)]
pub enum Credential {
    /// Account key. Sent as a header and allowed to mint read tokens.
    AccountKey(String),
    /// Pre-signed token query string (`sv=..&sig=..`), appended to every request.
    SharedToken(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::AccountKey(_) => f.write_str("AccountKey(..)"),
            Credential::SharedToken(_) => f.write_str("SharedToken(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShareClient {
    http: Client,
    base_url: Url,
    share: String,
    credential: Credential,
}

impl ShareClient {
    pub fn new(
        base_url: &str,
        share: impl Into<String>,
        credential: Credential,
    ) -> Result<Self, ShareError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ShareError::BaseUrl(base_url.to_string()));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            share: share.into(),
            credential,
        })
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    pub async fn directory_exists(&self, path: &str) -> Result<bool, ShareError> {
        let url = self.endpoint_with_path(&["directories"], path)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_presence(response).await
    }

    /// Returns `true` when the directory was created, `false` when it was already there.
    pub async fn create_directory_if_not_exists(&self, path: &str) -> Result<bool, ShareError> {
        let url = self.endpoint_with_path(&["directories"], path)?;
        let response = self.request(Method::PUT, url).send().await?;
        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::api_error(response).await),
        }
    }

    pub async fn list_directory(
        &self,
        path: &str,
        marker: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<DirectoryPage, ShareError> {
        let mut url = self.endpoint_with_path(&["directories", "list"], path)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
            if let Some(max_results) = max_results {
                query.append_pair("maxresults", &max_results.to_string());
            }
        }
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn list_directory_all(
        &self,
        path: &str,
        page_size: Option<u32>,
    ) -> Result<Vec<DirectoryEntry>, ShareError> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let mut marker: Option<String> = None;
        let mut entries = Vec::new();
        loop {
            let page = self
                .list_directory(path, marker.as_deref(), Some(page_size))
                .await?;
            entries.extend(page.entries);
            match page.next_marker.filter(|m| !m.is_empty()) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(entries)
    }

    pub async fn get_file_properties(
        &self,
        path: &str,
    ) -> Result<Option<FileProperties>, ShareError> {
        let url = self.endpoint_with_path(&["files", "properties"], path)?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::handle_response(response).await?))
    }

    pub async fn delete_file_if_exists(&self, path: &str) -> Result<bool, ShareError> {
        let url = self.endpoint_with_path(&["files"], path)?;
        let response = self.request(Method::DELETE, url).send().await?;
        Self::handle_presence(response).await
    }

    pub async fn delete_directory_if_exists(&self, path: &str) -> Result<bool, ShareError> {
        let url = self.endpoint_with_path(&["directories"], path)?;
        let response = self.request(Method::DELETE, url).send().await?;
        Self::handle_presence(response).await
    }

    /// Asks the service to pull `source_url` into `path`. The copy runs server-side;
    /// the returned status is whatever the service reported when accepting it.
    pub async fn start_copy(&self, path: &str, source_url: &Url) -> Result<CopyInfo, ShareError> {
        let url = self.endpoint_with_path(&["files", "copy"], path)?;
        let response = self
            .request(Method::PUT, url)
            .header(COPY_SOURCE_HEADER, source_url.as_str())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub fn can_issue_read_tokens(&self) -> bool {
        matches!(self.credential, Credential::AccountKey(_))
    }

    pub async fn issue_read_token(
        &self,
        path: &str,
        expires_at: OffsetDateTime,
    ) -> Result<ReadToken, ShareError> {
        if !self.can_issue_read_tokens() {
            return Err(ShareError::TokensUnavailable(self.share.clone()));
        }
        let url = self.endpoint(&["tokens"])?;
        let body = TokenRequest {
            path: normalize_path(path),
            permissions: TokenPermissions::Read,
            expiry: expires_at,
        };
        let response = self.request(Method::POST, url).json(&body).send().await?;
        Self::handle_response(response).await
    }

    /// Plain URL of a file in this share, without any credential attached.
    pub fn file_url(&self, path: &str) -> Result<Url, ShareError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| ShareError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(&self.share)
            .extend(normalize_path(path).split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn request(&self, method: Method, mut url: Url) -> RequestBuilder {
        match &self.credential {
            Credential::AccountKey(key) => self
                .http
                .request(method, url)
                .header("Authorization", format!("SharedKey {key}")),
            Credential::SharedToken(token) => {
                {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in url::form_urlencoded::parse(
                        token.trim_start_matches('?').as_bytes(),
                    ) {
                        query.append_pair(&key, &value);
                    }
                }
                self.http.request(method, url)
            }
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ShareError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| ShareError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", "shares", self.share.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn endpoint_with_path(&self, segments: &[&str], path: &str) -> Result<Url, ShareError> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut()
            .append_pair("path", &normalize_path(path));
        Ok(url)
    }

    async fn handle_presence(response: Response) -> Result<bool, ShareError> {
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, ShareError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: Response) -> ShareError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ShareError::Api { status, body }
    }
}

impl ShareError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            ShareError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// Share paths are relative and `/`-separated; the share root is the empty string.
pub fn normalize_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DirectoryPage {
    #[serde(default)]
    pub entries: Vec<DirectoryEntry>,
    #[serde(default)]
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileProperties {
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub content_md5: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CopyInfo {
    pub copy_id: String,
    pub copy_status: CopyStatus,
}
