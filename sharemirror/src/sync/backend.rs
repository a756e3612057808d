use async_trait::async_trait;
use sharemirror_core::{DirectoryEntry, ReadToken, ShareClient, ShareError, StatusCode};
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

/// The slice of a hierarchical file-share backend the sync engine drives.
///
/// Paths are share-relative and `/`-separated; `""` is the share root. Absence
/// is reported through `Option`/`bool`, errors are reserved for failures.
#[async_trait]
pub trait FileShare: Send + Sync {
    async fn directory_exists(&self, path: &str) -> Result<bool, ShareError>;

    /// Returns `true` when the directory was created by this call.
    async fn create_directory_if_not_exists(&self, path: &str) -> Result<bool, ShareError>;

    /// Immediate children of `path`, or `None` when the directory is absent.
    async fn list_entries(&self, path: &str) -> Result<Option<Vec<DirectoryEntry>>, ShareError>;

    /// Size of the file at `path`, or `None` when no such file exists.
    async fn file_size(&self, path: &str) -> Result<Option<u64>, ShareError>;

    async fn delete_file_if_exists(&self, path: &str) -> Result<bool, ShareError>;

    /// Removes an empty directory.
    async fn delete_directory_if_exists(&self, path: &str) -> Result<bool, ShareError>;

    /// Starts a server-side copy of `source_url` into `path` and returns without
    /// waiting for it to finish.
    async fn start_copy(&self, path: &str, source_url: &Url) -> Result<(), ShareError>;

    fn file_url(&self, path: &str) -> Result<Url, ShareError>;
}

/// Mints short-lived read credentials for single files.
#[async_trait]
pub trait ReadTokenIssuer: Send + Sync {
    fn can_issue_read_tokens(&self) -> bool;

    async fn issue_read_token(
        &self,
        path: &str,
        expires_at: OffsetDateTime,
    ) -> Result<ReadToken, ShareError>;
}

#[async_trait]
impl FileShare for ShareClient {
    async fn directory_exists(&self, path: &str) -> Result<bool, ShareError> {
        ShareClient::directory_exists(self, path).await
    }

    async fn create_directory_if_not_exists(&self, path: &str) -> Result<bool, ShareError> {
        ShareClient::create_directory_if_not_exists(self, path).await
    }

    async fn list_entries(&self, path: &str) -> Result<Option<Vec<DirectoryEntry>>, ShareError> {
        match self.list_directory_all(path, None).await {
            Ok(entries) => Ok(Some(entries)),
            Err(ShareError::Api { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>, ShareError> {
        Ok(self
            .get_file_properties(path)
            .await?
            .map(|properties| properties.size))
    }

    async fn delete_file_if_exists(&self, path: &str) -> Result<bool, ShareError> {
        ShareClient::delete_file_if_exists(self, path).await
    }

    async fn delete_directory_if_exists(&self, path: &str) -> Result<bool, ShareError> {
        ShareClient::delete_directory_if_exists(self, path).await
    }

    async fn start_copy(&self, path: &str, source_url: &Url) -> Result<(), ShareError> {
        let info = ShareClient::start_copy(self, path, source_url).await?;
        debug!(path, copy_id = %info.copy_id, status = ?info.copy_status, "copy accepted");
        Ok(())
    }

    fn file_url(&self, path: &str) -> Result<Url, ShareError> {
        ShareClient::file_url(self, path)
    }
}

#[async_trait]
impl ReadTokenIssuer for ShareClient {
    fn can_issue_read_tokens(&self) -> bool {
        ShareClient::can_issue_read_tokens(self)
    }

    async fn issue_read_token(
        &self,
        path: &str,
        expires_at: OffsetDateTime,
    ) -> Result<ReadToken, ShareError> {
        ShareClient::issue_read_token(self, path, expires_at).await
    }
}
