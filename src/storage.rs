use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::StorageError;
use crate::http::{HttpClient, HttpRequest, Method};

/// Public URL of an object; deterministic, never signed
pub fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{bucket}/{key}")
}

/// Durable object storage for audio files
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file and return its public URL.
    ///
    /// `sha256` is the hex digest of the file as computed by [`file_digest`].
    async fn put(
        &self,
        local_path: &Path,
        sha256: &str,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// Hex SHA-256 digest of a file, read in chunks
pub async fn file_digest(path: &Path) -> Result<String, StorageError> {
    let read_failed = |e| StorageError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(read_failed)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await.map_err(read_failed)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Object store speaking plain HTTP `PUT`/`DELETE` against `{endpoint}/{bucket}/{key}`
pub struct HttpObjectStore<C> {
    client: C,
    endpoint: String,
    auth_token: Option<String>,
}

impl<C: HttpClient> HttpObjectStore<C> {
    pub fn new(client: C, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.endpoint.trim_end_matches('/'))
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match &self.auth_token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl<C: HttpClient> ObjectStore for HttpObjectStore<C> {
    async fn put(
        &self,
        local_path: &Path,
        sha256: &str,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: local_path.to_path_buf(),
                source: e,
            })?;

        let url = self.object_url(bucket, key);
        let request = HttpRequest::new(Method::PUT, &url)
            .header("Content-Type", "audio/mpeg")
            .header("x-amz-content-sha256", sha256)
            .body(data);

        let reply = self
            .client
            .send(self.authorize(request))
            .await
            .map_err(|e| StorageError::HttpFailed {
                url: url.clone(),
                source: e,
            })?;

        if !reply.is_success() {
            return Err(StorageError::HttpStatus {
                url,
                status: reply.status,
            });
        }

        tracing::debug!(%bucket, %key, "Stored object");
        Ok(public_url(bucket, key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let url = self.object_url(bucket, key);
        let request = self.authorize(HttpRequest::new(Method::DELETE, &url));

        let reply = self
            .client
            .send(request)
            .await
            .map_err(|e| StorageError::HttpFailed {
                url: url.clone(),
                source: e,
            })?;

        // Already gone counts as deleted
        if reply.is_success() || reply.status == 404 {
            Ok(())
        } else {
            Err(StorageError::HttpStatus {
                url,
                status: reply.status,
            })
        }
    }
}
