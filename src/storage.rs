//! Object storage for uploaded files.
//!
//! Two buckets exist: [`BLOG_UPLOADS`] for blog attachments and [`CV_FILES`]
//! for CV documents. Keys are flat file names (`{uuid}.{ext}`).

use axum::body::Bytes;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::StorageConfig;

pub const BLOG_UPLOADS: &str = "blog-uploads";
pub const CV_FILES: &str = "cv-files";

pub const BUCKETS: &[&str] = &[BLOG_UPLOADS, CV_FILES];

/// URL prefix under which the local backend serves its root directory.
pub const LOCAL_PUBLIC_PREFIX: &str = "/storage";

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage service returned {status}: {body}")]
    Remote { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub enum ObjectStorage {
    Local { root: PathBuf },
    Supabase { url: String, service_key: String },
}

/// Keys are single path segments of `[A-Za-z0-9._-]`, never `.` or `..`.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key != "."
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// The key an attachment `path` names in `bucket`. Accepts a bare key or one
/// prefixed with the bucket name, as older rows store it.
pub fn key_for_path(bucket: &str, path: &str) -> Option<String> {
    let key = path
        .strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path);
    validate_key(key).ok()?;
    Some(key.to_string())
}

/// Write through a hidden temp file and rename into place. The temp file is
/// removed again if any step fails.
async fn write_atomically(dir: &Path, key: &str, data: &[u8]) -> std::io::Result<()> {
    let tmp = dir.join(format!(".{}.tmp", key));
    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, dir.join(key)).await
    }
    .await;

    if written.is_err() {
        if let Err(e) = fs::remove_file(&tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
            }
        }
    }
    written
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    if BUCKETS.contains(&bucket) {
        Ok(())
    } else {
        Err(StorageError::UnknownBucket(bucket.to_string()))
    }
}

/// Object key for an upload: a fresh UUID plus the lowercased extension of
/// the original file name when it is 1-8 ASCII alphanumerics, else `bin`.
pub fn object_key_for(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| (1..=8).contains(&e.len()) && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", uuid::Uuid::new_v4(), ext)
}

impl ObjectStorage {
    pub fn from_config(config: &StorageConfig) -> Self {
        match config {
            StorageConfig::Local { root } => ObjectStorage::Local { root: root.clone() },
            StorageConfig::Supabase { url, service_key } => ObjectStorage::Supabase {
                url: url.clone(),
                service_key: service_key.clone(),
            },
        }
    }

    /// Root directory served under [`LOCAL_PUBLIC_PREFIX`], local backend only.
    pub fn local_root(&self) -> Option<&Path> {
        match self {
            ObjectStorage::Local { root } => Some(root),
            ObjectStorage::Supabase { .. } => None,
        }
    }

    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        match self {
            ObjectStorage::Local { root } => {
                let dir = root.join(bucket);
                fs::create_dir_all(&dir).await?;

                write_atomically(&dir, key, &data).await?;
            }
            ObjectStorage::Supabase { url, service_key } => {
                let endpoint = format!("{}/storage/v1/object/{}/{}", url, bucket, key);
                let response = HTTP_CLIENT
                    .post(&endpoint)
                    .bearer_auth(service_key)
                    .header("apikey", service_key.as_str())
                    .header("Content-Type", content_type)
                    .header("x-upsert", "false")
                    .body(data)
                    .send()
                    .await?;
                check_status(response).await?;
            }
        }

        tracing::debug!(bucket, key, "object stored");
        Ok(())
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        match self {
            ObjectStorage::Local { .. } => format!("{}/{}/{}", LOCAL_PUBLIC_PREFIX, bucket, key),
            ObjectStorage::Supabase { url, .. } => {
                format!("{}/storage/v1/object/public/{}/{}", url, bucket, key)
            }
        }
    }

    /// Inverse of [`public_url`](Self::public_url): the key of a URL that
    /// points into `bucket`, if it does.
    pub fn key_from_url(&self, bucket: &str, url: &str) -> Option<String> {
        let prefix = self.public_url(bucket, "");
        let key = url.strip_prefix(&prefix)?;
        validate_key(key).ok()?;
        Some(key.to_string())
    }

    /// Delete objects. Keys that do not exist are ignored.
    pub async fn remove(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        for key in keys {
            validate_key(key)?;
        }
        if keys.is_empty() {
            return Ok(());
        }

        match self {
            ObjectStorage::Local { root } => {
                for key in keys {
                    match fs::remove_file(root.join(bucket).join(key)).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            ObjectStorage::Supabase { url, service_key } => {
                let endpoint = format!("{}/storage/v1/object/{}", url, bucket);
                let response = HTTP_CLIENT
                    .delete(&endpoint)
                    .bearer_auth(service_key)
                    .header("apikey", service_key.as_str())
                    .json(&serde_json::json!({ "prefixes": keys }))
                    .send()
                    .await?;
                check_status(response).await?;
            }
        }

        tracing::debug!(bucket, count = keys.len(), "objects removed");
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Remote {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_keeps_short_extension() {
        let key = object_key_for("Resume.PDF");
        assert!(key.ends_with(".pdf"));
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_object_key_falls_back_to_bin() {
        assert!(object_key_for("noextension").ends_with(".bin"));
        assert!(object_key_for("archive.verylongext").ends_with(".bin"));
        assert!(object_key_for("weird.p$f").ends_with(".bin"));
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/b.txt").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("abc-123.pdf").is_ok());
    }

    #[test]
    fn test_key_for_path_accepts_bucket_prefix() {
        assert_eq!(key_for_path(BLOG_UPLOADS, "a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(
            key_for_path(BLOG_UPLOADS, "blog-uploads/a.pdf").as_deref(),
            Some("a.pdf")
        );
        assert_eq!(key_for_path(BLOG_UPLOADS, "cv-files/a.pdf"), None);
        assert_eq!(key_for_path(BLOG_UPLOADS, "../a.pdf"), None);
    }

    #[tokio::test]
    async fn test_failed_local_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::Local {
            root: dir.path().to_path_buf(),
        };
        // A non-empty directory at the target path makes the final rename fail.
        let target = dir.path().join(BLOG_UPLOADS).join("taken.txt");
        std::fs::create_dir_all(target.join("inner")).unwrap();

        let result = storage
            .upload(BLOG_UPLOADS, "taken.txt", Bytes::from_static(b"x"), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!dir.path().join(BLOG_UPLOADS).join(".taken.txt.tmp").exists());
    }

    #[test]
    fn test_public_url_and_key_round_trip() {
        let storage = ObjectStorage::Supabase {
            url: "https://proj.supabase.co".to_string(),
            service_key: "key".to_string(),
        };
        let url = storage.public_url(CV_FILES, "abc.pdf");
        assert_eq!(
            url,
            "https://proj.supabase.co/storage/v1/object/public/cv-files/abc.pdf"
        );
        assert_eq!(storage.key_from_url(CV_FILES, &url), Some("abc.pdf".to_string()));
        assert_eq!(storage.key_from_url(BLOG_UPLOADS, &url), None);
        assert_eq!(storage.key_from_url(CV_FILES, "https://elsewhere/x.pdf"), None);
    }

    #[tokio::test]
    async fn test_local_upload_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::Local {
            root: dir.path().to_path_buf(),
        };

        storage
            .upload(BLOG_UPLOADS, "a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        let path = dir.path().join(BLOG_UPLOADS).join("a.txt");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(storage.public_url(BLOG_UPLOADS, "a.txt"), "/storage/blog-uploads/a.txt");

        storage
            .remove(BLOG_UPLOADS, &["a.txt".to_string(), "missing.txt".to_string()])
            .await
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unknown_bucket_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::Local {
            root: dir.path().to_path_buf(),
        };
        let err = storage
            .upload("avatars", "a.txt", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownBucket(_)));
    }
}
