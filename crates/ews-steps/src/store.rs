//! Filesystem-backed result store and artifact transfer.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use ews_domain::BuildId;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::error::{Result, StepError};
use crate::services::{ArtifactKey, ArtifactTransfer, ResultStore};

/// Where controller-side files live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of result blobs and artifacts.
    pub root: PathBuf,
    /// URL under which `root/public` is served.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("ews-storage"),
            public_base_url: "http://localhost:8010".to_string(),
        }
    }
}

/// Run filesystem work on the blocking pool so other builds keep running.
async fn blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(io::Error::other)?
}

fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    NamedTempFile::new_in(dir)
}

/// Write `data` next to `path` and rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = temp_file_beside(path)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Stream `from` into a temporary file beside `to`, then rename it into place.
fn copy_atomic(from: &Path, to: &Path) -> io::Result<u64> {
    let mut source = fs::File::open(from)?;
    let mut tmp = temp_file_beside(to)?;
    let copied = io::copy(&mut source, &mut tmp)?;
    tmp.persist(to).map_err(|e| e.error)?;
    Ok(copied)
}

/// Result blobs at `<root>/results/<build_id>/<step>.json`.
pub struct FsResultStore {
    results_dir: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let results_dir = root.as_ref().join("results");
        fs::create_dir_all(&results_dir)?;
        Ok(Self { results_dir })
    }

    fn blob_path(&self, build_id: &BuildId, step_name: &str) -> PathBuf {
        let file = format!("{}.json", step_name.replace(['/', '\\'], "_"));
        self.results_dir.join(build_id.to_string()).join(file)
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn put(&self, build_id: &BuildId, step_name: &str, json: &str) -> Result<()> {
        let path = self.blob_path(build_id, step_name);
        let data = json.as_bytes().to_vec();
        blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| StepError::Store(format!("failed to store {step_name}: {e}")))
    }

    async fn get(&self, build_id: &BuildId, step_name: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.blob_path(build_id, step_name)).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StepError::Store(format!("failed to read {step_name}: {e}"))),
        }
    }
}

/// Artifacts under `<root>/public/<key>`, copied to and from a worker directory.
pub struct FsArtifactTransfer {
    workdir: PathBuf,
    public_dir: PathBuf,
    public_base_url: String,
}

impl FsArtifactTransfer {
    pub fn new(workdir: impl Into<PathBuf>, config: &StorageConfig) -> Self {
        Self {
            workdir: workdir.into(),
            public_dir: config.root.join("public"),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn stored_path(&self, key: &ArtifactKey) -> PathBuf {
        self.public_dir.join(key.as_str())
    }
}

#[async_trait]
impl ArtifactTransfer for FsArtifactTransfer {
    async fn upload(&self, local_path: &str, key: &ArtifactKey) -> Result<()> {
        let from = self.workdir.join(local_path);
        let to = self.stored_path(key);
        blocking(move || copy_atomic(&from, &to))
            .await
            .map_err(|e| StepError::Transfer(format!("failed to upload {local_path} to {key}: {e}")))?;
        Ok(())
    }

    async fn download(&self, key: &ArtifactKey, local_path: &str) -> Result<()> {
        let from = self.stored_path(key);
        let to = self.workdir.join(local_path);
        blocking(move || copy_atomic(&from, &to))
            .await
            .map_err(|e| StepError::Transfer(format!("failed to download {key} to {local_path}: {e}")))?;
        Ok(())
    }

    async fn extract(&self, key: &ArtifactKey) -> Result<ArtifactKey> {
        let directory = key.directory();
        let output = Command::new("unzip")
            .arg("-o")
            .arg(self.stored_path(key))
            .arg("-d")
            .arg(self.stored_path(&directory))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| StepError::Spawn {
                program: "unzip".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(StepError::Transfer(format!(
                "failed to extract {key}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(directory)
    }

    fn public_url(&self, key: &ArtifactKey) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_result_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path()).unwrap();
        let build = BuildId::new();

        assert_eq!(store.get(&build, "run-api-tests").await.unwrap(), None);
        store.put(&build, "run-api-tests", "{}").await.unwrap();
        assert_eq!(
            store.get(&build, "run-api-tests").await.unwrap().as_deref(),
            Some("{}")
        );
        store.put(&build, "run-api-tests", r#"{"Failed": []}"#).await.unwrap();
        assert_eq!(
            store.get(&build, "run-api-tests").await.unwrap().as_deref(),
            Some(r#"{"Failed": []}"#)
        );
    }

    #[tokio::test]
    async fn test_result_store_scoped_by_build() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path()).unwrap();
        store.put(&BuildId::new(), "jscore-test", "{}").await.unwrap();
        assert_eq!(store.get(&BuildId::new(), "jscore-test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_artifact_upload_download() {
        let worker = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: storage.path().to_path_buf(),
            public_base_url: "https://ews.example.org/".to_string(),
        };
        let transfer = FsArtifactTransfer::new(worker.path(), &config);
        let key = ArtifactKey::new("archives/mac-mojave-release/12.zip");

        fs::create_dir_all(worker.path().join("WebKitBuild")).unwrap();
        fs::write(worker.path().join("WebKitBuild/release.zip"), b"zip").unwrap();
        transfer.upload("WebKitBuild/release.zip", &key).await.unwrap();
        assert!(storage.path().join("public/archives/mac-mojave-release/12.zip").exists());

        fs::remove_file(worker.path().join("WebKitBuild/release.zip")).unwrap();
        transfer.download(&key, "WebKitBuild/release.zip").await.unwrap();
        assert_eq!(fs::read(worker.path().join("WebKitBuild/release.zip")).unwrap(), b"zip");

        assert_eq!(
            transfer.public_url(&key),
            "https://ews.example.org/archives/mac-mojave-release/12.zip"
        );
    }

    #[test]
    fn test_copy_atomic_streams_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("product.zip");
        let data: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        fs::write(&from, &data).unwrap();

        let to = dir.path().join("public/archives/product.zip");
        let copied = copy_atomic(&from, &to).unwrap();

        assert_eq!(copied, data.len() as u64);
        assert_eq!(fs::read(&to).unwrap(), data);
        let leftovers = fs::read_dir(to.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_upload_on_single_threaded_runtime() {
        let worker = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: storage.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let transfer = FsArtifactTransfer::new(worker.path(), &config);
        fs::write(worker.path().join("big.zip"), vec![7u8; 8 * 1024 * 1024]).unwrap();
        let key = ArtifactKey::new("archives/big.zip");

        transfer.upload("big.zip", &key).await.unwrap();

        assert_eq!(
            fs::metadata(storage.path().join("public/archives/big.zip")).unwrap().len(),
            8 * 1024 * 1024
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails() {
        let worker = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: storage.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let transfer = FsArtifactTransfer::new(worker.path(), &config);
        let err = transfer
            .upload("missing.zip", &ArtifactKey::new("results/x/r1-1.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Transfer(_)));
    }
}
