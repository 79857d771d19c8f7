//! Storage port for wizard progress, plus the file-backed implementation
//! used by the CLI so progress survives between invocations.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tenant_core::{TenantError, TenantResult};
use tracing::debug;

/// Key/value storage holding one serialized blob per wizard instance.
/// Single writer, single reader; no concurrency control is expected.
#[async_trait]
pub trait SelectionStorage: Send + Sync {
    async fn get(&self, key: &str) -> TenantResult<Option<String>>;
    async fn set(&self, key: &str, value: String) -> TenantResult<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> TenantResult<()>;
}

/// One JSON file per key under a state directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait]
impl SelectionStorage for FileStorage {
    async fn get(&self, key: &str) -> TenantResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TenantError::Io(e)),
        }
    }

    async fn set(&self, key: &str, value: String) -> TenantResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Wizard state written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> TenantResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TenantError::Io(e)),
        }
    }
}
