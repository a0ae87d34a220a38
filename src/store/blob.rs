//! Blob storage for raw and synthesized events

use crate::error::{LineageError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Path prefix of the host runtime's own bookkeeping blobs
const CONTROL_CONTAINER: &str = "azure-webjobs-hosts";

/// Read/write/list access to named blobs grouped in containers.
pub trait BlobStore: Send + Sync {
    fn read(&self, container: &str, name: &str) -> Result<Vec<u8>>;

    /// Overwrites an existing blob of the same name
    fn write(&self, container: &str, name: &str, bytes: &[u8]) -> Result<()>;

    /// Names under `prefix`, sorted lexicographically
    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>>;
}

/// `(container, name)` address of a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub container: String,
    pub name: String,
}

impl BlobRef {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Split a blob URL (`https://account.host/container/some/name.json`).
    pub fn from_url(url: &str) -> Result<Self> {
        let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        let path = without_scheme
            .split_once('/')
            .map(|(_, path)| path)
            .ok_or_else(|| LineageError::Blob(format!("blob URL has no path: {}", url)))?;
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let (container, name) = path
            .split_once('/')
            .filter(|(c, n)| !c.is_empty() && !n.is_empty())
            .ok_or_else(|| LineageError::Blob(format!("blob URL has no container/name: {}", url)))?;

        if container == CONTROL_CONTAINER {
            return Err(LineageError::Blob(format!("control-path blob is not a lineage event: {}", url)));
        }
        Ok(Self::new(container, name))
    }
}

fn check_segment(value: &str, what: &str) -> Result<()> {
    let path = Path::new(value);
    let escapes = path.components().any(|c| !matches!(c, Component::Normal(_)));
    if value.is_empty() || escapes {
        return Err(LineageError::Blob(format!("invalid blob {} '{}'", what, value)));
    }
    Ok(())
}

/// One directory per container under `root`
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf> {
        check_segment(container, "container")?;
        Ok(self.root.join(container))
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        check_segment(name, "name")?;
        Ok(self.container_dir(container)?.join(name))
    }

    fn collect(dir: &Path, relative: &str, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let name = if relative.is_empty() {
                file_name
            } else {
                format!("{}/{}", relative, file_name)
            };
            if entry.file_type()?.is_dir() {
                Self::collect(&entry.path(), &name, out)?;
            } else {
                out.push(name);
            }
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(container, name)?;
        fs::read(&path).map_err(|e| LineageError::Blob(format!("cannot read {}/{}: {}", container, name, e)))
    }

    fn write(&self, container: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(container, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes).map_err(|e| LineageError::Blob(format!("cannot write {}/{}: {}", container, name, e)))
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(LineageError::Blob(format!("container '{}' does not exist", container)));
        }
        let mut names = Vec::new();
        Self::collect(&dir, "", &mut names)?;
        names.retain(|n| n.starts_with(prefix));
        names.sort();
        Ok(names)
    }
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| LineageError::Blob("blob map lock poisoned".to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LineageError::Blob(format!("blob {}/{} not found", container, name)))
    }

    fn write(&self, container: &str, name: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?
            .insert((container.to_string(), name.to_string()), bytes.to_vec());
        Ok(())
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|(c, n)| c == container && n.starts_with(prefix))
            .map(|(_, n)| n.clone())
            .collect())
    }
}
