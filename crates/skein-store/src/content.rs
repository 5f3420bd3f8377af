//! Content-addressed object storage.
//!
//! Objects are immutable and referenced solely by their [`BlockId`]. Pins are
//! tracked by path (`<root>` or `<root>/<link>`) so that derived files of a
//! data object can be released individually.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use skein_shared::types::BlockId;

use crate::error::ContentError;

/// Put/get for immutable blobs, plus pin management.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store and pin an object, returning its content address.
    async fn put(&self, data: &[u8]) -> Result<BlockId, ContentError>;

    /// Fetch an object by content address.
    async fn get(&self, id: &BlockId) -> Result<Vec<u8>, ContentError>;

    async fn pin(&self, path: &str) -> Result<(), ContentError>;

    async fn unpin(&self, path: &str) -> Result<(), ContentError>;

    async fn is_pinned(&self, path: &str) -> bool;
}

// Pin paths are content addresses optionally followed by link names.
fn validate_pin_path(path: &str) -> Result<(), ContentError> {
    let valid = !path.is_empty()
        && path
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && !seg.contains('\\'));
    if valid {
        Ok(())
    } else {
        Err(ContentError::InvalidPath(path.to_string()))
    }
}

#[derive(Debug, Default)]
struct PinSet(Mutex<HashSet<String>>);

impl PinSet {
    fn lock(&self) -> Result<MutexGuard<'_, HashSet<String>>, ContentError> {
        self.0.lock().map_err(|_| ContentError::Poisoned)
    }

    fn insert(&self, path: &str) -> Result<(), ContentError> {
        validate_pin_path(path)?;
        self.lock()?.insert(path.to_string());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), ContentError> {
        validate_pin_path(path)?;
        self.lock()?.remove(path);
        Ok(())
    }

    fn contains(&self, path: &str) -> bool {
        self.lock().map(|pins| pins.contains(path)).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store. Cloning an `Arc` of it lets several nodes in one
/// process share a content network.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: RwLock<HashMap<BlockId, Vec<u8>>>,
    pins: PinSet,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, data: &[u8]) -> Result<BlockId, ContentError> {
        if data.is_empty() {
            return Err(ContentError::Empty);
        }
        let id = BlockId::for_bytes(data);
        self.objects
            .write()
            .map_err(|_| ContentError::Poisoned)?
            .entry(id.clone())
            .or_insert_with(|| data.to_vec());
        self.pins.insert(id.as_str())?;
        Ok(id)
    }

    async fn get(&self, id: &BlockId) -> Result<Vec<u8>, ContentError> {
        self.objects
            .read()
            .map_err(|_| ContentError::Poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(id.to_string()))
    }

    async fn pin(&self, path: &str) -> Result<(), ContentError> {
        self.pins.insert(path)
    }

    async fn unpin(&self, path: &str) -> Result<(), ContentError> {
        self.pins.remove(path)
    }

    async fn is_pinned(&self, path: &str) -> bool {
        self.pins.contains(path)
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ContentError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ContentError::InvalidPath(target.display().to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ContentError::InvalidPath(target.display().to_string()));
    }
    Ok(resolved)
}

/// Stores each object as a file named by its content address.
#[derive(Debug)]
pub struct FsContentStore {
    base_path: PathBuf,
    max_size: usize,
    pins: PinSet,
}

impl FsContentStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ContentError> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Content store initialized");

        Ok(Self {
            base_path,
            max_size,
            pins: PinSet::default(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn object_path(&self, id: &BlockId) -> Result<PathBuf, ContentError> {
        let name = id.as_str();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ContentError::InvalidPath(name.to_string()));
        }
        ensure_within(&self.base_path, &self.base_path.join(name))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, data: &[u8]) -> Result<BlockId, ContentError> {
        if data.is_empty() {
            return Err(ContentError::Empty);
        }
        if data.len() > self.max_size {
            return Err(ContentError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = BlockId::for_bytes(data);
        let path = self.object_path(&id)?;
        if !path.exists() {
            fs::write(&path, data).await?;
            debug!(id = %id, size = data.len(), "Stored object");
        }
        self.pin(id.as_str()).await?;
        Ok(id)
    }

    async fn get(&self, id: &BlockId) -> Result<Vec<u8>, ContentError> {
        let path = self.object_path(id)?;
        if !path.exists() {
            return Err(ContentError::NotFound(id.to_string()));
        }
        Ok(fs::read(&path).await?)
    }

    async fn pin(&self, path: &str) -> Result<(), ContentError> {
        self.pins.insert(path)
    }

    async fn unpin(&self, path: &str) -> Result<(), ContentError> {
        self.pins.remove(path)?;
        debug!(path = %path, "Unpinned");
        Ok(())
    }

    async fn is_pinned(&self, path: &str) -> bool {
        self.pins.contains(path)
    }
}
