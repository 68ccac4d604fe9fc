use crate::utils::error::{EnrichError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque reference to bytes held by an [`ArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle(u64);

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:postcode-etl/{}", self.0)
    }
}

/// Holds exportable blobs between a run and its download.
///
/// A handle stays readable until it is released; after that `fetch` fails with
/// [`EnrichError::ArtifactReleased`].
pub trait ArtifactStore: Send + Sync {
    fn acquire(&self, content_type: &str, bytes: Vec<u8>) -> ArtifactHandle;
    fn fetch(&self, handle: &ArtifactHandle) -> Result<Vec<u8>>;
    fn release(&self, handle: &ArtifactHandle);
    fn live_count(&self) -> usize;
}

#[derive(Debug)]
struct Blob {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    next_id: AtomicU64,
    blobs: Mutex<HashMap<u64, Blob>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    // 持有者 panic 後沿用原資料
    fn blobs(&self) -> MutexGuard<'_, HashMap<u64, Blob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn content_type(&self, handle: &ArtifactHandle) -> Option<String> {
        self.blobs().get(&handle.0).map(|b| b.content_type.clone())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn acquire(&self, content_type: &str, bytes: Vec<u8>) -> ArtifactHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.blobs().insert(
            id,
            Blob {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        tracing::debug!("Acquired artifact blob:postcode-etl/{}", id);
        ArtifactHandle(id)
    }

    fn fetch(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        self.blobs()
            .get(&handle.0)
            .map(|b| {
                tracing::debug!("Fetched artifact {} ({})", handle, b.content_type);
                b.bytes.clone()
            })
            .ok_or_else(|| EnrichError::ArtifactReleased {
                handle: handle.to_string(),
            })
    }

    fn release(&self, handle: &ArtifactHandle) {
        if self.blobs().remove(&handle.0).is_some() {
            tracing::debug!("Released artifact {}", handle);
        }
    }

    fn live_count(&self) -> usize {
        self.blobs().len()
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for std::sync::Arc<T> {
    fn acquire(&self, content_type: &str, bytes: Vec<u8>) -> ArtifactHandle {
        (**self).acquire(content_type, bytes)
    }

    fn fetch(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        (**self).fetch(handle)
    }

    fn release(&self, handle: &ArtifactHandle) {
        (**self).release(handle)
    }

    fn live_count(&self) -> usize {
        (**self).live_count()
    }
}

/// A generated file ready to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub handle: ArtifactHandle,
    pub row_count: usize,
}
