use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use super::{ResourceHandle, LOCAL_SCHEME_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// In-process allocator for `blob:` handles.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<Mutex<HashMap<String, Blob>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, bytes: Vec<u8>, mime_type: impl Into<String>) -> ResourceHandle {
        let handle = format!("{LOCAL_SCHEME_PREFIX}strata/{}", Uuid::new_v4());
        self.table().insert(
            handle.clone(),
            Blob {
                bytes,
                mime_type: mime_type.into(),
            },
        );
        ResourceHandle::new(handle)
    }

    pub fn resolve(&self, handle: &ResourceHandle) -> Option<Blob> {
        self.table().get(handle.as_str()).cloned()
    }

    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.table().contains_key(handle.as_str())
    }

    /// Returns `false` when the handle was unknown or already revoked.
    pub fn revoke(&self, handle: &ResourceHandle) -> bool {
        self.table().remove(handle.as_str()).is_some()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Blob>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::BlobRegistry;

    #[test]
    fn allocate_resolve_revoke() {
        let blobs = BlobRegistry::new();
        let handle = blobs.allocate(vec![1, 2, 3], "image/png");
        assert!(handle.is_local());
        assert!(handle.as_str().starts_with("blob:strata/"));

        let blob = blobs.resolve(&handle);
        assert_eq!(blob.map(|blob| blob.bytes), Some(vec![1, 2, 3]));

        assert!(blobs.revoke(&handle));
        assert!(!blobs.revoke(&handle));
        assert!(blobs.resolve(&handle).is_none());
        assert!(blobs.is_empty());
    }

    #[test]
    fn clones_share_the_table() {
        let blobs = BlobRegistry::new();
        let other = blobs.clone();
        let handle = blobs.allocate(Vec::new(), "image/jpeg");
        assert!(other.contains(&handle));
        assert_eq!(other.len(), 1);
    }
}
