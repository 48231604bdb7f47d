use super::{BlobRegistry, ResourceHandle};

/// Releases locally allocated handles before the references to them are dropped.
///
/// Remote references (URLs, data URIs) are not owned here and are skipped.
#[derive(Debug, Clone)]
pub struct ResourceJanitor {
    blobs: BlobRegistry,
}

impl ResourceJanitor {
    pub fn new(blobs: BlobRegistry) -> Self {
        Self { blobs }
    }

    /// Returns how many handles were actually released. Unknown or already
    /// released handles are ignored.
    pub fn release<I, H>(&self, handles: I) -> usize
    where
        I: IntoIterator<Item = H>,
        H: Into<ResourceHandle>,
    {
        handles
            .into_iter()
            .map(Into::into)
            .filter(ResourceHandle::is_local)
            .filter(|handle| self.blobs.revoke(handle))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use crate::resources::BlobRegistry;

    use super::ResourceJanitor;

    #[test]
    fn release_revokes_only_local_handles() {
        let blobs = BlobRegistry::new();
        let local = blobs.allocate(vec![0xff], "image/png");
        let kept = blobs.allocate(vec![0x00], "image/png");
        let janitor = ResourceJanitor::new(blobs.clone());

        let released = janitor.release(vec![
            local.as_str().to_string(),
            "https://cdn.example/out.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
        ]);

        assert_eq!(released, 1);
        assert!(!blobs.contains(&local));
        assert!(blobs.contains(&kept));
    }

    #[test]
    fn release_is_safe_on_empty_and_repeated_input() {
        let blobs = BlobRegistry::new();
        let handle = blobs.allocate(vec![1], "image/png");
        let janitor = ResourceJanitor::new(blobs.clone());

        assert_eq!(janitor.release(Vec::<String>::new()), 0);
        assert_eq!(janitor.release([handle.clone()]), 1);
        assert_eq!(janitor.release([handle.clone(), handle]), 0);
        assert!(blobs.is_empty());
    }
}
