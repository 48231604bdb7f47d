mod blobs;
mod janitor;

pub use blobs::{Blob, BlobRegistry};
pub use janitor::ResourceJanitor;

use serde::{Deserialize, Serialize};

/// Scheme prefix of references allocated in-process.
pub const LOCAL_SCHEME_PREFIX: &str = "blob:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_local(&self) -> bool {
        is_local_reference(&self.0)
    }
}

impl From<&str> for ResourceHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_local_reference(reference: &str) -> bool {
    reference.trim_start().starts_with(LOCAL_SCHEME_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::{is_local_reference, ResourceHandle};

    #[test]
    fn local_handles_are_detected_by_scheme_prefix() {
        assert!(ResourceHandle::from("blob:strata/abc").is_local());
        assert!(!ResourceHandle::from("https://cdn.example/out.png").is_local());
        assert!(!ResourceHandle::from("data:image/png;base64,AAAA").is_local());
        assert!(!is_local_reference("BLOBS/ignored"));
    }
}
