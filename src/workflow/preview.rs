// src/workflow/preview.rs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

/// Issues local-only preview handles and tracks how many are live, so a
/// handle that was never released shows up as a leak.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<AtomicUsize>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, file_name: &str) -> PreviewHandle {
        self.live.fetch_add(1, Ordering::SeqCst);
        PreviewHandle {
            url: format!("preview://{}/{}", Uuid::new_v4().simple(), file_name),
            live: Arc::clone(&self.live),
            revoked: false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Display handle for a selected image. Never sent to any server; released
/// when the selection changes or the workflow resets, and on drop.
pub struct PreviewHandle {
    url: String,
    live: Arc<AtomicUsize>,
    revoked: bool,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn revoke(&mut self) {
        if !self.revoked {
            self.revoked = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("url", &self.url)
            .field("revoked", &self.revoked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_release_on_revoke_and_drop() {
        let registry = PreviewRegistry::new();
        let mut first = registry.create("a.jpg");
        let second = registry.create("b.jpg");
        assert_eq!(registry.live_count(), 2);

        first.revoke();
        first.revoke(); // idempotent
        assert_eq!(registry.live_count(), 1);

        drop(second);
        assert_eq!(registry.live_count(), 0);

        drop(first); // already revoked; must not underflow
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn urls_are_unique_per_handle() {
        let registry = PreviewRegistry::new();
        let a = registry.create("same.jpg");
        let b = registry.create("same.jpg");
        assert_ne!(a.url(), b.url());
    }
}
