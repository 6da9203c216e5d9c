//! Local preview handles
//!
//! Every queued file gets one `preview://<id>/<name>` handle so a front end
//! can render it before upload. Handles are tracked so they can be released
//! when the item goes away; nothing is leaked past the owning queue.

use parking_lot::Mutex;
use std::collections::HashSet;

const SCHEME: &str = "preview://";

/// Tracks live preview handles
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    live: Mutex<HashSet<String>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a queued file
    pub fn allocate(&self, id: &str, file_name: &str) -> String {
        let url = format!("{}{}/{}", SCHEME, id, file_name);
        self.live.lock().insert(url.clone());
        url
    }

    /// Release one handle; returns false if it was not live
    pub fn revoke(&self, url: &str) -> bool {
        self.live.lock().remove(url)
    }

    /// Release every handle
    pub fn revoke_all(&self) -> usize {
        let mut live = self.live.lock();
        let count = live.len();
        live.clear();
        count
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live.lock().contains(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
