//! Direct-fetch URL table for stored documents.
//!
//! Maps a document id to the stored file served at `/document/view/{id}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const VIEW_PREFIX: &str = "/document/view/";

pub fn view_url(id: &str) -> String {
    format!("{}{}", VIEW_PREFIX, id)
}

/// Shared, cloneable route table.
#[derive(Clone, Default)]
pub struct ViewRoutes {
    inner: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl ViewRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-points) the route and returns its URL.
    pub fn register(&self, id: &str, path: &Path) -> String {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(id.to_string(), path.to_path_buf());
        view_url(id)
    }

    pub fn unregister(&self, id: &str) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(id);
    }

    pub fn resolve(&self, id: &str) -> Option<PathBuf> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_resolve_unregister() {
        let routes = ViewRoutes::new();
        let url = routes.register("abc", Path::new("/docs/a.pdf"));
        assert_eq!(url, "/document/view/abc");
        assert_eq!(routes.resolve("abc"), Some(PathBuf::from("/docs/a.pdf")));

        let clone = routes.clone();
        clone.unregister("abc");
        assert!(routes.resolve("abc").is_none());
        assert!(routes.is_empty());
    }
}
