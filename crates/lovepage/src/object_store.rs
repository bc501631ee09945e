//! Binary object storage behind a small trait: exists / copy / delete /
//! make-public. The asset promoter is the only writer.
//!
//! Two backends: DashMap for tests, and a filesystem tree for deployments
//! where a directory served by a static file server is the public area.

use dashmap::DashMap;
use std::path::{Path, PathBuf};

use crate::error::LovepageError;

pub trait ObjectStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, LovepageError>;

    /// Copy the object at `from` to `to`. Missing source is
    /// [`LovepageError::ObjectNotFound`] — the promoter relies on
    /// distinguishing it from other failures.
    fn copy(&self, from: &str, to: &str) -> Result<(), LovepageError>;

    fn delete(&self, key: &str) -> Result<(), LovepageError>;

    /// Mark the object publicly readable and return its public URL.
    fn make_public(&self, key: &str) -> Result<String, LovepageError>;
}

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    public: bool,
}

/// In-memory object store. Objects are seeded with [`InMemoryObjectStore::put`].
pub struct InMemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    public_base_url: String,
}

impl InMemoryObjectStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn put(&self, key: &str, data: &[u8]) {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                public: false,
            },
        );
    }

    pub fn is_public(&self, key: &str) -> bool {
        self.objects.get(key).map(|o| o.public).unwrap_or(false)
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn exists(&self, key: &str) -> Result<bool, LovepageError> {
        Ok(self.objects.contains_key(key))
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), LovepageError> {
        let data = self
            .objects
            .get(from)
            .map(|o| o.data.clone())
            .ok_or_else(|| LovepageError::ObjectNotFound(from.to_string()))?;
        self.objects.insert(
            to.to_string(),
            StoredObject {
                data,
                public: false,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), LovepageError> {
        self.objects.remove(key);
        Ok(())
    }

    fn make_public(&self, key: &str) -> Result<String, LovepageError> {
        let mut object = self
            .objects
            .get_mut(key)
            .ok_or_else(|| LovepageError::ObjectNotFound(key.to_string()))?;
        object.public = true;
        Ok(self.url_for(key))
    }
}

/// Filesystem-backed object store rooted at a directory. Keys map to
/// relative paths; everything under the root is assumed to be served at
/// `public_base_url`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Reject keys that would escape the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, LovepageError> {
        if key.is_empty()
            || Path::new(key)
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(LovepageError::Validation(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(key))
    }

    fn map_io(key: &str, e: std::io::Error) -> LovepageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            LovepageError::ObjectNotFound(key.to_string())
        } else {
            LovepageError::Storage(format!("object {key}: {e}"))
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn exists(&self, key: &str) -> Result<bool, LovepageError> {
        Ok(self.resolve(key)?.is_file())
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), LovepageError> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::map_io(to, e))?;
        }
        std::fs::copy(&src, &dst).map_err(|e| Self::map_io(from, e))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), LovepageError> {
        match std::fs::remove_file(self.resolve(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io(key, e)),
        }
    }

    fn make_public(&self, key: &str) -> Result<String, LovepageError> {
        if !self.exists(key)? {
            return Err(LovepageError::ObjectNotFound(key.to_string()));
        }
        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_copy_delete_roundtrip() {
        let store = InMemoryObjectStore::new("https://cdn.test");
        store.put("temp/u1/a.jpg", b"bytes");

        store.copy("temp/u1/a.jpg", "perm/P1/gallery/a.jpg").unwrap();
        assert!(store.exists("perm/P1/gallery/a.jpg").unwrap());

        let url = store.make_public("perm/P1/gallery/a.jpg").unwrap();
        assert_eq!(url, "https://cdn.test/perm/P1/gallery/a.jpg");
        assert!(store.is_public("perm/P1/gallery/a.jpg"));

        store.delete("temp/u1/a.jpg").unwrap();
        assert!(!store.exists("temp/u1/a.jpg").unwrap());
    }

    #[test]
    fn copy_of_missing_source_is_not_found() {
        let store = InMemoryObjectStore::new("https://cdn.test");
        let err = store.copy("temp/none", "perm/x").unwrap_err();
        assert!(matches!(err, LovepageError::ObjectNotFound(_)));
    }

    #[test]
    fn local_store_copies_within_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "https://cdn.test");

        std::fs::create_dir_all(dir.path().join("temp/u1")).unwrap();
        std::fs::write(dir.path().join("temp/u1/a.jpg"), b"bytes").unwrap();

        store.copy("temp/u1/a.jpg", "perm/P1/gallery/a.jpg").unwrap();
        assert!(store.exists("perm/P1/gallery/a.jpg").unwrap());
        assert_eq!(
            store.make_public("perm/P1/gallery/a.jpg").unwrap(),
            "https://cdn.test/perm/P1/gallery/a.jpg"
        );

        store.delete("temp/u1/a.jpg").unwrap();
        assert!(!store.exists("temp/u1/a.jpg").unwrap());
        // Deleting again is fine.
        store.delete("temp/u1/a.jpg").unwrap();
    }

    #[test]
    fn local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "https://cdn.test");
        assert!(matches!(
            store.exists("../outside"),
            Err(LovepageError::Validation(_))
        ));
        assert!(matches!(
            store.exists("/absolute"),
            Err(LovepageError::Validation(_))
        ));
    }
}
