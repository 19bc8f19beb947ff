//! Blob store: locally addressable copies of archive bytes.
//!
//! A [`BlobHandle`] is the URL a rendering surface uses to reach bytes that
//! were extracted from the archive (`/_blob/<hex>`). Handles are content
//! addressed over the MIME type and the bytes, so inserting the same bytes
//! twice under one type yields equal handles.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// URL prefix of every blob handle.
pub const BLOB_PREFIX: &str = "/_blob/";

/// Hex digits of the blake3 digest kept in a handle.
const ID_LEN: usize = 32;

/// Cheaply clonable reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle(Arc<str>);

impl BlobHandle {
    fn for_content(mimetype: &str, bytes: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(mimetype.as_bytes());
        hasher.update(&[0]);
        hasher.update(bytes);
        let digest = hasher.finalize();
        let hex = hex::encode(digest.as_bytes());
        Self(Arc::from(format!("{BLOB_PREFIX}{}", &hex[..ID_LEN])))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex id without the URL prefix.
    pub fn id(&self) -> &str {
        self.0.strip_prefix(BLOB_PREFIX).unwrap_or(&self.0)
    }

    /// Whether both handles share one allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored bytes with their MIME type.
#[derive(Debug, Clone)]
pub struct Blob {
    pub mimetype: String,
    pub bytes: Arc<[u8]>,
}

/// Concurrent map from handle to bytes. One store per session.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: DashMap<BlobHandle, Blob>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes and return their handle. Re-inserting equal bytes with
    /// the same MIME type keeps the first copy.
    pub fn insert(&self, mimetype: &str, bytes: Vec<u8>) -> BlobHandle {
        let handle = BlobHandle::for_content(mimetype, &bytes);
        self.blobs.entry(handle.clone()).or_insert_with(|| Blob {
            mimetype: mimetype.to_string(),
            bytes: Arc::from(bytes),
        });
        handle
    }

    /// Look up by handle URL (`/_blob/<hex>`).
    pub fn get(&self, url: &str) -> Option<Blob> {
        let key = BlobHandle(Arc::from(url));
        self.blobs.get(&key).map(|blob| blob.value().clone())
    }

    /// Snapshot of all stored blobs, for export.
    pub fn entries(&self) -> Vec<(BlobHandle, Blob)> {
        self.blobs
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_shape() {
        let store = BlobStore::new();
        let handle = store.insert("text/css", b"body{}".to_vec());
        assert!(handle.as_str().starts_with(BLOB_PREFIX));
        assert_eq!(handle.id().len(), ID_LEN);
    }

    #[test]
    fn test_content_addressed() {
        let store = BlobStore::new();
        let a = store.insert("image/png", vec![1, 2, 3]);
        let b = store.insert("image/png", vec![1, 2, 3]);
        let c = store.insert("image/png", vec![3, 2, 1]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_same_bytes_under_two_types() {
        let store = BlobStore::new();
        let svg = store.insert("image/svg+xml", b"<svg/>".to_vec());
        let text = store.insert("text/plain", b"<svg/>".to_vec());
        assert_ne!(svg, text);
        assert_eq!(store.get(svg.as_str()).unwrap().mimetype, "image/svg+xml");
        assert_eq!(store.get(text.as_str()).unwrap().mimetype, "text/plain");
    }

    #[test]
    fn test_get() {
        let store = BlobStore::new();
        let handle = store.insert("text/css", b"p{}".to_vec());
        let blob = store.get(handle.as_str()).unwrap();
        assert_eq!(blob.mimetype, "text/css");
        assert_eq!(&*blob.bytes, b"p{}");
        assert!(store.get("/_blob/nothing").is_none());
    }

    #[test]
    fn test_ptr_eq_on_clone() {
        let store = BlobStore::new();
        let handle = store.insert("text/css", b"a{}".to_vec());
        let clone = handle.clone();
        assert!(handle.ptr_eq(&clone));

        let again = store.insert("text/css", b"a{}".to_vec());
        assert_eq!(handle, again);
        assert!(!handle.ptr_eq(&again));
    }
}
