//! Object storage seam.
//!
//! The pipeline needs three things from storage: the bytes of a stored
//! object, its tag set, and the ability to replace that tag set. The
//! [`ObjectStore`] trait abstracts over them; [`local::LocalObjectStore`]
//! keeps objects on disk and tags in SQLite. Object-transform handlers read
//! through an [`ObjectSource`] instead, since they only receive a URL.

pub mod local;
pub mod source;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use local::LocalObjectStore;
pub use source::{HttpObjectSource, ObjectSource};

/// Tag marking an object the scanner found sensitive data in.
pub const SENSITIVE_DATA_TAG: &str = "sensitive-data";
/// Tag holding the scanning API's identifier for the object's scan.
pub const NIGHTFALL_ID_TAG: &str = "nightfall-id";

/// A single key-value tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Ordered set of tags attached to an object. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs; a repeated key keeps its last value.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (k, v) in pairs {
            set.insert(k, v);
        }
        set
    }

    /// Insert or overwrite a tag, keeping the original position on overwrite.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|t| t.key == key) {
            Some(tag) => tag.value = value,
            None => self.tags.push(Tag { key, value }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Whether the object was flagged, regardless of the tag's value.
    pub fn is_sensitive(&self) -> bool {
        self.contains_key(SENSITIVE_DATA_TAG)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Storage holding objects and their tags.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full contents of an object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    /// Fetch an object's tags; an untagged object yields an empty set.
    async fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet>;
    /// Replace an object's entire tag set.
    async fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<()>;
}
