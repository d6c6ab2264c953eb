use std::path::{Component, Path, PathBuf};

use crate::error::{DlpGateError, Result};
use crate::store::DbPool;

use super::{ObjectStore, TagSet};

/// Filesystem-backed object store.
///
/// Each bucket is a directory under `root`; keys are relative paths inside it.
/// Tags live in the `object_tags` table of the shared database.
#[derive(Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    pool: DbPool,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, pool: DbPool) -> Self {
        Self {
            root: root.into(),
            pool,
        }
    }

    /// Write an object, creating intermediate directories.
    pub async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    /// Resolve `bucket/key` under the root, refusing anything that would escape it.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let not_found = || DlpGateError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            if part.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
                return Err(not_found());
            }
            path.push(rel);
        }
        Ok(path)
    }

    async fn ensure_exists(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            Ok(())
        } else {
            Err(DlpGateError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DlpGateError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet> {
        self.ensure_exists(bucket, key).await?;
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT tag_key, tag_value FROM object_tags
             WHERE bucket = ?1 AND key = ?2 ORDER BY position",
        )?;
        let rows = stmt.query_map(rusqlite::params![bucket, key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut tags = TagSet::new();
        for row in rows {
            let (k, v) = row?;
            tags.insert(k, v);
        }
        Ok(tags)
    }

    async fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<()> {
        self.ensure_exists(bucket, key).await?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM object_tags WHERE bucket = ?1 AND key = ?2",
            rusqlite::params![bucket, key],
        )?;
        for (position, tag) in tags.iter().enumerate() {
            tx.execute(
                "INSERT INTO object_tags (bucket, key, position, tag_key, tag_value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![bucket, key, position as i64, tag.key, tag.value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{NIGHTFALL_ID_TAG, SENSITIVE_DATA_TAG};
    use crate::store::open_memory_pool;

    fn store() -> (LocalObjectStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), open_memory_pool().unwrap());
        (store, dir)
    }

    #[tokio::test]
    async fn put_and_get_object() {
        let (store, _dir) = store();
        store.put_object("inbox", "nested/doc.txt", b"hello").await.unwrap();
        let data = store.get_object("inbox", "nested/doc.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (store, _dir) = store();
        let err = store.get_object("inbox", "nope.txt").await.unwrap_err();
        assert!(matches!(err, DlpGateError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let (store, _dir) = store();
        for key in ["../escape.txt", "/etc/passwd", "a/../../b", ""] {
            let err = store.get_object("inbox", key).await.unwrap_err();
            assert!(matches!(err, DlpGateError::ObjectNotFound { .. }), "{key}");
        }
    }

    #[tokio::test]
    async fn untagged_object_has_empty_set() {
        let (store, _dir) = store();
        store.put_object("inbox", "a.txt", b"x").await.unwrap();
        assert!(store.get_tags("inbox", "a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_tags_replaces_whole_set() {
        let (store, _dir) = store();
        store.put_object("inbox", "a.txt", b"x").await.unwrap();

        let first = TagSet::from_pairs([(NIGHTFALL_ID_TAG, "scan-1"), ("owner", "ops")]);
        store.put_tags("inbox", "a.txt", &first).await.unwrap();

        let second = TagSet::from_pairs([(SENSITIVE_DATA_TAG, "True"), (NIGHTFALL_ID_TAG, "scan-1")]);
        store.put_tags("inbox", "a.txt", &second).await.unwrap();

        let tags = store.get_tags("inbox", "a.txt").await.unwrap();
        assert_eq!(tags, second);
        assert!(!tags.contains_key("owner"));
    }

    #[tokio::test]
    async fn tags_are_scoped_per_object() {
        let (store, _dir) = store();
        store.put_object("inbox", "a.txt", b"x").await.unwrap();
        store.put_object("inbox", "b.txt", b"y").await.unwrap();
        store
            .put_tags("inbox", "a.txt", &TagSet::from_pairs([(SENSITIVE_DATA_TAG, "True")]))
            .await
            .unwrap();
        assert!(!store.get_tags("inbox", "b.txt").await.unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn tagging_missing_object_fails() {
        let (store, _dir) = store();
        let err = store
            .put_tags("inbox", "ghost.txt", &TagSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DlpGateError::ObjectNotFound { .. }));
    }
}
