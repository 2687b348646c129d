//! Local fallback store
//!
//! Simulates the document store's read/write/delete/batch-write operations
//! in process memory. A store opened with [`FallbackStore::with_path`] also
//! mirrors its contents to a JSON file so data survives restarts.
//!
//! Files are written atomically (temp file, sync, rename) so the store file
//! is never left half-written.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{DocumentStore, StoreError, StoreResult};
use crate::models::{Collection, PromptItem};

type Contents = HashMap<String, Vec<PromptItem>>;

/// In-process key-value store of record lists
#[derive(Debug, Default)]
pub struct FallbackStore {
    contents: Mutex<Contents>,
    /// File the contents are mirrored to, if any
    path: Option<PathBuf>,
}

impl FallbackStore {
    /// Create an empty, memory-only store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store mirrored to `path`, loading it if it exists
    pub fn with_path(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let contents = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|e| StoreError::from_io(e, &path))?;
            serde_json::from_str(&json)?
        } else {
            Contents::new()
        };

        debug!("Opened fallback store at {:?}", path);
        Ok(Self {
            contents: Mutex::new(contents),
            path: Some(path),
        })
    }

    /// File backing this store, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current contents under `key`, or an empty list
    pub async fn get(&self, key: &str) -> StoreResult<Vec<PromptItem>> {
        Ok(self.lock().get(key).cloned().unwrap_or_default())
    }

    /// Replace the list under `key`
    pub async fn set(&self, key: &str, items: Vec<PromptItem>) -> StoreResult<()> {
        self.update(|contents| {
            contents.insert(key.to_string(), items);
        })
    }

    /// Insert `item`, replacing an existing record with the same id in place
    pub async fn add(&self, key: &str, item: PromptItem) -> StoreResult<()> {
        self.update(|contents| {
            let items = contents.entry(key.to_string()).or_default();
            match items.iter().position(|existing| existing.id == item.id) {
                Some(index) => items[index] = item,
                None => items.push(item),
            }
        })
    }

    /// Remove every record with `id` under `key`
    pub async fn delete(&self, key: &str, id: &str) -> StoreResult<()> {
        self.update(|contents| {
            if let Some(items) = contents.get_mut(key) {
                items.retain(|item| item.id != id);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Contents> {
        self.contents.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `change` to a copy, persist the copy, then publish it
    ///
    /// A failed write leaves both memory and file as they were.
    fn update(&self, change: impl FnOnce(&mut Contents)) -> StoreResult<()> {
        let mut contents = self.lock();
        let mut next = contents.clone();
        change(&mut next);
        self.persist(&next)?;
        *contents = next;
        Ok(())
    }

    fn persist(&self, contents: &Contents) -> StoreResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(contents)?;
        atomic_write(path, &json)
    }
}

#[async_trait]
impl DocumentStore for FallbackStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<PromptItem>> {
        self.get(collection.name()).await
    }

    async fn put(&self, collection: Collection, item: &PromptItem) -> StoreResult<()> {
        self.add(collection.name(), item.clone()).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        FallbackStore::delete(self, collection.name(), id).await
    }

    async fn replace_all(&self, collection: Collection, items: &[PromptItem]) -> StoreResult<()> {
        self.set(collection.name(), items.to_vec()).await
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path).map_err(|e| StoreError::from_io(e, &temp_path))?;
    file.write_all(data)
        .map_err(|e| StoreError::from_io(e, &temp_path))?;
    file.sync_all()
        .map_err(|e| StoreError::from_io(e, &temp_path))?;

    fs::rename(&temp_path, path).map_err(|e| StoreError::from_io(e, path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "promptItems";

    fn item(id: &str, label: &str) -> PromptItem {
        PromptItem::with_id(id, label, format!("{} prompt", label))
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let store = FallbackStore::new();
        assert!(store.get(KEY).await.unwrap().is_empty());
        assert!(store.path().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_contents() {
        let store = FallbackStore::new();
        store
            .set(KEY, vec![item("1", "One"), item("2", "Two")])
            .await
            .unwrap();
        store.set(KEY, vec![item("3", "Three")]).await.unwrap();

        let items = store.get(KEY).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "3");
    }

    #[tokio::test]
    async fn test_add_upserts_in_place() {
        let store = FallbackStore::new();
        store.add(KEY, item("1", "One")).await.unwrap();
        store.add(KEY, item("2", "Two")).await.unwrap();
        store.add(KEY, item("1", "Uno")).await.unwrap();

        let items = store.get(KEY).await.unwrap();
        assert_eq!(items.len(), 2);
        // Replaced record keeps its position
        assert_eq!(items[0].id, "1");
        assert_eq!(items[0].label, "Uno");
        assert_eq!(items[1].id, "2");
    }

    #[tokio::test]
    async fn test_delete_filters_by_id() {
        let store = FallbackStore::new();
        store
            .set(KEY, vec![item("1", "One"), item("2", "Two")])
            .await
            .unwrap();

        store.delete(KEY, "1").await.unwrap();
        let items = store.get(KEY).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "2");

        // Unknown id and unknown key are no-ops
        store.delete(KEY, "missing").await.unwrap();
        store.delete("other", "2").await.unwrap();
        assert_eq!(store.get(KEY).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = FallbackStore::new();
        store
            .put(Collection::PromptButtons, &item("1", "Button"))
            .await
            .unwrap();
        store
            .put(Collection::Topics, &item("1", "Topic"))
            .await
            .unwrap();

        let buttons = store.list(Collection::PromptButtons).await.unwrap();
        let topics = store.list(Collection::Topics).await.unwrap();
        assert_eq!(buttons[0].label, "Button");
        assert_eq!(topics[0].label, "Topic");
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("fallback_store.json");

        {
            let store = FallbackStore::with_path(&path).unwrap();
            store
                .replace_all(
                    Collection::Topics,
                    &[item("1", "One"), item("2", "Two")],
                )
                .await
                .unwrap();
            DocumentStore::delete(&store, Collection::Topics, "1")
                .await
                .unwrap();
        }

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let store = FallbackStore::with_path(&path).unwrap();
        let items = store.list(Collection::Topics).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "Two");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_contents_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        // The parent of the store file is a regular file, so no write can land
        let store = FallbackStore::with_path(blocker.join("fallback_store.json")).unwrap();

        let err = store.add(KEY, item("1", "One")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.get(KEY).await.unwrap().is_empty());

        assert!(store.set(KEY, vec![item("2", "Two")]).await.is_err());
        assert!(store.get(KEY).await.unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fallback_store.json");
        fs::write(&path, "not json").unwrap();

        let err = FallbackStore::with_path(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
