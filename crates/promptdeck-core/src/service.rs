//! Prompt persistence service
//!
//! The `PromptService` is the uniform CRUD entry point for one collection of
//! prompt records. Every call is routed to either the hosted document store
//! or the local fallback store, based on the [`StoreSettings`] the service
//! was built with.
//!
//! ## Failure semantics
//!
//! - Reads fail soft: if the remote store cannot be read, `get_all` logs the
//!   error and returns the default records instead.
//! - Writes fail loud: `save_one`, `delete_one`, `save_all` and
//!   `initialize_defaults` return the store error to the caller.
//!
//! Every store call is raced against the configured timeout.
//!
//! ## Usage
//!
//! ```ignore
//! let service = PromptService::from_config(&config, Collection::PromptButtons)?;
//! service.initialize_defaults().await?;
//!
//! let mut item = PromptItem::new("Translate", "Translate this story");
//! service.save_one(item.clone()).await?;
//! let items = service.get_all().await;
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, StoreSettings};
use crate::models::{default_prompt_items, sort_by_order, Collection, PromptItem};
use crate::store::{DocumentStore, FallbackStore, FirestoreStore, StoreError, StoreResult};

/// Outcome of a connection check
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Backend that answered
    pub backend: &'static str,
    /// Collection that was read
    pub collection: Collection,
    /// Number of records found
    pub records: usize,
}

/// CRUD service for one collection of prompt records
pub struct PromptService {
    collection: Collection,
    settings: StoreSettings,
    /// Hosted document store, absent when never configured
    remote: Option<Arc<dyn DocumentStore>>,
    /// Local store used when `settings.use_fallback` is set
    fallback: Arc<FallbackStore>,
}

impl PromptService {
    /// Create a service over explicitly constructed stores
    pub fn new(
        collection: Collection,
        settings: StoreSettings,
        remote: Option<Arc<dyn DocumentStore>>,
        fallback: Arc<FallbackStore>,
    ) -> Self {
        Self {
            collection,
            settings,
            remote,
            fallback,
        }
    }

    /// Create a service backed only by a memory fallback store
    pub fn in_memory(collection: Collection) -> Self {
        Self::new(
            collection,
            StoreSettings::fallback(),
            None,
            Arc::new(FallbackStore::new()),
        )
    }

    /// Build the stores described by `config`
    ///
    /// The fallback store is mirrored to `config.fallback_store_path()`.
    /// A Firestore client is only created when real credentials are present.
    pub fn from_config(config: &Config, collection: Collection) -> anyhow::Result<Self> {
        use anyhow::Context;

        let fallback = FallbackStore::with_path(config.fallback_store_path())
            .context("Failed to open local fallback store")?;

        let remote: Option<Arc<dyn DocumentStore>> = if config.firebase.is_configured() {
            let store = FirestoreStore::from_config(&config.firebase)
                .context("Failed to create Firestore client")?;
            Some(Arc::new(store))
        } else {
            None
        };

        Ok(Self::new(
            collection,
            config.store_settings(),
            remote,
            Arc::new(fallback),
        ))
    }

    /// The collection this service reads and writes
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Current routing and timeout settings
    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    /// Whether calls are currently served by the local fallback store
    pub fn uses_fallback(&self) -> bool {
        self.settings.use_fallback || self.remote.is_none()
    }

    /// Name of the backend serving calls
    pub fn backend_name(&self) -> &'static str {
        self.store().backend_name()
    }

    /// Replace the routing decision, e.g. after configuration changed
    pub fn reconfigure(&mut self, settings: StoreSettings) {
        info!(
            "Reconfiguring {} service: use_fallback={}",
            self.collection, settings.use_fallback
        );
        self.settings = settings;
    }

    /// Pick the store for the next call
    fn store(&self) -> &dyn DocumentStore {
        match self.remote {
            Some(ref remote) if !self.settings.use_fallback => remote.as_ref(),
            _ => self.fallback.as_ref(),
        }
    }

    /// Run a store call under the configured timeout
    async fn timed<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        let timeout = self.settings.timeout;
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(timeout)))
    }

    /// All records, ordered by `order` where present
    ///
    /// Never fails: a read error substitutes the default records (remote
    /// store) or an empty list (fallback store).
    pub async fn get_all(&self) -> Vec<PromptItem> {
        let store = self.store();
        debug!("Reading {} from {}", self.collection, store.backend_name());

        match self.timed(store.list(self.collection)).await {
            Ok(mut items) => {
                sort_by_order(&mut items);
                items
            }
            Err(e) if self.uses_fallback() => {
                warn!("Failed to read {} from local store: {}", self.collection, e);
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "Failed to read {} from {}, using defaults: {}",
                    self.collection,
                    store.backend_name(),
                    e
                );
                default_prompt_items()
            }
        }
    }

    /// Create or overwrite a record by id
    ///
    /// A missing color is stored as the default color.
    pub async fn save_one(&self, item: PromptItem) -> StoreResult<()> {
        let item = item.with_default_color();
        let store = self.store();
        debug!("Saving {} '{}' to {}", self.collection, item.id, store.backend_name());

        self.timed(store.put(self.collection, &item))
            .await
            .inspect_err(|e| error!("Error saving {} '{}': {}", self.collection, item.id, e))
    }

    /// Delete a record by id; unknown ids are ignored
    pub async fn delete_one(&self, id: &str) -> StoreResult<()> {
        let store = self.store();
        debug!("Deleting {} '{}' from {}", self.collection, id, store.backend_name());

        self.timed(store.delete(self.collection, id))
            .await
            .inspect_err(|e| error!("Error deleting {} '{}': {}", self.collection, id, e))
    }

    /// Replace the whole collection with `items`, in the given order
    ///
    /// Each record's `order` is rewritten to its position in `items`.
    pub async fn save_all(&self, items: Vec<PromptItem>) -> StoreResult<()> {
        let items: Vec<PromptItem> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let mut item = item.with_default_color();
                item.order = Some(index as u32);
                item
            })
            .collect();

        let store = self.store();
        info!(
            "Replacing {} with {} records on {}",
            self.collection,
            items.len(),
            store.backend_name()
        );

        self.timed(store.replace_all(self.collection, &items))
            .await
            .inspect_err(|e| error!("Error saving all {}: {}", self.collection, e))
    }

    /// Seed the default records if the collection is empty
    ///
    /// Returns `true` when the defaults were written.
    pub async fn initialize_defaults(&self) -> StoreResult<bool> {
        if !self.get_all().await.is_empty() {
            return Ok(false);
        }

        info!("Initializing {} with default records", self.collection);
        self.save_all(default_prompt_items()).await?;
        Ok(true)
    }

    /// Read the routed store once, propagating any error
    pub async fn check_connection(&self) -> StoreResult<ConnectionReport> {
        let store = self.store();
        let items = self.timed(store.list(self.collection)).await?;
        Ok(ConnectionReport {
            backend: store.backend_name(),
            collection: self.collection,
            records: items.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::DEFAULT_COLOR;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Remote store double that counts calls and can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub(crate) inner: FallbackStore,
        pub(crate) calls: AtomicUsize,
        pub(crate) fail: Mutex<bool>,
        pub(crate) delay: Mutex<Option<Duration>>,
        /// Pause after `list` has read its contents
        pub(crate) list_delay: Mutex<Option<Duration>>,
    }

    impl RecordingStore {
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        pub(crate) fn set_list_delay(&self, delay: Duration) {
            *self.list_delay.lock().unwrap() = Some(delay);
        }

        async fn enter(&self) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail.lock().unwrap() {
                return Err(StoreError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        fn backend_name(&self) -> &'static str {
            "recording"
        }

        async fn list(&self, collection: Collection) -> StoreResult<Vec<PromptItem>> {
            self.enter().await?;
            let items = self.inner.list(collection).await?;
            let delay = *self.list_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(items)
        }

        async fn put(&self, collection: Collection, item: &PromptItem) -> StoreResult<()> {
            self.enter().await?;
            self.inner.put(collection, item).await
        }

        async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
            self.enter().await?;
            DocumentStore::delete(&self.inner, collection, id).await
        }

        async fn replace_all(
            &self,
            collection: Collection,
            items: &[PromptItem],
        ) -> StoreResult<()> {
            self.enter().await?;
            self.inner.replace_all(collection, items).await
        }
    }

    fn remote_service(remote: Arc<RecordingStore>) -> PromptService {
        PromptService::new(
            Collection::PromptButtons,
            StoreSettings::remote(),
            Some(remote),
            Arc::new(FallbackStore::new()),
        )
    }

    fn labels(items: &[PromptItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[tokio::test]
    async fn test_save_one_then_get_all() {
        let service = PromptService::in_memory(Collection::PromptButtons);

        let item = PromptItem::with_id("42", "Summarize", "Sum it up");
        service.save_one(item).await.unwrap();

        let items = service.get_all().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "42");
        assert_eq!(items[0].label, "Summarize");
        assert_eq!(items[0].prompt, "Sum it up");
        assert_eq!(items[0].color.as_deref(), Some(DEFAULT_COLOR));
    }

    #[tokio::test]
    async fn test_save_one_is_idempotent_upsert() {
        let service = PromptService::in_memory(Collection::PromptButtons);
        let item = PromptItem::with_id("42", "Summarize", "Sum it up");

        service.save_one(item.clone()).await.unwrap();
        service.save_one(item).await.unwrap();

        assert_eq!(service.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_edit_delete_scenario() {
        let service = PromptService::in_memory(Collection::PromptButtons);

        let item = crate::models::PromptDraft::new("Summarize", "Summarize the story")
            .into_item()
            .unwrap();
        service.save_one(item).await.unwrap();

        let items = service.get_all().await;
        assert_eq!(items.len(), 1);
        let id = items[0].id.clone();
        assert!(!id.is_empty());

        let mut edited = items[0].clone();
        edited.set_label("Summarized");
        service.save_one(edited).await.unwrap();

        let items = service.get_all().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].label, "Summarized");

        service.delete_one(&id).await.unwrap();
        assert!(service.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_noop() {
        let service = PromptService::in_memory(Collection::PromptButtons);
        service.save_all(default_prompt_items()).await.unwrap();
        let before = service.get_all().await;

        service.delete_one("does-not-exist").await.unwrap();

        assert_eq!(service.get_all().await, before);
    }

    #[tokio::test]
    async fn test_save_all_rewrites_order() {
        let service = PromptService::in_memory(Collection::PromptButtons);
        let items = vec![
            PromptItem::with_id("c", "C", "c").order(9),
            PromptItem::with_id("a", "A", "a"),
            PromptItem::with_id("b", "B", "b").order(0),
        ];

        service.save_all(items).await.unwrap();

        let stored = service.get_all().await;
        assert_eq!(labels(&stored), ["C", "A", "B"]);
        let orders: Vec<_> = stored.iter().map(|i| i.order).collect();
        assert_eq!(orders, [Some(0), Some(1), Some(2)]);
        assert!(stored.iter().all(|i| i.color.is_some()));
    }

    #[tokio::test]
    async fn test_save_all_empty_clears_collection() {
        let service = PromptService::in_memory(Collection::PromptButtons);
        service.save_all(default_prompt_items()).await.unwrap();
        assert!(!service.get_all().await.is_empty());

        service.save_all(Vec::new()).await.unwrap();

        assert!(service.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_defaults_on_empty_collection() {
        let service = PromptService::in_memory(Collection::Topics);

        assert!(service.initialize_defaults().await.unwrap());

        let items = service.get_all().await;
        assert_eq!(items.len(), 4);
        assert_eq!(labels(&items), ["Summarize", "Explain", "Analyze", "Key Points"]);
    }

    #[tokio::test]
    async fn test_initialize_defaults_leaves_non_empty_collection() {
        let service = PromptService::in_memory(Collection::PromptButtons);
        service
            .save_one(PromptItem::with_id("1", "Mine", "My prompt"))
            .await
            .unwrap();
        let before = service.get_all().await;

        assert!(!service.initialize_defaults().await.unwrap());

        assert_eq!(service.get_all().await, before);
    }

    #[tokio::test]
    async fn test_placeholder_config_never_touches_remote() {
        let remote = Arc::new(RecordingStore::default());
        let config = Config {
            firebase: crate::config::FirebaseConfig {
                project_id: Some(crate::config::PLACEHOLDER_PROJECT_ID.into()),
                api_key: Some("AIza-real".into()),
                ..Default::default()
            },
            ..Config::default()
        };
        let service = PromptService::new(
            Collection::PromptButtons,
            config.store_settings(),
            Some(remote.clone()),
            Arc::new(FallbackStore::new()),
        );

        assert!(service.uses_fallback());
        assert_eq!(service.backend_name(), "local");

        service
            .save_one(PromptItem::with_id("1", "A", "a"))
            .await
            .unwrap();
        service.get_all().await;
        service.delete_one("1").await.unwrap();
        service.save_all(default_prompt_items()).await.unwrap();

        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_configured_service_uses_remote() {
        let remote = Arc::new(RecordingStore::default());
        let service = remote_service(remote.clone());

        assert!(!service.uses_fallback());
        service
            .save_one(PromptItem::with_id("1", "A", "a"))
            .await
            .unwrap();
        assert_eq!(service.get_all().await.len(), 1);
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_remote_falls_back() {
        let service = PromptService::new(
            Collection::PromptButtons,
            StoreSettings::remote(),
            None,
            Arc::new(FallbackStore::new()),
        );
        assert!(service.uses_fallback());
        assert_eq!(service.backend_name(), "local");
    }

    #[tokio::test]
    async fn test_reconfigure_switches_backend() {
        let remote = Arc::new(RecordingStore::default());
        let mut service = remote_service(remote.clone());

        service.reconfigure(StoreSettings::fallback());
        service
            .save_one(PromptItem::with_id("1", "A", "a"))
            .await
            .unwrap();
        assert_eq!(remote.calls(), 0);

        service.reconfigure(StoreSettings::remote());
        assert!(service.get_all().await.is_empty());
        assert_eq!(remote.calls(), 1);
    }

    // Reads and writes deliberately disagree on failure handling: a failed
    // remote read substitutes the defaults while failed writes propagate.
    #[tokio::test]
    async fn test_failed_remote_read_returns_defaults() {
        let remote = Arc::new(RecordingStore::default());
        remote.set_failing(true);
        let service = remote_service(remote);

        let items = service.get_all().await;
        assert_eq!(items, default_prompt_items());
    }

    #[tokio::test]
    async fn test_failed_remote_writes_propagate() {
        let remote = Arc::new(RecordingStore::default());
        remote.set_failing(true);
        let service = remote_service(remote);

        let item = PromptItem::with_id("1", "A", "a");
        assert!(matches!(
            service.save_one(item.clone()).await,
            Err(StoreError::Status { .. })
        ));
        assert!(service.delete_one("1").await.is_err());
        assert!(service.save_all(vec![item]).await.is_err());
        assert!(service.check_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_defaults_skips_when_read_fails() {
        let remote = Arc::new(RecordingStore::default());
        remote.set_failing(true);
        let service = remote_service(remote.clone());

        // The failed read yields defaults, so nothing looks empty
        assert!(!service.initialize_defaults().await.unwrap());
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_calls_time_out() {
        let remote = Arc::new(RecordingStore::default());
        remote.set_delay(Duration::from_secs(60));
        let service = PromptService::new(
            Collection::PromptButtons,
            StoreSettings::remote().with_timeout(Duration::from_secs(10)),
            Some(remote),
            Arc::new(FallbackStore::new()),
        );

        let err = service
            .save_one(PromptItem::with_id("1", "A", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_secs(10)));

        // Reads time out too, but fail soft
        assert_eq!(service.get_all().await, default_prompt_items());
    }

    #[tokio::test]
    async fn test_check_connection_reports_backend() {
        let service = PromptService::in_memory(Collection::Topics);
        service.initialize_defaults().await.unwrap();

        let report = service.check_connection().await.unwrap();
        assert_eq!(report.backend, "local");
        assert_eq!(report.collection, Collection::Topics);
        assert_eq!(report.records, 4);
    }

    #[tokio::test]
    async fn test_from_config_uses_file_backed_fallback() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };

        {
            let service = PromptService::from_config(&config, Collection::PromptButtons).unwrap();
            assert!(service.uses_fallback());
            service.initialize_defaults().await.unwrap();
        }

        let service = PromptService::from_config(&config, Collection::PromptButtons).unwrap();
        assert_eq!(service.get_all().await.len(), 4);
        assert!(config.fallback_store_path().exists());
    }
}
