//! Document store layer
//!
//! A [`DocumentStore`] holds collections of prompt records keyed by id.
//! Two backends implement it:
//!
//! - [`FirestoreStore`]: the hosted document database, over its REST API
//! - [`FallbackStore`]: an in-process store used when no real backend is
//!   configured, optionally persisted to a JSON file on the device
//!
//! Both expose the same async contract so the persistence service can
//! route a call to either one without caring which it got.

pub mod error;
pub mod fallback;
pub mod firestore;

use async_trait::async_trait;

use crate::models::{Collection, PromptItem};

pub use error::{StoreError, StoreResult};
pub use fallback::FallbackStore;
pub use firestore::FirestoreStore;

/// CRUD surface shared by every backing store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short name used in logs and status output
    fn backend_name(&self) -> &'static str;

    /// All records in the collection, in store-native order
    async fn list(&self, collection: Collection) -> StoreResult<Vec<PromptItem>>;

    /// Create or fully overwrite the record with `item.id`
    async fn put(&self, collection: Collection, item: &PromptItem) -> StoreResult<()>;

    /// Remove the record with `id`; unknown ids are not an error
    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Atomically replace the whole collection with `items`
    async fn replace_all(&self, collection: Collection, items: &[PromptItem]) -> StoreResult<()>;
}
