//! promptdeck Core Library
//!
//! This crate provides the persistence layer behind promptdeck's AI prompt
//! buttons: a small ordered list of prompt records stored in a hosted
//! document database, with a local fallback store when no database is
//! configured.
//!
//! # Architecture
//!
//! ```text
//! front end -> PromptQueries -> PromptService -> FirestoreStore | FallbackStore
//! ```
//!
//! - `PromptQueries` caches reads and invalidates them after writes
//! - `PromptService` routes each call to the configured store
//! - `DocumentStore` is the CRUD contract both stores implement
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let service = PromptService::from_config(&config, config.collection)?;
//! let queries = PromptQueries::new(Arc::new(service));
//!
//! let items = queries.list().await.data.unwrap_or_default();
//! queries.save_item().mutate_async(PromptItem::new("Translate", "...")).await?;
//! ```
//!
//! # Modules
//!
//! - `models`: prompt records, collections, form validation
//! - `config`: application configuration
//! - `store`: document store contract and backends
//! - `service`: routed CRUD over one collection
//! - `query`: query/mutation cache

pub mod config;
pub mod models;
pub mod query;
pub mod service;
pub mod store;

pub use config::{Config, FirebaseConfig, StoreSettings};
pub use models::{
    default_prompt_items, Collection, PromptDraft, PromptItem, ValidationError, DEFAULT_COLOR,
};
pub use query::{
    Mutation, PromptQueries, QueryCache, QueryError, QueryKey, QueryOptions, QueryState,
    QueryStatus,
};
pub use service::{ConnectionReport, PromptService};
pub use store::{DocumentStore, FallbackStore, FirestoreStore, StoreError, StoreResult};
