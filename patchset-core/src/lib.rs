//! patchset core library: object model, remote store interface, catalog.
//!
//! - [`types`]: identities, metadata, the [`Resource`] trait
//! - [`error`]: [`StoreError`], [`FailureKind`], [`CatalogError`]
//! - [`store`]: [`RemoteStore`], [`MemoryStore`], store files
//! - [`catalog`]: plugin descriptor index

pub mod catalog;
pub mod error;
pub mod store;
pub mod types;

pub use catalog::{Catalog, FileCatalog, MemoryCatalog, PluginDescriptor, PluginGroup};
pub use error::{CatalogError, FailureKind, StoreError};
pub use store::{load_store_file, save_store_file, MemoryStore, RemoteStore, WriteCall};
pub use types::{
    shared, Aspect, Condition, ConditionStatus, DynamicObject, ObjectKey, ObjectMeta, Resource,
    Shared, Uid,
};
