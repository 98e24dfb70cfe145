//! Document store abstraction for libris.
//!
//! Domain modules talk to a [`DocumentStore`] through a shared
//! `Arc<dyn DocumentStore>` handle. Documents are plain JSON objects keyed by
//! an `_id` field. [`MemoryStore`] is the bundled backend; [`DatabaseModule`]
//! plugs it into the module lifecycle.

pub mod error;
pub mod memory;
pub mod module;
pub mod query;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use module::{create_module, DatabaseModule};
pub use query::{Filter, SortOrder, Stage};

/// A stored document: a JSON object carrying its identifier under [`ID_FIELD`].
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Operations every document store backend provides.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return its identifier. A missing `_id` is assigned
    /// by the store.
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<String>;

    async fn find_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Documents matching `filter` in storage order, at most `limit` of them.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>>;

    /// Replace the whole document stored under `id`, keeping the identifier.
    /// Returns the stored document after replacement, or `None` when no
    /// document has that identifier.
    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> StoreResult<Option<Document>>;

    /// Returns true if a document was removed.
    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<bool>;

    async fn count(&self, collection: &str) -> StoreResult<u64>;

    /// Run an aggregation pipeline over the collection.
    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>>;
}
