pub mod books;
pub mod documents;

use std::sync::Arc;

use libris_db::DocumentStore;
use libris_kernel::{settings::DatabaseSettings, ModuleRegistry};

/// Register all domain modules with the registry, sharing one store handle
pub fn register_all(
    registry: &mut ModuleRegistry,
    store: Arc<dyn DocumentStore>,
    database: &DatabaseSettings,
) {
    registry.register_custom(books::create_module(
        store.clone(),
        &database.books_collection,
    ));
    registry.register_custom(documents::create_module(
        store,
        &database.documents_collection,
    ));
}
