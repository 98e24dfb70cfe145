//! Book resource operations over a shared document store handle.

use std::sync::Arc;

use libris_db::{DocumentStore, Filter, Stage, StoreError, ID_FIELD};
use thiserror::Error;

use super::models::{AuthorCount, Book, BookInput, FieldViolation, SearchQuery};

/// Most records a search returns.
pub const SEARCH_LIMIT: usize = 1000;
pub const DEFAULT_MIN_PRICE: f64 = 0.0;
pub const DEFAULT_MAX_PRICE: f64 = 1000.0;
/// Length of the bestseller and top-author rankings.
pub const RANKING_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookError {
    #[error("book failed validation ({} violation(s))", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error("book '{0}' not found")]
    NotFound(String),

    #[error("duplicate book id '{0}'")]
    DuplicateKey(String),

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("stored book is corrupt: {0}")]
    Corrupt(String),
}

impl From<StoreError> for BookError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { id, .. } => BookError::DuplicateKey(id),
            StoreError::Unavailable(reason) => BookError::Unavailable(reason),
            StoreError::InvalidDocument(reason) => BookError::Corrupt(reason),
        }
    }
}

pub type BookResult<T> = Result<T, BookError>;

fn decode(doc: libris_db::Document) -> BookResult<Book> {
    Book::from_document(doc).map_err(BookError::Corrupt)
}

/// Validates, persists, queries and ranks book records.
///
/// Holds no state besides the store handle, so one instance is shared by all
/// request handlers.
pub struct BookService {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl BookService {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn create(&self, input: BookInput) -> BookResult<Book> {
        input.validate().map_err(BookError::Validation)?;

        let mut doc = input.to_document();
        let id = self.store.insert_one(&self.collection, doc.clone()).await?;
        tracing::info!(collection = %self.collection, id = %id, "book created");

        doc.insert(ID_FIELD.to_string(), serde_json::Value::String(id));
        decode(doc)
    }

    pub async fn get(&self, id: &str) -> BookResult<Book> {
        match self.store.find_one(&self.collection, id).await? {
            Some(doc) => decode(doc),
            None => Err(BookError::NotFound(id.to_string())),
        }
    }

    /// Every record in storage order.
    pub async fn list(&self) -> BookResult<Vec<Book>> {
        self.store
            .find(&self.collection, &Filter::All, None)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Replace the whole record under `id`. Input is validated before the
    /// existence check, so invalid input on a missing id reports `Validation`.
    pub async fn update(&self, id: &str, input: BookInput) -> BookResult<Book> {
        input.validate().map_err(BookError::Validation)?;

        match self
            .store
            .replace_one(&self.collection, id, input.to_document())
            .await?
        {
            Some(doc) => {
                tracing::info!(collection = %self.collection, id, "book replaced");
                decode(doc)
            }
            None => Err(BookError::NotFound(id.to_string())),
        }
    }

    pub async fn delete(&self, id: &str) -> BookResult<()> {
        if self.store.delete_one(&self.collection, id).await? {
            tracing::info!(collection = %self.collection, id, "book deleted");
            Ok(())
        } else {
            Err(BookError::NotFound(id.to_string()))
        }
    }

    /// Case-insensitive substring match on title and author, always bounded to
    /// the price range (defaults 0..=1000), capped at [`SEARCH_LIMIT`] results.
    pub async fn search(&self, query: &SearchQuery) -> BookResult<Vec<Book>> {
        let mut filters = Vec::new();
        if let Some(title) = &query.title {
            filters.push(Filter::contains("title", title.as_str()));
        }
        if let Some(author) = &query.author {
            filters.push(Filter::contains("author", author.as_str()));
        }
        filters.push(Filter::range(
            "price",
            Some(query.min_price.unwrap_or(DEFAULT_MIN_PRICE)),
            Some(query.max_price.unwrap_or(DEFAULT_MAX_PRICE)),
        ));

        let docs = self
            .store
            .find(&self.collection, &Filter::And(filters), Some(SEARCH_LIMIT))
            .await?;
        tracing::debug!(collection = %self.collection, matches = docs.len(), "book search");

        docs.into_iter().map(decode).collect()
    }

    /// Top sellers by `sold`, highest first. Order among equal `sold` values
    /// is whatever the store yields and must not be relied on.
    pub async fn bestsellers(&self) -> BookResult<Vec<Book>> {
        self.store
            .aggregate(
                &self.collection,
                &[Stage::sort_desc("sold"), Stage::Limit(RANKING_SIZE)],
            )
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Authors with the most records, highest count first.
    pub async fn top_authors(&self) -> BookResult<Vec<AuthorCount>> {
        let groups = self
            .store
            .aggregate(
                &self.collection,
                &[
                    Stage::group_count("author", "count"),
                    Stage::sort_desc("count"),
                    Stage::Limit(RANKING_SIZE),
                ],
            )
            .await?;

        groups
            .into_iter()
            .map(|group| {
                let author = group
                    .get(ID_FIELD)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| BookError::Corrupt("author group without a name".into()))?;
                let book_count = group
                    .get("count")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| BookError::Corrupt("author group without a count".into()))?;
                Ok(AuthorCount {
                    author: author.to_string(),
                    book_count,
                })
            })
            .collect()
    }

    /// Number of records; an empty or never-written collection counts as 0.
    pub async fn total_count(&self) -> BookResult<u64> {
        Ok(self.store.count(&self.collection).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_db::MemoryStore;
    use std::time::Duration;

    fn service() -> (Arc<MemoryStore>, BookService) {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(200)));
        let service = BookService::new(store.clone(), "books");
        (store, service)
    }

    fn input(title: &str, author: &str, price: f64, sold: i64) -> BookInput {
        BookInput {
            title: title.into(),
            author: author.into(),
            description: None,
            price,
            stock: 10,
            sold,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_, service) = service();
        let created = service
            .create(input("Dune", "Frank Herbert", 9.5, 0))
            .await
            .unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(service.get(&created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_mutation() {
        let (_, service) = service();
        let mut bad = input("Dune", "Frank Herbert", -1.0, 0);
        bad.stock = -2;

        let err = service.create(bad).await.unwrap_err();
        match err {
            BookError::Validation(v) => assert_eq!(v.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(service.total_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let (_, service) = service();
        let valid = input("Dune", "Frank Herbert", 9.5, 0);

        assert_eq!(
            service.get("nope").await.unwrap_err(),
            BookError::NotFound("nope".into())
        );
        assert_eq!(
            service.update("nope", valid).await.unwrap_err(),
            BookError::NotFound("nope".into())
        );
        assert_eq!(
            service.delete("nope").await.unwrap_err(),
            BookError::NotFound("nope".into())
        );
    }

    #[tokio::test]
    async fn update_validates_before_checking_existence() {
        let (_, service) = service();
        let err = service
            .update("nope", input("", "Frank Herbert", 9.5, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookError::Validation(_)));
    }

    #[tokio::test]
    async fn invalid_update_leaves_record_unchanged() {
        let (_, service) = service();
        let created = service
            .create(input("Dune", "Frank Herbert", 9.5, 7))
            .await
            .unwrap();

        let mut bad = input("Dune Messiah", "Frank Herbert", -3.0, 0);
        bad.stock = -1;
        match service.update(&created.id, bad).await.unwrap_err() {
            BookError::Validation(v) => {
                let fields: Vec<_> = v.iter().map(|f| f.field).collect();
                assert_eq!(fields, vec!["price", "stock"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(service.get(&created.id).await.unwrap(), created);
        assert_eq!(service.total_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let (_, service) = service();
        let first = service
            .create(input("Dune", "Frank Herbert", 9.5, 0))
            .await
            .unwrap();
        service.delete(&first.id).await.unwrap();

        let second = service
            .create(input("Dune", "Frank Herbert", 9.5, 0))
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
        assert!(matches!(
            service.get(&first.id).await,
            Err(BookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_returns_and_persists_new_state() {
        let (_, service) = service();
        let created = service
            .create(input("Dune", "Frank Herbert", 9.5, 40))
            .await
            .unwrap();

        let mut replacement = input("Dune Messiah", "Frank Herbert", 11.0, 0);
        replacement.description = Some("Sequel".into());
        let updated = service.update(&created.id, replacement).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Dune Messiah");
        // Full replacement: sold was not supplied, so it is back to 0.
        assert_eq!(updated.sold, 0);
        assert_eq!(service.get(&created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let (_, service) = service();
        let created = service
            .create(input("Dune", "Frank Herbert", 9.5, 0))
            .await
            .unwrap();
        service.delete(&created.id).await.unwrap();
        assert!(matches!(
            service.get(&created.id).await,
            Err(BookError::NotFound(_))
        ));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_matches_substrings_and_default_price_bounds() {
        let (_, service) = service();
        service
            .create(input("The Dune Chronicles", "Frank Herbert", 20.0, 0))
            .await
            .unwrap();
        service
            .create(input("Foundation", "Isaac Asimov", 15.0, 0))
            .await
            .unwrap();
        service
            .create(input("Collector's Dune", "Someone Else", 2500.0, 0))
            .await
            .unwrap();

        let hits = service
            .search(&SearchQuery {
                title: Some("dune".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "The Dune Chronicles");

        let all = service.search(&SearchQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_author = service
            .search(&SearchQuery {
                author: Some("ASIMOV".into()),
                max_price: Some(15.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 1);

        let expensive = service
            .search(&SearchQuery {
                min_price: Some(1000.0),
                max_price: Some(5000.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(expensive.len(), 1);

        let none = service
            .search(&SearchQuery {
                title: Some("Hyperion".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn bestsellers_sorted_by_sold_and_capped() {
        let (_, service) = service();
        for (title, sold) in [("a", 5), ("b", 50), ("c", 20)] {
            service.create(input(title, "X", 1.0, sold)).await.unwrap();
        }
        let top: Vec<_> = service
            .bestsellers()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(top, vec!["b", "c", "a"]);

        for i in 0..4 {
            service
                .create(input(&format!("extra-{i}"), "Y", 1.0, i))
                .await
                .unwrap();
        }
        assert_eq!(service.bestsellers().await.unwrap().len(), RANKING_SIZE);
    }

    #[tokio::test]
    async fn top_authors_counts_and_ranks() {
        let (_, service) = service();
        let authors = ["A", "B", "A", "C", "A", "B", "D", "E", "F"];
        for (i, author) in authors.iter().enumerate() {
            service
                .create(input(&format!("book-{i}"), author, 1.0, 0))
                .await
                .unwrap();
        }

        let top = service.top_authors().await.unwrap();
        assert_eq!(top.len(), RANKING_SIZE);
        assert_eq!(
            top[0],
            AuthorCount {
                author: "A".into(),
                book_count: 3
            }
        );
        assert_eq!(top[1].author, "B");
        assert_eq!(top[1].book_count, 2);
    }

    #[tokio::test]
    async fn total_count_handles_empty_collection() {
        let (_, service) = service();
        assert_eq!(service.total_count().await.unwrap(), 0);
        let created = service
            .create(input("Dune", "Frank Herbert", 9.5, 0))
            .await
            .unwrap();
        service
            .create(input("Foundation", "Isaac Asimov", 9.5, 0))
            .await
            .unwrap();
        assert_eq!(service.total_count().await.unwrap(), 2);

        service.delete(&created.id).await.unwrap();
        assert_eq!(service.total_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_unavailable() {
        let (store, service) = service();
        store.close();
        assert!(matches!(
            service.list().await,
            Err(BookError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn undecodable_record_is_corrupt() {
        let (store, service) = service();
        let mut doc = libris_db::Document::new();
        doc.insert("title".into(), serde_json::json!("only a title"));
        let id = store.insert_one("books", doc).await.unwrap();
        assert!(matches!(
            service.get(&id).await,
            Err(BookError::Corrupt(_))
        ));
    }
}
