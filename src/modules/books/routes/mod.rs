//! HTTP handlers for the Books module. Service errors are translated into
//! transport responses here and nowhere else.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use libris_http::error::AppError;
use serde_json::{json, Value};

use super::models::{AuthorCount, Book, BookInput, SearchQuery};
use super::service::{BookError, BookService};

impl From<BookError> for AppError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::Validation(violations) => AppError::validation(
                violations.iter().map(|v| v.to_detail()).collect(),
                "book failed validation",
            ),
            BookError::NotFound(id) => AppError::not_found(format!("book '{}' not found", id)),
            BookError::DuplicateKey(id) => AppError::conflict(
                vec![json!({"field": "id", "error": "already exists"})],
                format!("book '{}' already exists", id),
            ),
            BookError::Unavailable(reason) => AppError::unavailable(reason),
            err @ BookError::Corrupt(_) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}

type Service = State<Arc<BookService>>;

/// Build the module router with the service as shared state
pub fn router(service: Arc<BookService>) -> Router {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route(
            "/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/search", get(search_books))
        .route("/bestsellers", get(bestsellers))
        .route("/best-authors", get(best_authors))
        .route("/total", get(total))
        .with_state(service)
}

/// Parse the body as a book, reporting malformed JSON like any other
/// validation failure
fn book_input(payload: Result<Json<Value>, JsonRejection>) -> Result<BookInput, AppError> {
    let Json(body) =
        payload.map_err(|rejection| AppError::invalid_field("body", rejection.body_text()))?;
    BookInput::from_json(&body).map_err(|violations| BookError::Validation(violations).into())
}

async fn create_book(
    State(service): Service,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let input = book_input(payload)?;
    let book = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn list_books(State(service): Service) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(service.list().await?))
}

async fn get_book(
    State(service): Service,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(service.get(&id).await?))
}

async fn update_book(
    State(service): Service,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let input = book_input(payload)?;
    Ok(Json(service.update(&id, input).await?))
}

async fn delete_book(
    State(service): Service,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_books(
    State(service): Service,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let Query(query) =
        query.map_err(|rejection| AppError::invalid_field("query", rejection.body_text()))?;
    Ok(Json(service.search(&query).await?))
}

async fn bestsellers(State(service): Service) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(service.bestsellers().await?))
}

async fn best_authors(State(service): Service) -> Result<Json<Vec<AuthorCount>>, AppError> {
    Ok(Json(service.top_authors().await?))
}

async fn total(State(service): Service) -> Result<Json<Value>, AppError> {
    let total = service.total_count().await?;
    Ok(Json(json!({ "total": total })))
}
