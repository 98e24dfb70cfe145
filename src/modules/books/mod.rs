pub mod models;
pub mod routes;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use libris_db::DocumentStore;
use libris_kernel::{InitCtx, Module};
use serde_json::json;

use service::BookService;

/// Books module: CRUD, search and rankings over the book collection
pub struct BooksModule {
    service: Arc<BookService>,
}

impl BooksModule {
    pub fn new(service: Arc<BookService>) -> Self {
        Self { service }
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn json_response(description: &str, schema: serde_json::Value) -> serde_json::Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

fn book_list() -> serde_json::Value {
    json!({ "type": "array", "items": { "$ref": "#/components/schemas/Book" } })
}

fn author_list() -> serde_json::Value {
    json!({ "type": "array", "items": { "$ref": "#/components/schemas/AuthorCount" } })
}

fn query_param(name: &str, schema: serde_json::Value) -> serde_json::Value {
    json!({ "name": name, "in": "query", "schema": schema })
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    /// Book routes live at the server root (`/books`, `/search`, ...)
    fn mount_path(&self) -> String {
        String::new()
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            collection = self.service.collection(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.service.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let book_ref = json!({ "$ref": "#/components/schemas/Book" });
        let book_input = json!({
            "required": true,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/BookInput" }
                }
            }
        });
        let id_param = json!([{
            "name": "id",
            "in": "path",
            "required": true,
            "schema": { "type": "string" }
        }]);

        Some(json!({
            "paths": {
                "/books": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "responses": {
                            "200": json_response("All books", book_list()),
                            "503": error_response("Document store unavailable")
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "tags": ["Books"],
                        "requestBody": book_input,
                        "responses": {
                            "201": json_response("Created book", book_ref.clone()),
                            "422": error_response("Validation error"),
                            "503": error_response("Document store unavailable")
                        }
                    }
                },
                "/books/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": id_param,
                        "responses": {
                            "200": json_response("The book", book_ref.clone()),
                            "404": error_response("Book not found")
                        }
                    },
                    "put": {
                        "summary": "Replace a book",
                        "tags": ["Books"],
                        "parameters": id_param,
                        "requestBody": book_input,
                        "responses": {
                            "200": json_response("Book after replacement", book_ref),
                            "404": error_response("Book not found"),
                            "422": error_response("Validation error")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "parameters": id_param,
                        "responses": {
                            "204": { "description": "Deleted" },
                            "404": error_response("Book not found")
                        }
                    }
                },
                "/search": {
                    "get": {
                        "summary": "Search books by title, author and price range",
                        "tags": ["Books"],
                        "parameters": [
                            query_param("title", json!({ "type": "string" })),
                            query_param("author", json!({ "type": "string" })),
                            query_param("min_price", json!({ "type": "number", "default": 0 })),
                            query_param("max_price", json!({ "type": "number", "default": 1000 }))
                        ],
                        "responses": {
                            "200": json_response("Matching books, at most 1000", book_list()),
                            "422": error_response("Invalid query")
                        }
                    }
                },
                "/bestsellers": {
                    "get": {
                        "summary": "Five best-selling books",
                        "tags": ["Books"],
                        "responses": {
                            "200": json_response("Books ordered by copies sold", book_list())
                        }
                    }
                },
                "/best-authors": {
                    "get": {
                        "summary": "Five authors with the most books",
                        "tags": ["Books"],
                        "responses": {
                            "200": json_response("Authors ordered by book count", author_list())
                        }
                    }
                },
                "/total": {
                    "get": {
                        "summary": "Number of books",
                        "tags": ["Books"],
                        "responses": {
                            "200": json_response(
                                "Total",
                                json!({
                                    "type": "object",
                                    "properties": { "total": { "type": "integer" } },
                                    "required": ["total"]
                                })
                            )
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": "Store-assigned identifier" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "description": { "type": ["string", "null"] },
                            "price": { "type": "number", "minimum": 0 },
                            "stock": { "type": "integer", "minimum": 0 },
                            "sold": { "type": "integer", "minimum": 0 }
                        },
                        "required": ["id", "title", "author", "price", "stock", "sold"]
                    },
                    "BookInput": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string", "minLength": 1 },
                            "author": { "type": "string", "minLength": 1 },
                            "description": { "type": ["string", "null"] },
                            "price": { "type": "number", "minimum": 0 },
                            "stock": { "type": "integer", "minimum": 0 },
                            "sold": { "type": "integer", "minimum": 0, "default": 0 }
                        },
                        "required": ["title", "author", "price", "stock"]
                    },
                    "AuthorCount": {
                        "type": "object",
                        "properties": {
                            "author": { "type": "string" },
                            "book_count": { "type": "integer" }
                        },
                        "required": ["author", "book_count"]
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create the books module over the given store collection
pub fn create_module(store: Arc<dyn DocumentStore>, collection: &str) -> Arc<dyn Module> {
    let service = Arc::new(BookService::new(store, collection));
    Arc::new(BooksModule::new(service))
}
