//! Raw document intake: stores arbitrary JSON objects in a collection kept
//! apart from the validated book records.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use libris_db::{Document, DocumentStore, StoreError, ID_FIELD};
use libris_http::error::AppError;
use libris_kernel::{InitCtx, Module};
use serde_json::{json, Value};

#[derive(Clone)]
struct DocumentsState {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
}

/// Documents module: schema-free inserts into a side collection
pub struct DocumentsModule {
    state: DocumentsState,
}

impl DocumentsModule {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            state: DocumentsState {
                store,
                collection: Arc::from(collection),
            },
        }
    }
}

fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::DuplicateKey { id, .. } => AppError::conflict(
            vec![json!({"field": ID_FIELD, "error": "already exists"})],
            format!("document '{}' already exists", id),
        ),
        StoreError::InvalidDocument(reason) => AppError::invalid_field(ID_FIELD, reason),
        StoreError::Unavailable(reason) => AppError::unavailable(reason),
    }
}

/// Insert endpoint
async fn insert_document(
    State(state): State<DocumentsState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) =
        payload.map_err(|rejection| AppError::invalid_field("body", rejection.body_text()))?;
    let Value::Object(doc) = body else {
        return Err(AppError::invalid_field("body", "must be a JSON object"));
    };

    let doc: Document = doc;
    let inserted_id = state
        .store
        .insert_one(&state.collection, doc)
        .await
        .map_err(store_error)?;

    tracing::info!(collection = %state.collection, id = %inserted_id, "raw document inserted");
    Ok(Json(json!({ "inserted_id": inserted_id })))
}

#[async_trait]
impl Module for DocumentsModule {
    fn name(&self) -> &'static str {
        "documents"
    }

    fn mount_path(&self) -> String {
        String::new()
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            collection = %self.state.collection,
            "documents module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/insert", post(insert_document))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/insert": {
                    "post": {
                        "summary": "Insert a raw document",
                        "tags": ["Documents"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "type": "object" }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Identifier of the stored document",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/InsertedId" }
                                    }
                                }
                            },
                            "409": {
                                "description": "Document with the same _id already exists",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            },
                            "422": {
                                "description": "Body is not a JSON object",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "InsertedId": {
                        "type": "object",
                        "properties": {
                            "inserted_id": {
                                "type": "string",
                                "description": "Assigned or caller-supplied identifier"
                            }
                        },
                        "required": ["inserted_id"]
                    }
                }
            }
        }))
    }
}

/// Create a new instance of the documents module
pub fn create_module(store: Arc<dyn DocumentStore>, collection: &str) -> Arc<dyn Module> {
    Arc::new(DocumentsModule::new(store, collection))
}
