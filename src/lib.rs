//! libris application library
//!
//! Wires the document store, the domain modules and the HTTP server together.

pub mod modules;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use libris_db::{DocumentStore, MemoryStore};
use libris_kernel::{settings::Settings, InitCtx, ModuleRegistry};

/// Build the registry: the `db` core module plus every domain module, all
/// sharing one store handle
pub fn build_registry(settings: &Settings) -> ModuleRegistry {
    let store = Arc::new(MemoryStore::new(Duration::from_millis(
        settings.database.operation_timeout_ms,
    )));

    let mut registry = ModuleRegistry::new();
    registry.register_core(libris_db::create_module(
        store.clone(),
        settings.database.snapshot_path.clone(),
    ));

    let shared: Arc<dyn DocumentStore> = store;
    modules::register_all(&mut registry, shared, &settings.database);
    registry
}

/// Run the service until Ctrl-C, then stop every module
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    settings
        .database
        .validate()
        .context("invalid database settings")?;
    tracing::info!(
        env = ?settings.environment,
        database = %settings.database.name,
        "libris bootstrap starting"
    );

    let registry = build_registry(&settings);
    let ctx = InitCtx {
        settings: &settings,
    };

    registry
        .init_all(&ctx)
        .await
        .context("module initialization failed")?;
    registry
        .start_all(&ctx)
        .await
        .context("module startup failed")?;

    tracing::info!("libris bootstrap complete");

    let served = libris_http::start_server(&registry, &settings, shutdown_signal()).await;
    let stopped = registry.stop_all().await;

    served?;
    stopped
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn full_stack_serves_books_and_documents() {
        let settings = Settings::default();
        let registry = build_registry(&settings);
        let ctx = InitCtx {
            settings: &settings,
        };
        registry.init_all(&ctx).await.unwrap();
        registry.start_all(&ctx).await.unwrap();

        let router = libris_http::build_router(&registry, &settings);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/books")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "title": "Dune",
                            "author": "Frank Herbert",
                            "price": 9.99,
                            "stock": 1
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("x-request-id"));

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/insert")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"free": "form"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Raw documents never count as books.
        let response = router
            .clone()
            .oneshot(Request::builder().uri("/total").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let total: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(total, serde_json::json!({"total": 1}));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let spec: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(spec["paths"]["/books/{id}"]["put"].is_object());
        assert!(spec["paths"]["/insert"]["post"].is_object());

        registry.stop_all().await.unwrap();
    }
}
