//! Read-only HTTP surface over the translation engine's introspection:
//! the compatibility matrix, per-pair checks, generated docs, quality
//! scoring, and structure comparison.

pub mod handler;

use rosetta_core::pool::BufferPool;
use rosetta_translator::{FallbackRegistry, Registry, TranslationCache};
use axum::{Router, routing};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub fallback: Arc<FallbackRegistry>,
    pub cache: Arc<TranslationCache>,
    pub pool: Arc<BufferPool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        registry: Arc<Registry>,
        fallback: Arc<FallbackRegistry>,
        cache: Arc<TranslationCache>,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            registry,
            fallback,
            cache,
            pool,
            start_time: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    // Public routes — health and metrics
    let public_routes = Router::new()
        .route("/health", routing::get(handler::health::health))
        .route("/metrics", routing::get(handler::health::metrics));

    // Introspection routes
    let api_routes = Router::new()
        .route(
            "/v1/translations",
            routing::get(handler::translations::list_translations),
        )
        .route(
            "/v1/translations/check",
            routing::get(handler::translations::check_translation),
        )
        .route(
            "/v1/translations/docs",
            routing::get(handler::translations::translation_docs),
        )
        .route(
            "/v1/translations/score",
            routing::post(handler::translations::score),
        )
        .route(
            "/v1/translations/compare",
            routing::post(handler::translations::compare),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
