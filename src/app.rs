//! Application assembly: config, engine state, and the axum server.

use crate::cli::Cli;
use rosetta_core::config::Config;
use rosetta_core::pool::BufferPool;
use rosetta_server::AppState;
use rosetta_translator::TranslationCache;
use std::sync::Arc;
use std::time::Duration;

pub struct Application {
    router: axum::Router,
    host: String,
    port: u16,
}

impl Application {
    /// Build the application from CLI args: load config, build the
    /// registry with builtin conversions, the default chains, cache, and
    /// buffer pool.
    pub fn build(args: &Cli) -> anyhow::Result<Self> {
        let mut config = Config::load(&args.config).unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to load config from '{}': {e}, using defaults",
                args.config
            );
            Config::default()
        });

        // CLI overrides
        if let Some(ref host) = args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }

        let registry = Arc::new(rosetta_translator::build_registry());
        registry.set_debug_mode(config.debug);
        registry.set_dry_run(config.dry_run);
        let fallback = Arc::new(rosetta_translator::build_fallback_registry());
        let cache = Arc::new(TranslationCache::new(
            config.cache.max_entries,
            Duration::from_secs(config.cache.ttl_secs),
        ));
        cache.set_enabled(config.cache.enabled);
        let pool = Arc::new(BufferPool::with_buckets(config.pool.buckets.clone()));

        tracing::info!(
            formats = registry.supported_formats().len(),
            paths = registry.all_translations().len(),
            "translation registry ready"
        );

        let state = AppState::new(registry, fallback, cache, pool);
        let router = rosetta_server::build_router(state, config.body_limit_mb * 1024 * 1024);

        Ok(Self {
            router,
            host: config.host,
            port: config.port,
        })
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("listening on {addr}");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
