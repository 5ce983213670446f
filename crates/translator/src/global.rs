//! Process-wide default instances.
//!
//! Convenience singletons for embedders that do not thread explicit
//! instances around. Every capability is also available on explicitly
//! constructed instances; these are thin wrappers over lazily-built
//! defaults. The default registry pointer is swappable for hot reload.

use crate::cache::TranslationCache;
use crate::fallback::FallbackRegistry;
use crate::middleware::MiddlewareRegistry;
use crate::registry::Registry;
use arc_swap::ArcSwap;
use rosetta_core::pool::BufferPool;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const DEFAULT_CACHE_ENTRIES: usize = 1024;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

fn registry_cell() -> &'static ArcSwap<Registry> {
    static CELL: OnceLock<ArcSwap<Registry>> = OnceLock::new();
    CELL.get_or_init(|| ArcSwap::from_pointee(crate::convert::build_registry()))
}

/// The process-wide default registry, pre-loaded with the builtin
/// conversions.
pub fn default_registry() -> Arc<Registry> {
    registry_cell().load_full()
}

/// Atomically substitute the process-wide default registry. Returns the
/// registry that was replaced. In-flight holders of the old `Arc` finish
/// against the old tables.
pub fn replace_registry(registry: Arc<Registry>) -> Arc<Registry> {
    registry_cell().swap(registry)
}

pub fn default_fallback_registry() -> Arc<FallbackRegistry> {
    static CELL: OnceLock<Arc<FallbackRegistry>> = OnceLock::new();
    CELL.get_or_init(|| Arc::new(crate::convert::build_fallback_registry()))
        .clone()
}

pub fn default_cache() -> Arc<TranslationCache> {
    static CELL: OnceLock<Arc<TranslationCache>> = OnceLock::new();
    CELL.get_or_init(|| {
        Arc::new(TranslationCache::new(
            DEFAULT_CACHE_ENTRIES,
            DEFAULT_CACHE_TTL,
        ))
    })
    .clone()
}

pub fn default_buffer_pool() -> Arc<BufferPool> {
    static CELL: OnceLock<Arc<BufferPool>> = OnceLock::new();
    CELL.get_or_init(|| Arc::new(BufferPool::new())).clone()
}

pub fn default_middleware() -> Arc<MiddlewareRegistry> {
    static CELL: OnceLock<Arc<MiddlewareRegistry>> = OnceLock::new();
    CELL.get_or_init(|| Arc::new(MiddlewareRegistry::new()))
        .clone()
}
