//! Translation engine for LLM-API wire formats.
//!
//! The engine is a registry of format-to-format transforms plus the
//! machinery around it: a resolver with multi-hop fallback and payload
//! auto-detection, a streaming/non-streaming response pipeline, an LRU+TTL
//! payload cache, ordered middleware hooks, bounded-concurrency batch
//! translation, quality/roundtrip reporting, and an introspection surface.
//!
//! Transforms themselves are supplied by provider modules; the engine
//! stores and invokes them. A small set of builtin conversions for the
//! most-travelled pairs lives in [`convert`].

pub mod batch;
pub mod bench;
pub mod cache;
pub mod convert;
pub mod detect;
pub mod fallback;
pub mod global;
pub mod introspect;
pub mod middleware;
pub mod quality;
pub mod recovery;
pub mod registry;
mod stats;
pub mod validate;

use rosetta_core::{Result, TransformCtx};
use std::any::Any;
use std::sync::Arc;

pub use batch::{BatchRequest, BatchResult, BatchStats, BatchTranslator, batch_stats};
pub use bench::{BenchmarkReport, benchmark_translation};
pub use cache::{CachedRegistry, TranslationCache};
pub use convert::{build_fallback_registry, build_registry};
pub use detect::{Detection, detect_format};
pub use fallback::{FallbackRegistry, build_full_path};
pub use global::{
    default_buffer_pool, default_cache, default_fallback_registry, default_middleware,
    default_registry, replace_registry,
};
pub use introspect::{TranslationInfo, TranslationPair};
pub use middleware::{
    Middleware, MiddlewareRegistry, chain_middleware, conditional_middleware,
    translate_request_with_middleware,
};
pub use quality::{
    DiffType, QualityReport, RoundtripReport, StructureComparison, StructureDiff,
    compare_json_structures, score_translation, test_roundtrip,
};
pub use recovery::TranslationOutcome;
pub use registry::Registry;
pub use validate::{Validation, validate_payload};

// ============================================================================
// Transform types
// ============================================================================

/// Rewrites a request payload into the target format.
/// Arguments: resolved model name, raw payload bytes, stream flag.
pub type RequestTransform = Arc<dyn Fn(&str, &[u8], bool) -> Result<Vec<u8>> + Send + Sync>;

/// Rewrites one upstream SSE chunk into zero or more output chunks.
/// Arguments: request context, model, original request bytes, translated
/// request bytes, SSE event name, chunk data, per-stream carry state.
pub type StreamTransform = Arc<
    dyn Fn(&TransformCtx, &str, &[u8], &[u8], Option<&str>, &[u8], &mut Carry) -> Result<Vec<String>>
        + Send
        + Sync,
>;

/// Rewrites a complete upstream response body.
/// Arguments: request context, model, original request bytes, translated
/// request bytes, response body.
pub type NonStreamTransform =
    Arc<dyn Fn(&TransformCtx, &str, &[u8], &[u8], &[u8]) -> Result<String> + Send + Sync>;

/// Renders a token count in the target format's response schema.
pub type TokenCountTransform = Arc<dyn Fn(&TransformCtx, u64) -> String + Send + Sync>;

/// The response side of a conversion: up to three operations.
#[derive(Clone, Default)]
pub struct ResponseTransform {
    pub stream: Option<StreamTransform>,
    pub non_stream: Option<NonStreamTransform>,
    pub token_count: Option<TokenCountTransform>,
}

impl ResponseTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, f: StreamTransform) -> Self {
        self.stream = Some(f);
        self
    }

    pub fn with_non_stream(mut self, f: NonStreamTransform) -> Self {
        self.non_stream = Some(f);
        self
    }

    pub fn with_token_count(mut self, f: TokenCountTransform) -> Self {
        self.token_count = Some(f);
        self
    }
}

impl std::fmt::Debug for ResponseTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseTransform")
            .field("stream", &self.stream.is_some())
            .field("non_stream", &self.non_stream.is_some())
            .field("token_count", &self.token_count.is_some())
            .finish()
    }
}

// ============================================================================
// Carry-over state
// ============================================================================

/// Opaque per-stream accumulator threaded through stream transforms.
///
/// Each stream starts with a fresh, empty carry; the transform stores
/// whatever decoder state it needs across chunks of that one stream. The
/// registry never inspects the contents.
#[derive(Default)]
pub struct Carry {
    slot: Option<Box<dyn Any + Send>>,
}

impl Carry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Borrow the typed state, initializing it on first access. A carry
    /// holds at most one state type; requesting a different type resets it.
    pub fn get_or_default<T: Default + Send + 'static>(&mut self) -> &mut T {
        let needs_init = !matches!(&self.slot, Some(b) if b.is::<T>());
        if needs_init {
            self.slot = Some(Box::new(T::default()));
        }
        // Just installed or verified above.
        self.slot.as_mut().unwrap().downcast_mut::<T>().unwrap()
    }

    pub fn take<T: Send + 'static>(&mut self) -> Option<T> {
        match self.slot.take() {
            Some(b) => match b.downcast::<T>() {
                Ok(v) => Some(*v),
                Err(b) => {
                    self.slot = Some(b);
                    None
                }
            },
            None => None,
        }
    }
}

impl std::fmt::Debug for Carry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Carry")
            .field("occupied", &self.slot.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CounterState {
        seen: u32,
    }

    #[test]
    fn test_carry_starts_empty() {
        let carry = Carry::new();
        assert!(carry.is_empty());
    }

    #[test]
    fn test_carry_get_or_default_persists() {
        let mut carry = Carry::new();
        carry.get_or_default::<CounterState>().seen += 1;
        carry.get_or_default::<CounterState>().seen += 1;
        assert_eq!(carry.get_or_default::<CounterState>().seen, 2);
    }

    #[test]
    fn test_carry_take() {
        let mut carry = Carry::new();
        carry.get_or_default::<CounterState>().seen = 7;
        let state = carry.take::<CounterState>().unwrap();
        assert_eq!(state.seen, 7);
        assert!(carry.is_empty());
    }

    #[test]
    fn test_response_transform_builder() {
        let rt = ResponseTransform::new()
            .with_non_stream(Arc::new(|_, _, _, _, body| {
                Ok(String::from_utf8_lossy(body).to_string())
            }))
            .with_token_count(Arc::new(|_, n| n.to_string()));
        assert!(rt.stream.is_none());
        assert!(rt.non_stream.is_some());
        assert!(rt.token_count.is_some());
    }
}
