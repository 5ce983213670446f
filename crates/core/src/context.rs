use std::time::Instant;

/// Per-request context threaded into response transforms for logging and
/// correlation.
#[derive(Debug, Clone)]
pub struct TransformCtx {
    /// Unique request identifier (UUID v4).
    pub request_id: String,
    /// When the request entered the engine.
    pub start_time: Instant,
}

impl TransformCtx {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            start_time: Instant::now(),
        }
    }

    /// Returns elapsed time since the request entered the engine.
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}

impl Default for TransformCtx {
    fn default() -> Self {
        Self::new()
    }
}
