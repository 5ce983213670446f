//! Shared building blocks for the rosetta translation engine: format
//! identifiers, the error taxonomy, per-request context, configuration,
//! cancellation, and the byte-buffer pool.

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod pool;

pub use cancel::CancelHandle;
pub use config::Config;
pub use context::TransformCtx;
pub use error::{Result, TranslateError};
pub use format::Format;
pub use pool::{BufferPool, BufferWriter};
