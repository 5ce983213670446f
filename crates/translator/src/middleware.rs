//! Ordered pre/post hooks that may rewrite payloads around translation.

use crate::registry::Registry;
use rosetta_core::{Format, Result};
use std::sync::{Arc, RwLock};

/// A payload-rewriting hook. Receives (from, to, model, payload) and
/// returns the (possibly rewritten) payload.
pub type Middleware =
    Arc<dyn Fn(&Format, &Format, &str, Vec<u8>) -> Result<Vec<u8>> + Send + Sync>;

/// Two ordered hook lists, applied in insertion order.
#[derive(Default)]
pub struct MiddlewareRegistry {
    pre: RwLock<Vec<Middleware>>,
    post: RwLock<Vec<Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre(&self, mw: Middleware) {
        self.pre.write().unwrap_or_else(|e| e.into_inner()).push(mw);
    }

    pub fn add_post(&self, mw: Middleware) {
        self.post
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(mw);
    }

    pub fn apply_pre(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let hooks: Vec<Middleware> = self
            .pre
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut current = payload;
        for hook in hooks {
            current = hook(from, to, model, current)?;
        }
        Ok(current)
    }

    pub fn apply_post(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let hooks: Vec<Middleware> = self
            .post
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut current = payload;
        for hook in hooks {
            current = hook(from, to, model, current)?;
        }
        Ok(current)
    }

    pub fn clear(&self) {
        self.pre.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.post.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Fuse several middleware into one, applied in order.
pub fn chain_middleware(hooks: Vec<Middleware>) -> Middleware {
    Arc::new(move |from, to, model, payload| {
        let mut current = payload;
        for hook in &hooks {
            current = hook(from, to, model, current)?;
        }
        Ok(current)
    })
}

/// Wrap a middleware with a predicate on (from, to, model); the hook only
/// runs when the predicate holds.
pub fn conditional_middleware(
    inner: Middleware,
    predicate: impl Fn(&Format, &Format, &str) -> bool + Send + Sync + 'static,
) -> Middleware {
    Arc::new(move |from, to, model, payload| {
        if predicate(from, to, model) {
            inner(from, to, model, payload)
        } else {
            Ok(payload)
        }
    })
}

/// `post(translate(pre(payload)))`. A `None` middleware registry falls back
/// to the process-wide default.
pub fn translate_request_with_middleware(
    middleware: Option<&MiddlewareRegistry>,
    registry: &Registry,
    from: &Format,
    to: &Format,
    model: &str,
    payload: &[u8],
    stream: bool,
) -> Result<Vec<u8>> {
    let default;
    let mw = match middleware {
        Some(mw) => mw,
        None => {
            default = crate::global::default_middleware();
            &*default
        }
    };
    let pre = mw.apply_pre(from, to, model, payload.to_vec())?;
    let translated = registry.translate_request(from, to, model, &pre, stream)?;
    mw.apply_post(from, to, model, translated)
}
