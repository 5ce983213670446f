//! Thread-safe store of request/response transforms indexed by
//! (from, to) format pairs, with eager and lazy registration.

use crate::stats::TranslationStats;
use crate::{Carry, RequestTransform, ResponseTransform};
use rosetta_core::{Format, Result, TransformCtx, TranslateError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Instant;

type PairKey = (Format, Format);
type LazyProduct = (Option<RequestTransform>, Option<ResponseTransform>);
type LazySupplier = Box<dyn FnOnce() -> LazyProduct + Send>;

/// One-shot supplier that materializes its transforms on first need.
///
/// The per-entry mutex guarantees the supplier runs exactly once even under
/// concurrent first use, without holding the registry write lock across
/// user code.
struct LazyEntry {
    provides_request: bool,
    provides_response: bool,
    supplier: Mutex<Option<LazySupplier>>,
    value: OnceLock<LazyProduct>,
}

impl LazyEntry {
    fn new(provides_request: bool, provides_response: bool, supplier: LazySupplier) -> Self {
        Self {
            provides_request,
            provides_response,
            supplier: Mutex::new(Some(supplier)),
            value: OnceLock::new(),
        }
    }

    fn force(&self) -> LazyProduct {
        if let Some(v) = self.value.get() {
            return v.clone();
        }
        let mut guard = self.supplier.lock().unwrap_or_else(|e| e.into_inner());
        // Re-check: another caller may have materialized while we waited.
        if let Some(v) = self.value.get() {
            return v.clone();
        }
        match guard.take() {
            Some(supplier) => {
                let v = supplier();
                let _ = self.value.set(v.clone());
                v
            }
            None => self.value.get().cloned().unwrap_or_default(),
        }
    }
}

/// Registry of format-to-format transforms.
///
/// Transforms are externally defined and referentially shared; the registry
/// owns its tables. All entry points are safe under concurrent invocation:
/// lookups take the read side, registration and lazy promotion the write
/// side.
pub struct Registry {
    requests: RwLock<HashMap<PairKey, RequestTransform>>,
    responses: RwLock<HashMap<PairKey, ResponseTransform>>,
    lazy: RwLock<HashMap<PairKey, Arc<LazyEntry>>>,
    stats: TranslationStats,
    debug: AtomicBool,
    dry_run: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            responses: RwLock::new(HashMap::new()),
            lazy: RwLock::new(HashMap::new()),
            stats: TranslationStats::new(),
            debug: AtomicBool::new(false),
            dry_run: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Insert or overwrite both sides of a pair in one critical section.
    /// `None` on either side records "no transform" for that side.
    pub fn register(
        &self,
        from: Format,
        to: Format,
        request: Option<RequestTransform>,
        response: Option<ResponseTransform>,
    ) {
        let key = (from, to);
        let mut requests = self.requests.write().unwrap_or_else(|e| e.into_inner());
        let mut responses = self.responses.write().unwrap_or_else(|e| e.into_inner());
        match request {
            Some(f) => {
                requests.insert(key.clone(), f);
            }
            None => {
                requests.remove(&key);
            }
        }
        match response {
            Some(r) => {
                responses.insert(key, r);
            }
            None => {
                responses.remove(&key);
            }
        }
    }

    /// Record a one-shot supplier for the request side of a pair.
    pub fn register_lazy(
        &self,
        from: Format,
        to: Format,
        supplier: impl FnOnce() -> RequestTransform + Send + 'static,
    ) {
        self.insert_lazy(
            from,
            to,
            true,
            false,
            Box::new(move || (Some(supplier()), None)),
        );
    }

    /// Record a one-shot supplier for the response side of a pair.
    pub fn register_lazy_response(
        &self,
        from: Format,
        to: Format,
        supplier: impl FnOnce() -> ResponseTransform + Send + 'static,
    ) {
        self.insert_lazy(
            from,
            to,
            false,
            true,
            Box::new(move || (None, Some(supplier()))),
        );
    }

    /// Record a one-shot supplier for both sides of a pair.
    pub fn register_lazy_both(
        &self,
        from: Format,
        to: Format,
        supplier: impl FnOnce() -> (RequestTransform, ResponseTransform) + Send + 'static,
    ) {
        self.insert_lazy(
            from,
            to,
            true,
            true,
            Box::new(move || {
                let (req, resp) = supplier();
                (Some(req), Some(resp))
            }),
        );
    }

    fn insert_lazy(
        &self,
        from: Format,
        to: Format,
        provides_request: bool,
        provides_response: bool,
        supplier: LazySupplier,
    ) {
        let entry = Arc::new(LazyEntry::new(provides_request, provides_response, supplier));
        self.lazy
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((from, to), entry);
    }

    /// Remove both eager and lazy entries for a pair.
    pub fn unregister(&self, from: &Format, to: &Format) {
        let key = (from.clone(), to.clone());
        self.requests
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        self.lazy
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
    }

    /// Remove every eager and lazy entry.
    pub fn clear(&self) {
        self.requests
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.lazy.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Force a lazy entry and promote its transforms into the eager tables.
    /// An eager transform registered in the meantime wins over the lazy one.
    fn materialize(&self, key: &PairKey) -> LazyProduct {
        let entry = {
            let lazy = self.lazy.read().unwrap_or_else(|e| e.into_inner());
            lazy.get(key).cloned()
        };
        let Some(entry) = entry else {
            return (None, None);
        };
        let (req, resp) = entry.force();
        if let Some(ref f) = req {
            self.requests
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .entry(key.clone())
                .or_insert_with(|| f.clone());
        }
        if let Some(ref r) = resp {
            self.responses
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .entry(key.clone())
                .or_insert_with(|| r.clone());
        }
        self.lazy
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        (req, resp)
    }

    fn request_transform(&self, from: &Format, to: &Format) -> Option<RequestTransform> {
        let key = (from.clone(), to.clone());
        if let Some(f) = self
            .requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Some(f.clone());
        }
        self.materialize(&key).0
    }

    /// Response transform keyed by its own conversion direction
    /// (a transform registered under (X, Y) rewrites X-schema responses
    /// into the Y schema).
    fn response_transform(&self, from: &Format, to: &Format) -> Option<ResponseTransform> {
        let key = (from.clone(), to.clone());
        if let Some(r) = self
            .responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Some(r.clone());
        }
        self.materialize(&key).1
    }

    pub fn has_request_translator(&self, from: &Format, to: &Format) -> bool {
        if from == to {
            return true;
        }
        let key = (from.clone(), to.clone());
        if self
            .requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&key)
        {
            return true;
        }
        self.lazy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .is_some_and(|e| e.provides_request)
    }

    pub fn has_response_transformer(&self, from: &Format, to: &Format) -> bool {
        let key = (from.clone(), to.clone());
        if self
            .responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&key)
        {
            return true;
        }
        self.lazy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .is_some_and(|e| e.provides_response)
    }

    // ========================================================================
    // Request translation
    // ========================================================================

    /// Translate a request payload, tolerating a missing transform.
    ///
    /// On a miss (and `from != to`) the input is returned unchanged and the
    /// pair's failure counter increments. Best-effort paths (chain hops, the
    /// resolver) use this; dispatch boundaries that must surface a missing
    /// translator use [`Registry::must_translate_request`].
    pub fn translate_request(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: &[u8],
        stream: bool,
    ) -> Result<Vec<u8>> {
        if from == to {
            return Ok(payload.to_vec());
        }
        let start = Instant::now();
        match self.request_transform(from, to) {
            Some(f) => {
                let out = f(model, payload, stream);
                match out {
                    Ok(bytes) => {
                        self.stats.record(from, to, start.elapsed(), false);
                        if self.debug_enabled() {
                            self.log_debug_diff(from, to, payload, &bytes);
                        }
                        Ok(bytes)
                    }
                    Err(e) => {
                        self.stats.record(from, to, start.elapsed(), true);
                        Err(e)
                    }
                }
            }
            None => {
                self.stats.record(from, to, start.elapsed(), true);
                Ok(payload.to_vec())
            }
        }
    }

    /// Like [`Registry::translate_request`], but a missing transform is a
    /// [`TranslateError::NoTranslator`] instead of a silent passthrough.
    /// In dry-run mode, logs and returns the input unchanged.
    pub fn must_translate_request(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: &[u8],
        stream: bool,
    ) -> Result<Vec<u8>> {
        if self.dry_run_enabled() {
            tracing::info!(%from, %to, %model, "dry-run: skipping translation");
            return Ok(payload.to_vec());
        }
        if from == to {
            return Ok(payload.to_vec());
        }
        let start = Instant::now();
        match self.request_transform(from, to) {
            Some(f) => {
                let out = f(model, payload, stream);
                match out {
                    Ok(bytes) => {
                        self.stats.record(from, to, start.elapsed(), false);
                        if self.debug_enabled() {
                            self.log_debug_diff(from, to, payload, &bytes);
                        }
                        Ok(bytes)
                    }
                    Err(e) => {
                        self.stats.record(from, to, start.elapsed(), true);
                        Err(e)
                    }
                }
            }
            None => {
                self.stats.record(from, to, start.elapsed(), true);
                Err(TranslateError::NoTranslator {
                    from: from.clone(),
                    to: to.clone(),
                })
            }
        }
    }

    // ========================================================================
    // Response translation
    // ========================================================================

    /// Translate one upstream SSE chunk back into the request's source
    /// schema. `from`/`to` are the REQUEST direction: responses flow back in
    /// the `to` schema, so the response table is consulted at (to, from).
    ///
    /// A miss passes the chunk through unchanged. The caller owns `carry`
    /// and must use a fresh one per stream.
    #[allow(clippy::too_many_arguments)]
    pub fn translate_stream(
        &self,
        ctx: &TransformCtx,
        from: &Format,
        to: &Format,
        model: &str,
        original_request: &[u8],
        translated_request: &[u8],
        event: Option<&str>,
        chunk: &[u8],
        carry: &mut Carry,
    ) -> Result<Vec<String>> {
        if from == to {
            return Ok(vec![String::from_utf8_lossy(chunk).to_string()]);
        }
        // Translators emit their own end-of-stream sentinel.
        if chunk == b"[DONE]" {
            return Ok(vec!["[DONE]".to_string()]);
        }
        match self.response_transform(to, from).and_then(|r| r.stream) {
            Some(f) => {
                if self.debug_enabled() {
                    tracing::trace!(%from, %to, event = event.unwrap_or(""), len = chunk.len(), "stream chunk");
                }
                f(ctx, model, original_request, translated_request, event, chunk, carry)
            }
            None => Ok(vec![String::from_utf8_lossy(chunk).to_string()]),
        }
    }

    /// Translate a complete upstream response body back into the request's
    /// source schema. A miss returns the body unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn translate_non_stream(
        &self,
        ctx: &TransformCtx,
        from: &Format,
        to: &Format,
        model: &str,
        original_request: &[u8],
        translated_request: &[u8],
        body: &[u8],
    ) -> Result<String> {
        if from == to {
            return Ok(String::from_utf8_lossy(body).to_string());
        }
        match self.response_transform(to, from).and_then(|r| r.non_stream) {
            Some(f) => {
                let out = f(ctx, model, original_request, translated_request, body)?;
                if self.debug_enabled() {
                    self.log_debug_diff(from, to, body, out.as_bytes());
                }
                Ok(out)
            }
            None => Ok(String::from_utf8_lossy(body).to_string()),
        }
    }

    /// Render a token count in the source schema. A miss renders the bare
    /// number.
    pub fn translate_token_count(
        &self,
        ctx: &TransformCtx,
        from: &Format,
        to: &Format,
        count: u64,
    ) -> String {
        if from == to {
            return count.to_string();
        }
        match self.response_transform(to, from).and_then(|r| r.token_count) {
            Some(f) => f(ctx, count),
            None => count.to_string(),
        }
    }

    // ========================================================================
    // Path validation
    // ========================================================================

    /// A pair is a valid proxy path when the request direction (from, to)
    /// and the returning response direction (to, from) are both covered.
    pub fn validate_translation_path(&self, from: &Format, to: &Format) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if !self.has_request_translator(from, to) {
            return Err(TranslateError::NoTranslator {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if !self.has_response_transformer(to, from) {
            return Err(TranslateError::NoTranslator {
                from: to.clone(),
                to: from.clone(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_dry_run(&self, enabled: bool) {
        self.dry_run.store(enabled, Ordering::Relaxed);
    }

    pub fn dry_run_enabled(&self) -> bool {
        self.dry_run.load(Ordering::Relaxed)
    }

    /// Flat per-pair counters: `{"from->to:total": n, "from->to:failed": n}`.
    pub fn get_translation_stats(&self) -> HashMap<String, u64> {
        self.stats.snapshot()
    }

    /// Average translation duration per pair, milliseconds.
    pub fn get_performance_metrics(&self) -> HashMap<String, f64> {
        self.stats.performance()
    }

    /// Registered pair keys, eager and lazy, requests and responses merged.
    pub(crate) fn pair_keys(&self) -> Vec<(PairKey, bool, bool)> {
        let mut seen: HashMap<PairKey, (bool, bool)> = HashMap::new();
        for key in self
            .requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
        {
            seen.entry(key.clone()).or_default().0 = true;
        }
        for key in self
            .responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
        {
            seen.entry(key.clone()).or_default().1 = true;
        }
        for (key, entry) in self.lazy.read().unwrap_or_else(|e| e.into_inner()).iter() {
            let slot = seen.entry(key.clone()).or_default();
            slot.0 |= entry.provides_request;
            slot.1 |= entry.provides_response;
        }
        seen.into_iter()
            .map(|(k, (req, resp))| (k, req, resp))
            .collect()
    }

    /// Eager response capabilities for a pair, if materialized.
    pub(crate) fn response_capabilities(&self, key: &PairKey) -> Option<(bool, bool, bool)> {
        self.responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|r| {
                (
                    r.stream.is_some(),
                    r.non_stream.is_some(),
                    r.token_count.is_some(),
                )
            })
    }

    fn log_debug_diff(&self, from: &Format, to: &Format, before: &[u8], after: &[u8]) {
        const SNIPPET: usize = 500;
        let before_snip = &before[..before.len().min(SNIPPET)];
        let after_snip = &after[..after.len().min(SNIPPET)];
        tracing::debug!(
            %from,
            %to,
            before = %String::from_utf8_lossy(before_snip),
            after = %String::from_utf8_lossy(after_snip),
            "translation snapshot"
        );
        if let Ok(cmp) = crate::quality::compare_json_structures(before, after) {
            for diff in &cmp.diffs {
                tracing::debug!(path = %diff.path, kind = ?diff.diff_type, "field diff");
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Registry {
    /// Independent registry sharing transform function references but not
    /// the maps themselves. Usage counters start fresh.
    fn clone(&self) -> Self {
        let requests = self
            .requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let responses = self
            .responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let lazy = self.lazy.read().unwrap_or_else(|e| e.into_inner()).clone();
        Self {
            requests: RwLock::new(requests),
            responses: RwLock::new(responses),
            lazy: RwLock::new(lazy),
            stats: TranslationStats::new(),
            debug: AtomicBool::new(self.debug_enabled()),
            dry_run: AtomicBool::new(self.dry_run_enabled()),
        }
    }
}
