//! Parallel translation of independent requests with bounded worker
//! concurrency.

use crate::cache::{TranslationCache, cache_key};
use crate::registry::Registry;
use rosetta_core::{CancelHandle, Format, Result, TranslateError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub const DEFAULT_BATCH_WORKERS: usize = 4;

/// One request in a batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub model: String,
    pub payload: Vec<u8>,
    pub stream: bool,
}

impl BatchRequest {
    pub fn new(model: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            model: model.into(),
            payload,
            stream: false,
        }
    }
}

/// One completed batch item, annotated with its original index.
#[derive(Debug)]
pub struct BatchResult {
    pub index: usize,
    pub result: Result<Vec<u8>>,
    pub duration: Duration,
    pub cached: bool,
}

/// Duration/error rollup for a finished batch.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BatchStats {
    pub completed: usize,
    pub errors: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
}

/// Translates many independent requests through a shared registry, at most
/// `workers` at a time.
pub struct BatchTranslator {
    registry: Arc<Registry>,
    cache: Option<Arc<TranslationCache>>,
    workers: usize,
}

impl BatchTranslator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            cache: None,
            workers: DEFAULT_BATCH_WORKERS,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TranslationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Reconfigure worker concurrency; clamped to a minimum of 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Translate a batch. Results come back in request order, each
    /// annotated with its original index. Work not yet started when
    /// `cancel` fires completes as [`TranslateError::Canceled`].
    pub async fn translate_batch(
        &self,
        cancel: &CancelHandle,
        from: &Format,
        to: &Format,
        requests: Vec<BatchRequest>,
    ) -> Vec<BatchResult> {
        self.translate_batch_with(cancel, from, to, requests, |_| {})
            .await
    }

    /// Like [`BatchTranslator::translate_batch`], invoking `on_result` for
    /// each item as it completes (completion order, not request order).
    pub async fn translate_batch_with(
        &self,
        cancel: &CancelHandle,
        from: &Format,
        to: &Format,
        requests: Vec<BatchRequest>,
        mut on_result: impl FnMut(&BatchResult),
    ) -> Vec<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BatchResult>();
        let total = requests.len();

        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            let cache = self.cache.clone();
            let cancel = cancel.clone();
            let from = from.clone();
            let to = to.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let permit = if cancel.is_canceled() {
                    None
                } else {
                    tokio::select! {
                        biased;
                        _ = cancel.canceled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    }
                };
                let result = match permit {
                    None => BatchResult {
                        index,
                        result: Err(TranslateError::Canceled),
                        duration: Duration::ZERO,
                        cached: false,
                    },
                    Some(_permit) => {
                        let start = Instant::now();
                        let key = cache
                            .as_ref()
                            .map(|_| cache_key(&from, &to, &request.model, &request.payload));
                        let hit = match (&cache, &key) {
                            (Some(c), Some(k)) => c.get(k),
                            _ => None,
                        };
                        let (result, cached) = match hit {
                            Some(bytes) => (Ok(bytes), true),
                            None => {
                                let out = registry.translate_request(
                                    &from,
                                    &to,
                                    &request.model,
                                    &request.payload,
                                    request.stream,
                                );
                                if let (Some(c), Some(k), Ok(bytes)) = (&cache, &key, &out) {
                                    c.set(*k, bytes);
                                }
                                (out, false)
                            }
                        };
                        BatchResult {
                            index,
                            result,
                            duration: start.elapsed(),
                            cached,
                        }
                    }
                };
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let mut results: Vec<Option<BatchResult>> = (0..total).map(|_| None).collect();
        while let Some(result) = rx.recv().await {
            on_result(&result);
            let index = result.index;
            results[index] = Some(result);
        }
        results.into_iter().flatten().collect()
    }
}

/// Reduce batch durations into min/avg/max/total, counting errors.
pub fn batch_stats(results: &[BatchResult]) -> BatchStats {
    let errors = results.iter().filter(|r| r.result.is_err()).count();
    let durations: Vec<f64> = results
        .iter()
        .map(|r| r.duration.as_secs_f64() * 1000.0)
        .collect();
    let total: f64 = durations.iter().sum();
    let (min, max) = durations.iter().fold((f64::MAX, 0.0f64), |(lo, hi), &d| {
        (lo.min(d), hi.max(d))
    });
    BatchStats {
        completed: results.len(),
        errors,
        min_ms: if durations.is_empty() { 0.0 } else { min },
        avg_ms: if durations.is_empty() {
            0.0
        } else {
            total / durations.len() as f64
        },
        max_ms: max,
        total_ms: total,
    }
}
