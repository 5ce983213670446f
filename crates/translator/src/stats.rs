//! Per-pair usage counters for the registry.

use rosetta_core::Format;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct PairCounters {
    pub total: AtomicU64,
    pub failed: AtomicU64,
    /// Cumulative translation time, for computing averages.
    pub nanos: AtomicU64,
}

/// Translation counters keyed by (from, to). Creation of a pair's counters
/// is double-checked: the read lock covers the hot path, the write lock only
/// first use of a pair.
#[derive(Default)]
pub(crate) struct TranslationStats {
    pairs: RwLock<HashMap<(Format, Format), Arc<PairCounters>>>,
}

impl TranslationStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, from: &Format, to: &Format) -> Arc<PairCounters> {
        // Fast path: read lock
        if let Ok(map) = self.pairs.read()
            && let Some(c) = map.get(&(from.clone(), to.clone()))
        {
            return c.clone();
        }
        // Slow path: write lock to insert
        let mut map = self.pairs.write().unwrap_or_else(|e| e.into_inner());
        map.entry((from.clone(), to.clone()))
            .or_insert_with(|| Arc::new(PairCounters::default()))
            .clone()
    }

    pub fn record(&self, from: &Format, to: &Format, duration: Duration, failed: bool) {
        let c = self.counters(from, to);
        c.total.fetch_add(1, Ordering::Relaxed);
        if failed {
            c.failed.fetch_add(1, Ordering::Relaxed);
        }
        c.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Flat snapshot: `"from->to:total"` and `"from->to:failed"` keys.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        let mut out = HashMap::new();
        if let Ok(map) = self.pairs.read() {
            for ((from, to), c) in map.iter() {
                out.insert(
                    format!("{from}->{to}:total"),
                    c.total.load(Ordering::Relaxed),
                );
                out.insert(
                    format!("{from}->{to}:failed"),
                    c.failed.load(Ordering::Relaxed),
                );
            }
        }
        out
    }

    /// Average translation duration per pair, in milliseconds.
    pub fn performance(&self) -> HashMap<String, f64> {
        let mut out = HashMap::new();
        if let Ok(map) = self.pairs.read() {
            for ((from, to), c) in map.iter() {
                let total = c.total.load(Ordering::Relaxed);
                if total == 0 {
                    continue;
                }
                let avg_ms =
                    c.nanos.load(Ordering::Relaxed) as f64 / total as f64 / 1_000_000.0;
                out.insert(format!("{from}->{to}"), avg_ms);
            }
        }
        out
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.pairs.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = TranslationStats::new();
        let from = Format::OpenAI;
        let to = Format::Claude;
        stats.record(&from, &to, Duration::from_millis(2), false);
        stats.record(&from, &to, Duration::from_millis(4), true);

        let snap = stats.snapshot();
        assert_eq!(snap["openai->claude:total"], 2);
        assert_eq!(snap["openai->claude:failed"], 1);
    }

    #[test]
    fn test_performance_average() {
        let stats = TranslationStats::new();
        stats.record(&Format::Gemini, &Format::OpenAI, Duration::from_millis(10), false);
        stats.record(&Format::Gemini, &Format::OpenAI, Duration::from_millis(20), false);

        let perf = stats.performance();
        let avg = perf["gemini->openai"];
        assert!((avg - 15.0).abs() < 0.5, "avg was {avg}");
    }

    #[test]
    fn test_clear() {
        let stats = TranslationStats::new();
        stats.record(&Format::OpenAI, &Format::Claude, Duration::ZERO, false);
        stats.clear();
        assert!(stats.snapshot().is_empty());
    }
}
