//! In-process translation benchmarking with percentile summaries.

use crate::registry::Registry;
use rosetta_core::{CancelHandle, Format};
use std::time::{Duration, Instant};

/// Summary over repeated translations of one payload.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BenchmarkReport {
    pub requested_iterations: usize,
    pub completed_iterations: usize,
    pub canceled: bool,
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// Run the same translation `iterations` times and summarize the
/// durations. Cancellation is honored between iterations: the current one
/// finishes, then the loop stops.
#[allow(clippy::too_many_arguments)]
pub fn benchmark_translation(
    cancel: &CancelHandle,
    registry: &Registry,
    from: &Format,
    to: &Format,
    model: &str,
    payload: &[u8],
    stream: bool,
    iterations: usize,
) -> BenchmarkReport {
    let mut durations = Vec::with_capacity(iterations);
    let mut canceled = false;

    for _ in 0..iterations {
        if cancel.is_canceled() {
            canceled = true;
            break;
        }
        let start = Instant::now();
        let _ = registry.translate_request(from, to, model, payload, stream);
        durations.push(start.elapsed());
    }

    durations.sort_unstable();
    let completed = durations.len();
    let total: Duration = durations.iter().sum();
    BenchmarkReport {
        requested_iterations: iterations,
        completed_iterations: completed,
        canceled,
        min: durations.first().copied().unwrap_or_default(),
        avg: total.checked_div(completed.max(1) as u32).unwrap_or_default(),
        max: durations.last().copied().unwrap_or_default(),
        p50: percentile(&durations, 50),
        p95: percentile(&durations, 95),
        p99: percentile(&durations, 99),
    }
}

/// Nearest-rank percentile over sorted durations.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register(
            Format::OpenAI,
            Format::Claude,
            Some(Arc::new(|_, p, _| Ok(p.to_vec()))),
            None,
        );
        registry
    }

    #[test]
    fn test_benchmark_runs_all_iterations() {
        let cancel = CancelHandle::new();
        let report = benchmark_translation(
            &cancel,
            &registry(),
            &Format::OpenAI,
            &Format::Claude,
            "m",
            b"{\"x\":1}",
            false,
            25,
        );
        assert_eq!(report.completed_iterations, 25);
        assert!(!report.canceled);
        assert!(report.min <= report.p50);
        assert!(report.p50 <= report.p95);
        assert!(report.p95 <= report.p99);
        assert!(report.p99 <= report.max);
    }

    #[test]
    fn test_benchmark_canceled_before_start() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let report = benchmark_translation(
            &cancel,
            &registry(),
            &Format::OpenAI,
            &Format::Claude,
            "m",
            b"{}",
            false,
            10,
        );
        assert!(report.canceled);
        assert_eq!(report.completed_iterations, 0);
        assert_eq!(report.min, Duration::ZERO);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&sorted, 50), Duration::from_millis(50));
        assert_eq!(percentile(&sorted, 95), Duration::from_millis(95));
        assert_eq!(percentile(&sorted, 99), Duration::from_millis(99));
    }
}
