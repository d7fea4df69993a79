//! Memoized window series
//!
//! Entries are keyed by the full parameter set plus the record-set version, so
//! a hit is always the value a fresh computation would return. Dropping the
//! cache never changes results.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::window::{LatencyWindow, ThroughputWindow, WindowMode};

/// Identifies one computed series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKey {
    /// Throughput with the given window size (f64 bits)
    Throughput {
        /// Record-set version
        version: u64,
        /// `window_size_ms.to_bits()`
        window_bits: u64,
    },
    /// Latency with the given window size and step (f64 bits)
    Latency {
        /// Record-set version
        version: u64,
        /// `window_size_ms.to_bits()`
        window_bits: u64,
        /// Step bits; equal to `window_bits` in fixed mode
        step_bits: u64,
        /// Whether windows slide
        sliding: bool,
    },
}

impl SeriesKey {
    /// Key for a throughput series
    #[must_use]
    pub fn throughput(version: u64, window_size_ms: f64) -> Self {
        Self::Throughput {
            version,
            window_bits: window_size_ms.to_bits(),
        }
    }

    /// Key for a latency series
    #[must_use]
    pub fn latency(version: u64, window_size_ms: f64, mode: WindowMode) -> Self {
        let (step, sliding) = match mode {
            WindowMode::Fixed => (window_size_ms, false),
            WindowMode::Sliding { step_ms } => (step_ms, true),
        };
        Self::Latency {
            version,
            window_bits: window_size_ms.to_bits(),
            step_bits: step.to_bits(),
            sliding,
        }
    }
}

#[derive(Clone)]
enum Series {
    Throughput(Arc<[ThroughputWindow]>),
    Latency(Arc<[LatencyWindow]>),
}

/// Thread-safe memo of computed window series
#[derive(Default)]
pub struct WindowCache {
    entries: Mutex<HashMap<SeriesKey, Series>>,
}

impl WindowCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached throughput series, computing it on a miss
    pub fn throughput<E>(
        &self,
        key: SeriesKey,
        compute: impl FnOnce() -> Result<Vec<ThroughputWindow>, E>,
    ) -> Result<Arc<[ThroughputWindow]>, E> {
        if let Some(Series::Throughput(series)) = self.entries.lock().get(&key) {
            return Ok(Arc::clone(series));
        }
        let series: Arc<[ThroughputWindow]> = compute()?.into();
        self.entries
            .lock()
            .insert(key, Series::Throughput(Arc::clone(&series)));
        Ok(series)
    }

    /// Cached latency series, computing it on a miss
    pub fn latency<E>(
        &self,
        key: SeriesKey,
        compute: impl FnOnce() -> Result<Vec<LatencyWindow>, E>,
    ) -> Result<Arc<[LatencyWindow]>, E> {
        if let Some(Series::Latency(series)) = self.entries.lock().get(&key) {
            return Ok(Arc::clone(series));
        }
        let series: Arc<[LatencyWindow]> = compute()?.into();
        self.entries
            .lock()
            .insert(key, Series::Latency(Arc::clone(&series)));
        Ok(series)
    }

    /// Number of cached series
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every cached series
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_hit_skips_compute() {
        let cache = WindowCache::new();
        let calls = Cell::new(0);
        let key = SeriesKey::throughput(1, 1000.0);
        for _ in 0..3 {
            let series = cache
                .throughput(key, || {
                    calls.set(calls.get() + 1);
                    Ok::<_, ()>(Vec::new())
                })
                .unwrap();
            assert!(series.is_empty());
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_version_and_params_are_part_of_key() {
        assert_ne!(SeriesKey::throughput(1, 1000.0), SeriesKey::throughput(2, 1000.0));
        assert_ne!(SeriesKey::throughput(1, 1000.0), SeriesKey::throughput(1, 500.0));
        assert_ne!(
            SeriesKey::latency(1, 1000.0, WindowMode::Fixed),
            SeriesKey::latency(1, 1000.0, WindowMode::Sliding { step_ms: 1000.0 })
        );
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = WindowCache::new();
        let key = SeriesKey::latency(0, 1000.0, WindowMode::Fixed);
        assert!(cache.latency(key, || Err::<Vec<LatencyWindow>, _>("boom")).is_err());
        assert!(cache.is_empty());
    }
}
