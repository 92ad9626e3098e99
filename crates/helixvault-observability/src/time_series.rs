//! Rolling Request Time Series
//!
//! This module keeps a per-minute history of request outcomes for the last
//! 30 days. It answers questions like "how many requests failed in the last
//! hour?" without any external time-series database.
//!
//! ## Layout
//!
//! ```text
//!              current_index
//!                    │
//!                    ▼
//! requests  [ 12 | 40 | 7  | .. | 31 | 28 ]   SERIES_INTERVALS slots
//! errors    [ 0  | 1  | 0  | .. | 0  | 2  ]   (one slot = one minute)
//! warnings  [ 3  | 0  | 0  | .. | 1  | 0  ]
//! not_found [ 1  | 2  | 0  | .. | 0  | 0  ]
//!
//! grand totals: requests, errors, warnings, not_found (never decrease)
//! ```
//!
//! `rotate()` moves the cursor one slot forward once per minute and clears
//! the slot it lands on. When the cursor runs off the end it wraps to zero
//! and the `wrapped` flag is raised, from then on every slot holds history.
//!
//! ## Concurrency
//!
//! `add()` runs on every completed request, from any number of tasks at once.
//! It takes no lock:
//!
//! - The slot bump is a plain load followed by a store. Two tasks landing on
//!   the same slot in the same instant may lose one increment.
//! - The grand total is a `fetch_add` and is exact.
//!
//! As a consequence the sum of the slots may trail the grand total by a small
//! amount. Consumers look at trends, not at exact per-minute figures.
//!
//! `rotate()` is driven by a single maintenance task. A request that finishes
//! right at a minute boundary can be attributed to either minute.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Number of one-minute slots kept per counter (30 days).
pub const SERIES_INTERVALS: usize = 60 * 24 * 30;

/// Counter selector for [`RequestTimeSeries::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Request,
    Error,
    Warning,
    NotFound,
}

impl Counter {
    pub const ALL: [Counter; 4] = [
        Counter::Request,
        Counter::Error,
        Counter::Warning,
        Counter::NotFound,
    ];

    fn index(self) -> usize {
        match self {
            Counter::Request => 0,
            Counter::Error => 1,
            Counter::Warning => 2,
            Counter::NotFound => 3,
        }
    }
}

/// A requested window of history, in minutes relative to now.
///
/// `0` is the minute currently being collected, `-1` the minute before it.
/// Positive values are read as their magnitude so `(1, 5)` and `(-1, -5)`
/// select the same window. `aggregation` is the bucket width in minutes;
/// each reported value is the sum of that many consecutive minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteRange {
    pub start: i64,
    pub end: i64,
    #[serde(default = "default_aggregation")]
    pub aggregation: u64,
}

fn default_aggregation() -> u64 {
    1
}

impl MinuteRange {
    pub const fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            aggregation: 1,
        }
    }

    /// Same window, reported in buckets of `minutes`. Zero is read as one.
    pub const fn with_aggregation(self, minutes: u64) -> Self {
        Self {
            aggregation: if minutes == 0 { 1 } else { minutes },
            ..self
        }
    }

    /// Minutes back from now, nearest first.
    fn minutes_back(&self) -> (u64, u64) {
        let a = self.start.unsigned_abs();
        let b = self.end.unsigned_abs();
        (a.min(b), a.max(b))
    }
}

/// Values of one counter for one requested range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSeries {
    pub start: i64,
    pub end: i64,
    /// Minutes summed into each value.
    pub aggregation: u64,
    /// Bucketed values, nearest bucket first. The last bucket may be short.
    pub values: Vec<u64>,
    pub sum: u64,
}

/// One counter's share of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterReport {
    pub grand_total: u64,
    pub ranges: Vec<RangeSeries>,
}

/// Snapshot produced by [`RequestTimeSeries::serialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub minutes_collected: u64,
    pub wrapped: bool,
    pub requests: CounterReport,
    pub errors: CounterReport,
    pub warnings: CounterReport,
    pub not_found: CounterReport,
}

/// Lock-free 30-day per-minute request statistics.
///
/// Created once at process start and shared by reference (usually through
/// an `Arc`) with every request-handling context and with the rotation task.
pub struct RequestTimeSeries {
    slots: [Box<[AtomicU64]>; 4],
    totals: [AtomicU64; 4],
    current_index: AtomicUsize,
    wrapped: AtomicBool,
    /// Includes the current minute.
    minutes_collected: AtomicU64,
}

impl Default for RequestTimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTimeSeries {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| new_ring()),
            totals: std::array::from_fn(|_| AtomicU64::new(0)),
            current_index: AtomicUsize::new(0),
            wrapped: AtomicBool::new(false),
            minutes_collected: AtomicU64::new(1),
        }
    }

    /// Count one event in the current minute.
    pub fn add(&self, counter: Counter) {
        let idx = self.current_index.load(Ordering::Relaxed) % SERIES_INTERVALS;
        let slot = &self.slots[counter.index()][idx];

        // Deliberately not a fetch_add: concurrent bumps may collapse.
        let value = slot.load(Ordering::Relaxed);
        slot.store(value.wrapping_add(1), Ordering::Relaxed);

        self.totals[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished request: always a `Request`, plus the counter the
    /// status code maps to, if any.
    pub fn record_request(&self, status: u16) {
        self.add(Counter::Request);
        let counter = Self::request_status_to_counter(status);
        if counter != Counter::Request {
            self.add(counter);
        }
    }

    /// Classify a response status.
    ///
    /// Returns `Counter::Request` for a clean outcome, meaning nothing beyond
    /// the per-request count should be recorded.
    pub fn request_status_to_counter(status: u16) -> Counter {
        match status {
            404 => Counter::NotFound,
            s if s >= 500 => Counter::Error,
            s if s >= 400 => Counter::Warning,
            _ => Counter::Request,
        }
    }

    /// Advance to the next minute.
    ///
    /// Must only be called from the single maintenance task.
    pub fn rotate(&self) {
        let mut next = self.current_index.load(Ordering::Relaxed) + 1;
        if next >= SERIES_INTERVALS {
            next = 0;
            self.wrapped.store(true, Ordering::Relaxed);
        }

        for ring in &self.slots {
            ring[next].store(0, Ordering::Relaxed);
        }
        self.current_index.store(next, Ordering::Release);
        self.minutes_collected.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop all history and totals.
    pub fn reset(&self) {
        for ring in &self.slots {
            for slot in ring.iter() {
                slot.store(0, Ordering::Relaxed);
            }
        }
        for total in &self.totals {
            total.store(0, Ordering::Relaxed);
        }
        self.current_index.store(0, Ordering::Release);
        self.wrapped.store(false, Ordering::Relaxed);
        self.minutes_collected.store(1, Ordering::Relaxed);
    }

    pub fn current_index(&self) -> usize {
        self.current_index.load(Ordering::Acquire)
    }

    pub fn has_wrapped(&self) -> bool {
        self.wrapped.load(Ordering::Relaxed)
    }

    pub fn minutes_collected(&self) -> u64 {
        self.minutes_collected.load(Ordering::Relaxed)
    }

    pub fn grand_total(&self, counter: Counter) -> u64 {
        self.totals[counter.index()].load(Ordering::Relaxed)
    }

    /// Value of `counter` `minutes_back` minutes ago, `None` if that minute
    /// is outside the collected history.
    pub fn value_at(&self, counter: Counter, minutes_back: u64) -> Option<u64> {
        let current = self.current_index();
        let available = self.available_minutes(current);
        if minutes_back >= available as u64 {
            return None;
        }
        let idx = Self::slot_for(current, minutes_back as usize);
        Some(self.slots[counter.index()][idx].load(Ordering::Relaxed))
    }

    /// Ring position holding the oldest minute still retained.
    pub fn oldest_index(&self) -> usize {
        if self.has_wrapped() {
            (self.current_index() + 1) % SERIES_INTERVALS
        } else {
            0
        }
    }

    /// Build a report for the given windows.
    ///
    /// Windows reaching past the collected history are clamped. A window
    /// lying entirely outside it yields an empty series.
    pub fn serialize(&self, ranges: &[MinuteRange]) -> TimeSeriesReport {
        let current = self.current_index();
        let available = self.available_minutes(current);

        TimeSeriesReport {
            minutes_collected: self.minutes_collected(),
            wrapped: self.has_wrapped(),
            requests: self.serialize_counter(Counter::Request, ranges, current, available),
            errors: self.serialize_counter(Counter::Error, ranges, current, available),
            warnings: self.serialize_counter(Counter::Warning, ranges, current, available),
            not_found: self.serialize_counter(Counter::NotFound, ranges, current, available),
        }
    }

    fn serialize_counter(
        &self,
        counter: Counter,
        ranges: &[MinuteRange],
        current: usize,
        available: usize,
    ) -> CounterReport {
        let ring = &self.slots[counter.index()];
        let ranges = ranges
            .iter()
            .map(|range| {
                let (first, last) = range.minutes_back();
                let width = range.aggregation.max(1) as usize;
                let mut values = Vec::new();
                if (first as usize) < available {
                    let last = (last as usize).min(available - 1);
                    values.reserve((last - first as usize) / width + 1);
                    for (offset, back) in (first as usize..=last).enumerate() {
                        let idx = Self::slot_for(current, back);
                        let value = ring[idx].load(Ordering::Relaxed);
                        if offset % width == 0 {
                            values.push(value);
                        } else if let Some(bucket) = values.last_mut() {
                            *bucket += value;
                        }
                    }
                }
                let sum = values.iter().sum();
                RangeSeries {
                    start: range.start,
                    end: range.end,
                    aggregation: width as u64,
                    values,
                    sum,
                }
            })
            .collect();

        CounterReport {
            grand_total: self.grand_total(counter),
            ranges,
        }
    }

    fn available_minutes(&self, current: usize) -> usize {
        if self.has_wrapped() {
            SERIES_INTERVALS
        } else {
            current + 1
        }
    }

    fn slot_for(current: usize, minutes_back: usize) -> usize {
        (current + SERIES_INTERVALS - (minutes_back % SERIES_INTERVALS)) % SERIES_INTERVALS
    }
}

fn new_ring() -> Box<[AtomicU64]> {
    (0..SERIES_INTERVALS).map(|_| AtomicU64::new(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // ========================================================================
    // add / rotate
    // ========================================================================

    #[test]
    fn test_starts_empty() {
        let stats = RequestTimeSeries::new();
        assert_eq!(stats.current_index(), 0);
        assert!(!stats.has_wrapped());
        assert_eq!(stats.minutes_collected(), 1);
        for counter in Counter::ALL {
            assert_eq!(stats.grand_total(counter), 0);
            assert_eq!(stats.value_at(counter, 0), Some(0));
        }
    }

    #[test]
    fn test_add_counts_current_minute() {
        let stats = RequestTimeSeries::new();
        stats.add(Counter::Request);
        stats.add(Counter::Request);
        stats.add(Counter::Warning);

        assert_eq!(stats.value_at(Counter::Request, 0), Some(2));
        assert_eq!(stats.value_at(Counter::Warning, 0), Some(1));
        assert_eq!(stats.grand_total(Counter::Request), 2);
        assert_eq!(stats.grand_total(Counter::Warning), 1);
    }

    #[test]
    fn test_completed_minute_after_rotate() {
        let stats = RequestTimeSeries::new();
        for _ in 0..5 {
            stats.add(Counter::Request);
        }
        stats.add(Counter::Error);
        stats.rotate();

        let report = stats.serialize(&[MinuteRange::new(-1, -1)]);
        assert_eq!(report.requests.ranges[0].values, vec![5]);
        assert_eq!(report.errors.ranges[0].values, vec![1]);
        assert_eq!(report.warnings.ranges[0].values, vec![0]);
        assert_eq!(report.not_found.ranges[0].values, vec![0]);

        assert_eq!(report.requests.grand_total, 5);
        assert_eq!(report.errors.grand_total, 1);
        assert_eq!(stats.value_at(Counter::Request, 0), Some(0));
    }

    #[test]
    fn test_rotate_clears_landing_slot() {
        let stats = RequestTimeSeries::new();
        stats.add(Counter::Request);
        for _ in 0..SERIES_INTERVALS {
            stats.rotate();
        }
        // Back on slot 0, which must have been cleared.
        assert_eq!(stats.current_index(), 0);
        assert_eq!(stats.value_at(Counter::Request, 0), Some(0));
        assert_eq!(stats.grand_total(Counter::Request), 1);
    }

    #[test]
    fn test_wraps_after_full_cycle() {
        let stats = RequestTimeSeries::new();
        stats.add(Counter::Request);

        for _ in 0..SERIES_INTERVALS - 1 {
            stats.rotate();
        }
        assert!(!stats.has_wrapped());
        assert_eq!(stats.current_index(), SERIES_INTERVALS - 1);

        stats.rotate();
        stats.rotate();
        assert!(stats.has_wrapped());
        assert_eq!(stats.current_index(), 1);
        assert_eq!(stats.oldest_index(), 2);
        assert_eq!(stats.minutes_collected(), SERIES_INTERVALS as u64 + 2);
    }

    // ========================================================================
    // serialize
    // ========================================================================

    #[test]
    fn test_serialize_clamps_to_history() {
        let stats = RequestTimeSeries::new();
        stats.add(Counter::Request);
        stats.rotate();
        stats.add(Counter::Request);
        stats.add(Counter::Request);

        let report = stats.serialize(&[MinuteRange::new(0, -100)]);
        assert_eq!(report.requests.ranges[0].values, vec![2, 1]);
        assert_eq!(report.requests.ranges[0].sum, 3);
    }

    #[test]
    fn test_serialize_out_of_history_is_empty() {
        let stats = RequestTimeSeries::new();
        let report = stats.serialize(&[MinuteRange::new(-10, -20)]);
        assert!(report.requests.ranges[0].values.is_empty());
        assert_eq!(report.requests.ranges[0].sum, 0);
    }

    #[test]
    fn test_serialize_accepts_swapped_and_positive_bounds() {
        let stats = RequestTimeSeries::new();
        stats.add(Counter::Error);
        stats.rotate();
        stats.rotate();

        let a = stats.serialize(&[MinuteRange::new(-2, 0)]);
        let b = stats.serialize(&[MinuteRange::new(2, 0)]);
        assert_eq!(a.errors.ranges[0].values, vec![0, 0, 1]);
        assert_eq!(a.errors.ranges[0].values, b.errors.ranges[0].values);
    }

    #[test]
    fn test_serialize_reads_across_wrap() {
        let stats = RequestTimeSeries::new();
        for _ in 0..SERIES_INTERVALS - 1 {
            stats.rotate();
        }
        stats.add(Counter::NotFound); // last slot
        stats.rotate(); // wraps to slot 0
        stats.add(Counter::NotFound);
        stats.add(Counter::NotFound);

        let report = stats.serialize(&[MinuteRange::new(0, -1)]);
        assert_eq!(report.not_found.ranges[0].values, vec![2, 1]);

        let full = stats.serialize(&[MinuteRange::new(0, -(SERIES_INTERVALS as i64) * 2)]);
        assert_eq!(full.not_found.ranges[0].values.len(), SERIES_INTERVALS);
    }

    #[test]
    fn test_serialize_keeps_range_order() {
        let stats = RequestTimeSeries::new();
        let report = stats.serialize(&[MinuteRange::new(0, 0), MinuteRange::new(-5, -1)]);
        assert_eq!(report.requests.ranges.len(), 2);
        assert_eq!(report.requests.ranges[0].start, 0);
        assert_eq!(report.requests.ranges[1].start, -5);
    }

    #[test]
    fn test_serialize_aggregates_buckets_nearest_first() {
        let stats = RequestTimeSeries::new();
        // Minutes back 4..=0 carry 1, 2, 3, 4, 5 requests
        for minute in 1..=5u64 {
            for _ in 0..minute {
                stats.add(Counter::Request);
            }
            if minute < 5 {
                stats.rotate();
            }
        }

        let report = stats.serialize(&[MinuteRange::new(0, -4).with_aggregation(2)]);
        let series = &report.requests.ranges[0];
        assert_eq!(series.aggregation, 2);
        // Buckets [0,1], [2,3] and the short [4]
        assert_eq!(series.values, vec![9, 5, 1]);
        assert_eq!(series.sum, 15);

        let plain = stats.serialize(&[MinuteRange::new(0, -4)]);
        assert_eq!(plain.requests.ranges[0].values, vec![5, 4, 3, 2, 1]);
        assert_eq!(plain.requests.ranges[0].sum, series.sum);
    }

    #[test]
    fn test_zero_aggregation_reads_as_one_minute() {
        let range = MinuteRange::new(0, -59).with_aggregation(0);
        assert_eq!(range.aggregation, 1);
        assert_eq!(MinuteRange::new(0, -59), range);
    }

    // ========================================================================
    // reset / classification
    // ========================================================================

    #[test]
    fn test_reset_restores_initial_state() {
        let stats = RequestTimeSeries::new();
        stats.record_request(500);
        stats.rotate();
        stats.record_request(404);

        stats.reset();
        assert_eq!(stats.current_index(), 0);
        assert!(!stats.has_wrapped());
        assert_eq!(stats.minutes_collected(), 1);
        for counter in Counter::ALL {
            assert_eq!(stats.grand_total(counter), 0);
        }
        assert_eq!(stats.value_at(Counter::Request, 0), Some(0));
        assert_eq!(stats.value_at(Counter::Request, 1), None);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(RequestTimeSeries::request_status_to_counter(200), Counter::Request);
        assert_eq!(RequestTimeSeries::request_status_to_counter(304), Counter::Request);
        assert_eq!(RequestTimeSeries::request_status_to_counter(404), Counter::NotFound);
        assert_eq!(RequestTimeSeries::request_status_to_counter(400), Counter::Warning);
        assert_eq!(RequestTimeSeries::request_status_to_counter(429), Counter::Warning);
        assert_eq!(RequestTimeSeries::request_status_to_counter(500), Counter::Error);
        assert_eq!(RequestTimeSeries::request_status_to_counter(503), Counter::Error);
    }

    #[test]
    fn test_record_request_success_counts_only_request() {
        let stats = RequestTimeSeries::new();
        stats.record_request(200);
        assert_eq!(stats.grand_total(Counter::Request), 1);
        assert_eq!(stats.grand_total(Counter::Error), 0);
        assert_eq!(stats.grand_total(Counter::Warning), 0);
        assert_eq!(stats.grand_total(Counter::NotFound), 0);
    }

    #[test]
    fn test_record_request_failure_counts_both() {
        let stats = RequestTimeSeries::new();
        stats.record_request(503);
        stats.record_request(404);
        assert_eq!(stats.grand_total(Counter::Request), 2);
        assert_eq!(stats.grand_total(Counter::Error), 1);
        assert_eq!(stats.grand_total(Counter::NotFound), 1);
    }

    // ========================================================================
    // concurrency
    // ========================================================================

    #[test]
    fn test_concurrent_adds_stay_bounded() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 10_000;

        let stats = Arc::new(RequestTimeSeries::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        stats.add(Counter::Request);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = stats.grand_total(Counter::Request);
        assert!(total >= PER_THREAD);
        assert!(total <= THREADS * PER_THREAD);

        let slot = stats.value_at(Counter::Request, 0).unwrap();
        assert!(slot >= 1);
        assert!(slot <= total);
    }
}
