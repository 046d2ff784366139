//! In-memory aggregation state.

use std::collections::BTreeMap;

use tally_common::UnixTimestamp;

use crate::flush::FlushBatch;
use crate::percentile::PercentileSpec;
use crate::protocol::MetricType;
use crate::sample::Sample;

/// Gauge value marking that a gauge has not been updated since it was last reported.
///
/// A gauge that is actually set to this value is indistinguishable from an idle gauge and will
/// not be reported.
pub const GAUGE_SENTINEL: i64 = -1;

/// Parameters used by the [`Aggregator`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatorConfig {
    /// Number of flushes that report `0` for a counter after it became idle.
    pub persist_count_keys: u32,
    /// Percentile thresholds reported for every timer.
    pub percent_thresholds: Vec<PercentileSpec>,
}

/// Reporting state of a counter bucket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CounterState {
    /// Holds a count that is reported on the next flush.
    Active(i64),
    /// The count has been reported. The counter keeps reporting `0` for `remaining` flushes.
    Decaying {
        /// Number of flushes left that report `0`. Always at least `1`.
        remaining: u32,
    },
    /// The counter is idle and no longer reported until it receives a new sample.
    Expired,
}

impl CounterState {
    fn decaying(remaining: u32) -> Self {
        match remaining {
            0 => Self::Expired,
            remaining => Self::Decaying { remaining },
        }
    }

    /// Adds a weighted sample to the counter.
    ///
    /// Decaying and expired counters restart from zero.
    fn add(&mut self, weight: i64) {
        *self = match *self {
            Self::Active(value) => Self::Active(value.saturating_add(weight)),
            Self::Decaying { .. } | Self::Expired => Self::Active(weight),
        };
    }
}

/// Aggregates samples per bucket between flushes.
///
/// Counters, gauges and timers live in separate tables, so the same bucket name can be used for
/// different metric types. Buckets are created on their first sample and are never removed.
///
/// The aggregator is not synchronized. It is owned by a single task, see
/// [`AggregatorService`](crate::AggregatorService).
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregator {
    config: AggregatorConfig,
    counters: BTreeMap<String, CounterState>,
    gauges: BTreeMap<String, i64>,
    timers: BTreeMap<String, Vec<i64>>,
}

impl Aggregator {
    /// Creates a new, empty aggregator.
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            counters: BTreeMap::new(),
            gauges: BTreeMap::new(),
            timers: BTreeMap::new(),
        }
    }

    /// Returns the configuration of this aggregator.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Adds a sample to its bucket.
    pub fn insert(&mut self, sample: Sample) {
        match sample.ty {
            MetricType::Counter => {
                let weight = sample.weight();
                self.counters
                    .entry(sample.bucket)
                    .or_insert(CounterState::Expired)
                    .add(weight);
            }
            MetricType::Gauge => {
                self.gauges.insert(sample.bucket, sample.value);
            }
            MetricType::Timer => {
                self.timers.entry(sample.bucket).or_default().push(sample.value);
            }
        }
    }

    /// Returns the state of a counter bucket.
    pub fn counter(&self, bucket: &str) -> Option<CounterState> {
        self.counters.get(bucket).copied()
    }

    /// Returns the current value of a gauge bucket.
    pub fn gauge(&self, bucket: &str) -> Option<i64> {
        self.gauges.get(bucket).copied()
    }

    /// Returns the buffered observations of a timer bucket.
    pub fn timer(&self, bucket: &str) -> Option<&[i64]> {
        self.timers.get(bucket).map(Vec::as_slice)
    }

    /// Returns the total number of buckets across all types.
    pub fn bucket_count(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.timers.len()
    }

    /// Serializes all reportable buckets and advances their state.
    ///
    /// - Active counters report their count and start decaying. Decaying counters report `0`
    ///   until the persistence window has passed, then they expire.
    /// - Updated gauges report their value and are reset to [`GAUGE_SENTINEL`].
    /// - Timers with observations report their summary. All timer buffers are cleared.
    ///
    /// Buckets are written in the order counters, gauges, timers, each sorted by name.
    pub fn flush(&mut self, timestamp: UnixTimestamp) -> FlushBatch {
        let mut batch = FlushBatch::new(timestamp);

        for (bucket, state) in &mut self.counters {
            match *state {
                CounterState::Active(value) => {
                    batch.push_value(bucket, value);
                    *state = CounterState::decaying(self.config.persist_count_keys);
                }
                CounterState::Decaying { remaining } => {
                    batch.push_value(bucket, 0);
                    *state = CounterState::decaying(remaining - 1);
                }
                CounterState::Expired => (),
            }
        }

        for (bucket, value) in &mut self.gauges {
            if *value == GAUGE_SENTINEL {
                continue;
            }

            batch.push_value(bucket, *value);
            *value = GAUGE_SENTINEL;
        }

        for (bucket, values) in &mut self.timers {
            if !values.is_empty() {
                values.sort_unstable();
                batch.push_timer(bucket, values, &self.config.percent_thresholds);
            }

            values.clear();
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const TS: u64 = 1_700_000_000;

    fn aggregator(persist_count_keys: u32, percentiles: &[&str]) -> Aggregator {
        Aggregator::new(AggregatorConfig {
            persist_count_keys,
            percent_thresholds: percentiles.iter().map(|p| p.parse().unwrap()).collect(),
        })
    }

    fn flush_lines(aggregator: &mut Aggregator) -> Vec<String> {
        aggregator
            .flush(UnixTimestamp::from_secs(TS))
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_counter_sample_rate() {
        let mut aggregator = aggregator(60, &[]);
        for sample in Sample::parse_all(b"hits:5|c|@0.5\nhits:5|c|@0.5") {
            aggregator.insert(sample.unwrap());
        }

        assert_eq!(aggregator.counter("hits"), Some(CounterState::Active(20)));
        assert_eq!(flush_lines(&mut aggregator), ["hits 20 1700000000"]);
    }

    #[test]
    fn test_counter_decay() {
        let mut aggregator = aggregator(2, &[]);
        aggregator.insert(Sample::counter("hits", 3));

        assert_eq!(flush_lines(&mut aggregator), ["hits 3 1700000000"]);
        assert_eq!(flush_lines(&mut aggregator), ["hits 0 1700000000"]);
        assert_eq!(flush_lines(&mut aggregator), ["hits 0 1700000000"]);
        assert_eq!(aggregator.counter("hits"), Some(CounterState::Expired));

        let batch = aggregator.flush(UnixTimestamp::from_secs(TS));
        assert!(batch.is_empty());
        assert_eq!(aggregator.counter("hits"), Some(CounterState::Expired));
    }

    #[test]
    fn test_counter_reset_while_decaying() {
        let mut aggregator = aggregator(2, &[]);
        aggregator.insert(Sample::counter("hits", 3));
        flush_lines(&mut aggregator);
        assert_eq!(
            aggregator.counter("hits"),
            Some(CounterState::Decaying { remaining: 2 })
        );

        // The new sample starts from zero instead of adding to the decay progress.
        aggregator.insert(Sample::counter("hits", 4));
        assert_eq!(aggregator.counter("hits"), Some(CounterState::Active(4)));
        assert_eq!(flush_lines(&mut aggregator), ["hits 4 1700000000"]);

        // The persistence window restarts.
        assert_eq!(flush_lines(&mut aggregator), ["hits 0 1700000000"]);
        assert_eq!(flush_lines(&mut aggregator), ["hits 0 1700000000"]);
        assert!(flush_lines(&mut aggregator).is_empty());
    }

    #[test]
    fn test_counter_reset_after_expiry() {
        let mut aggregator = aggregator(1, &[]);
        aggregator.insert(Sample::counter("hits", 1));
        flush_lines(&mut aggregator);
        flush_lines(&mut aggregator);
        assert_eq!(aggregator.counter("hits"), Some(CounterState::Expired));

        aggregator.insert(Sample::counter("hits", 2));
        aggregator.insert(Sample::counter("hits", 2));
        assert_eq!(flush_lines(&mut aggregator), ["hits 4 1700000000"]);
    }

    #[test]
    fn test_counter_zero_sample() {
        // A zero count is still a reportable value.
        let mut aggregator = aggregator(1, &[]);
        aggregator.insert(Sample::counter("hits", 0));
        assert_eq!(flush_lines(&mut aggregator), ["hits 0 1700000000"]);
    }

    #[test]
    fn test_counter_saturates() {
        let mut aggregator = aggregator(1, &[]);
        aggregator.insert(Sample::counter("hits", i64::MAX));
        aggregator.insert(Sample::counter("hits", 1));
        assert_eq!(aggregator.counter("hits"), Some(CounterState::Active(i64::MAX)));
    }

    #[test]
    fn test_gauge_skip() {
        let mut aggregator = aggregator(60, &[]);
        aggregator.insert(Sample::gauge("mem", 10));
        aggregator.insert(Sample::gauge("mem", 12));

        assert_eq!(flush_lines(&mut aggregator), ["mem 12 1700000000"]);
        assert_eq!(aggregator.gauge("mem"), Some(GAUGE_SENTINEL));
        assert!(flush_lines(&mut aggregator).is_empty());

        aggregator.insert(Sample::gauge("mem", 0));
        assert_eq!(flush_lines(&mut aggregator), ["mem 0 1700000000"]);
    }

    #[test]
    fn test_gauge_minus_one_is_skipped() {
        // A reading of -1 collides with the sentinel and is never reported. The wire protocol
        // cannot submit negative values, so this only affects samples constructed in code.
        let mut aggregator = aggregator(60, &[]);
        aggregator.insert(Sample::gauge("temp", -1));
        assert!(flush_lines(&mut aggregator).is_empty());

        aggregator.insert(Sample::gauge("temp", 5));
        aggregator.insert(Sample::gauge("temp", -1));
        assert!(flush_lines(&mut aggregator).is_empty());
    }

    #[test]
    fn test_timer_percentile() {
        let mut aggregator = aggregator(60, &["90"]);
        // Insert in reverse to verify sorting.
        for value in (1..=10).rev() {
            aggregator.insert(Sample::timer("latency", value));
        }

        // count = 10, idx = ceil(0.9 * 10 + 0.5) = 10 >= count, clamped to 9, t[9] = 10
        // mean = t[10 / 2] = t[5] = 6
        insta::assert_debug_snapshot!(flush_lines(&mut aggregator), @r###"
        [
            "latency.upper_90 10 1700000000",
            "latency.mean 6 1700000000",
            "latency.upper 10 1700000000",
            "latency.lower 1 1700000000",
            "latency.count 10 1700000000",
        ]
        "###);

        assert_eq!(aggregator.timer("latency"), Some(&[][..]));
        assert!(flush_lines(&mut aggregator).is_empty());
    }

    #[test]
    fn test_timer_sample_rate_ignored() {
        let mut aggregator = aggregator(60, &[]);
        aggregator.insert(Sample::timer("t", 4).with_sample_rate(0.1));
        assert_eq!(aggregator.timer("t"), Some(&[4][..]));
    }

    #[test]
    fn test_flush_order_and_stats() {
        let mut aggregator = aggregator(60, &["50"]);
        for sample in Sample::parse_all(b"b:1|c\na:2|c\ng:7|g\nt:5|ms\nt:1|ms\nt:3|ms") {
            aggregator.insert(sample.unwrap());
        }

        let batch = aggregator.flush(UnixTimestamp::from_secs(TS));
        // Two counters, one gauge, one timer.
        assert_eq!(batch.stats(), 4);
        insta::assert_snapshot!(std::str::from_utf8(batch.as_bytes()).unwrap(), @r###"
        a 2 1700000000
        b 1 1700000000
        g 7 1700000000
        t.upper_50 5 1700000000
        t.mean 3 1700000000
        t.upper 5 1700000000
        t.lower 1 1700000000
        t.count 3 1700000000
        "###);
    }

    #[test]
    fn test_same_bucket_different_types() {
        let mut aggregator = aggregator(60, &[]);
        aggregator.insert(Sample::counter("x", 1));
        aggregator.insert(Sample::gauge("x", 2));
        assert_eq!(aggregator.bucket_count(), 2);
        assert_eq!(
            flush_lines(&mut aggregator),
            ["x 1 1700000000", "x 2 1700000000"]
        );
    }

    #[test]
    fn test_empty_flush() {
        let mut aggregator = aggregator(60, &["90"]);
        let batch = aggregator.flush(UnixTimestamp::from_secs(TS));
        assert!(batch.is_empty());
        assert_eq!(batch.as_bytes(), b"");
    }
}
