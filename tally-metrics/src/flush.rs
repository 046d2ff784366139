use std::fmt::{self, Write};

use tally_common::UnixTimestamp;

use crate::percentile::PercentileSpec;

/// The serialized output of one flush in the Graphite plaintext protocol.
///
/// Every line has the format `<path> <value> <timestamp>\n`, where all lines of a batch share the
/// same timestamp. Next to the lines, the batch tracks the number of stats it holds. Counters and
/// gauges count once per line, while a timer counts once for all lines of its summary.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushBatch {
    timestamp: UnixTimestamp,
    stats: usize,
    buffer: String,
}

impl FlushBatch {
    /// Creates an empty batch for the given timestamp.
    pub fn new(timestamp: UnixTimestamp) -> Self {
        Self {
            timestamp,
            stats: 0,
            buffer: String::new(),
        }
    }

    /// The timestamp written on every line.
    pub fn timestamp(&self) -> UnixTimestamp {
        self.timestamp
    }

    /// Returns the number of stats in this batch.
    pub fn stats(&self) -> usize {
        self.stats
    }

    /// Returns `true` if this batch holds no stats and must not be sent.
    pub fn is_empty(&self) -> bool {
        self.stats == 0
    }

    /// Returns the serialized payload.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Iterates the lines of the payload without trailing newlines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.buffer.lines()
    }

    /// Adds a single counter or gauge value.
    pub(crate) fn push_value(&mut self, bucket: &str, value: i64) {
        self.write_line(format_args!("{bucket}"), value);
        self.stats += 1;
    }

    /// Adds the summary of a timer.
    ///
    /// `sorted` must be sorted ascending and must not be empty.
    pub(crate) fn push_timer(
        &mut self,
        bucket: &str,
        sorted: &[i64],
        percentiles: &[PercentileSpec],
    ) {
        let (Some(&lower), Some(&upper)) = (sorted.first(), sorted.last()) else {
            return;
        };

        let count = sorted.len();
        // Reported as the mean, but this is the middle element.
        let mean = sorted[count / 2];

        for percentile in percentiles {
            let value = sorted[percentile.index(count)];
            self.write_line(format_args!("{bucket}.upper_{}", percentile.label), value);
        }

        self.write_line(format_args!("{bucket}.mean"), mean);
        self.write_line(format_args!("{bucket}.upper"), upper);
        self.write_line(format_args!("{bucket}.lower"), lower);
        self.write_line(format_args!("{bucket}.count"), count as i64);
        self.stats += 1;
    }

    fn write_line(&mut self, path: fmt::Arguments<'_>, value: i64) {
        // Writing into a `String` does not fail.
        let _ = writeln!(self.buffer, "{path} {value} {}", self.timestamp.as_secs());
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn batch() -> FlushBatch {
        FlushBatch::new(UnixTimestamp::from_secs(1_700_000_000))
    }

    #[test]
    fn test_empty() {
        let batch = batch();
        assert!(batch.is_empty());
        assert_eq!(batch.as_bytes(), b"");
        assert_eq!(batch.lines().count(), 0);
    }

    #[test]
    fn test_push_value() {
        let mut batch = batch();
        batch.push_value("api.requests", 20);
        batch.push_value("api.errors", 0);

        assert_eq!(batch.stats(), 2);
        assert_eq!(
            std::str::from_utf8(batch.as_bytes()).unwrap(),
            "api.requests 20 1700000000\napi.errors 0 1700000000\n"
        );
    }

    #[test]
    fn test_push_timer() {
        let percentiles = vec!["90".parse().unwrap(), "50".parse().unwrap()];
        let values: Vec<i64> = (1..=10).collect();

        let mut batch = batch();
        batch.push_timer("latency", &values, &percentiles);

        assert_eq!(batch.stats(), 1);
        insta::assert_snapshot!(std::str::from_utf8(batch.as_bytes()).unwrap(), @r###"
        latency.upper_90 10 1700000000
        latency.upper_50 7 1700000000
        latency.mean 6 1700000000
        latency.upper 10 1700000000
        latency.lower 1 1700000000
        latency.count 10 1700000000
        "###);
    }

    #[test]
    fn test_push_timer_single() {
        let percentiles = vec!["99.9".parse().unwrap()];

        let mut batch = batch();
        batch.push_timer("t", &[42], &percentiles);

        let lines: Vec<_> = batch.lines().collect();
        assert_eq!(
            lines,
            [
                "t.upper_99_9 42 1700000000",
                "t.mean 42 1700000000",
                "t.upper 42 1700000000",
                "t.lower 42 1700000000",
                "t.count 1 1700000000",
            ]
        );
    }

    #[test]
    fn test_push_timer_empty() {
        let mut batch = batch();
        batch.push_timer("t", &[], &[]);
        assert!(batch.is_empty());
        assert_eq!(batch.as_bytes(), b"");
    }
}
