use std::iter::FusedIterator;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::protocol::{MetricType, ParseMetricError};

/// Grammar of a single submission line.
///
/// Values are restricted to digits, so negative values can never be submitted. The sample rate
/// accepts any run of digits and dots and is validated separately.
static SAMPLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):([0-9]+)\|(g|c|ms)(\|@([0-9.]+))?$").unwrap());

/// A single decoded metric event.
///
/// Samples are submitted as plain text lines, with multiple lines per datagram separated by
/// newlines:
///
/// ```text
/// <bucket>:<value>|<type>[|@<sample_rate>]
/// ```
///
/// - `bucket` is the name of the metric series. It may contain any character except for `:`.
/// - `value` is a non-negative decimal integer.
/// - `type` is one of `c`, `g` or `ms`, see [`MetricType`].
/// - `sample_rate` is only meaningful for counters and denotes the fraction of events that were
///   actually submitted, for example `0.1` if only every tenth event is sent.
///
/// # Example
///
/// ```
/// use tally_metrics::{MetricType, Sample};
///
/// let sample = Sample::parse(b"api.requests:5|c|@0.5").unwrap();
/// assert_eq!(sample.bucket, "api.requests");
/// assert_eq!(sample.ty, MetricType::Counter);
/// assert_eq!(sample.value, 5);
/// assert_eq!(sample.sample_rate, 0.5);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Name of the metric series.
    pub bucket: String,
    /// Determines how the value is aggregated.
    pub ty: MetricType,
    /// The raw measurement.
    pub value: i64,
    /// Fraction of events represented by this sample, in the range `(0, 1]`.
    pub sample_rate: f32,
}

impl Sample {
    /// Creates a counter sample with a sample rate of `1`.
    pub fn counter(bucket: impl Into<String>, value: i64) -> Self {
        Self {
            bucket: bucket.into(),
            ty: MetricType::Counter,
            value,
            sample_rate: 1.0,
        }
    }

    /// Creates a gauge sample.
    pub fn gauge(bucket: impl Into<String>, value: i64) -> Self {
        Self {
            bucket: bucket.into(),
            ty: MetricType::Gauge,
            value,
            sample_rate: 1.0,
        }
    }

    /// Creates a timer sample.
    pub fn timer(bucket: impl Into<String>, value: i64) -> Self {
        Self {
            bucket: bucket.into(),
            ty: MetricType::Timer,
            value,
            sample_rate: 1.0,
        }
    }

    /// Sets the sample rate of this sample.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns the weight of a counter sample, extrapolated by its sample rate.
    ///
    /// The weight is computed in single precision and truncated toward zero. Conversion saturates
    /// at the bounds of `i64`.
    pub fn weight(&self) -> i64 {
        (self.value as f32 * (1.0 / self.sample_rate)) as i64
    }

    fn parse_str(string: &str) -> Option<Self> {
        let captures = SAMPLE_REGEX.captures(string)?;

        let bucket = captures.get(1)?.as_str();
        let ty = captures.get(3)?.as_str().parse().ok()?;

        // The value is all digits, so this only fails on overflow.
        let value = captures
            .get(2)?
            .as_str()
            .parse()
            .unwrap_or(match ty {
                MetricType::Timer => 0,
                MetricType::Counter | MetricType::Gauge => 1,
            });

        let sample_rate = captures
            .get(5)
            .and_then(|m| parse_sample_rate(m.as_str()))
            .unwrap_or(1.0);

        Some(Self {
            bucket: bucket.to_owned(),
            ty,
            value,
            sample_rate,
        })
    }

    /// Parses a single sample from the raw protocol.
    ///
    /// See [`Sample`] for the format. Trailing newlines are not accepted, use
    /// [`parse_all`](Self::parse_all) to decode a full datagram.
    pub fn parse(slice: &[u8]) -> Result<Self, ParseMetricError> {
        let string = std::str::from_utf8(slice).map_err(|_| ParseMetricError(()))?;
        Self::parse_str(string).ok_or(ParseMetricError(()))
    }

    /// Parses all samples in a datagram.
    ///
    /// Returns a result for each non-empty line in `slice`, in order. Lines are separated by
    /// `\n` only, a carriage return is considered part of the line and makes it invalid.
    ///
    /// It is possible to continue consuming the iterator after `Err` is yielded.
    ///
    /// # Example
    ///
    /// ```
    /// use tally_metrics::Sample;
    ///
    /// let data = b"requests:1|c\nresponse_time:42|ms\nnot a metric\n";
    /// let samples: Vec<_> = Sample::parse_all(data).filter_map(Result::ok).collect();
    /// assert_eq!(samples.len(), 2);
    /// ```
    pub fn parse_all(slice: &[u8]) -> ParseSamples<'_> {
        ParseSamples { slice }
    }
}

/// Parses a sample rate, accepting only values in `(0, 1]`.
fn parse_sample_rate(string: &str) -> Option<f32> {
    let rate = string.parse::<f32>().ok()?;
    (rate > 0.0 && rate <= 1.0).then_some(rate)
}

/// Iterator over parsed samples returned from [`Sample::parse_all`].
#[derive(Clone, Debug, Default)]
pub struct ParseSamples<'a> {
    slice: &'a [u8],
}

impl Iterator for ParseSamples<'_> {
    type Item = Result<Sample, ParseMetricError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.slice.is_empty() {
                return None;
            }

            let mut split = self.slice.splitn(2, |&b| b == b'\n');
            let current = split.next()?;
            self.slice = split.next().unwrap_or_default();

            if !current.is_empty() {
                return Some(Sample::parse(current));
            }
        }
    }
}

impl FusedIterator for ParseSamples<'_> {}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_parse_counter() {
        let sample = Sample::parse(b"foo:42|c").unwrap();
        assert_eq!(sample, Sample::counter("foo", 42));
    }

    #[test]
    fn test_parse_counter_sample_rate() {
        let sample = Sample::parse(b"foo.bar:7|c|@0.5").unwrap();
        assert_eq!(sample, Sample::counter("foo.bar", 7).with_sample_rate(0.5));
    }

    #[test]
    fn test_parse_gauge() {
        let sample = Sample::parse(b"mem.free:1024|g").unwrap();
        assert_eq!(sample, Sample::gauge("mem.free", 1024));
    }

    #[test]
    fn test_parse_timer() {
        let sample = Sample::parse(b"api.latency:320|ms").unwrap();
        assert_eq!(sample, Sample::timer("api.latency", 320));
    }

    #[test]
    fn test_parse_bucket_chars() {
        // Everything up to the first colon is the bucket.
        let sample = Sample::parse(b"a b/c|d:1|g").unwrap();
        assert_eq!(sample.bucket, "a b/c|d");
    }

    #[test]
    fn test_parse_invalid() {
        let inputs: &[&[u8]] = &[
            b"",
            b"foo",
            b":1|c",
            b"foo:1",
            b"foo:1|",
            b"foo:1|d",
            b"foo:1|s",
            b"foo:-1|c",
            b"foo:1.5|c",
            b"foo:1|c|0.5",
            b"foo:1|c|@-0.5",
            b"foo:1|c\r",
            b"foo:1|ms|",
            b"\xff:1|c",
        ];

        for input in inputs {
            assert!(
                Sample::parse(input).is_err(),
                "{} should not parse",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_parse_value_overflow() {
        let counter = Sample::parse(b"foo:99999999999999999999|c").unwrap();
        assert_eq!(counter.value, 1);

        let gauge = Sample::parse(b"foo:99999999999999999999|g").unwrap();
        assert_eq!(gauge.value, 1);

        let timer = Sample::parse(b"foo:99999999999999999999|ms").unwrap();
        assert_eq!(timer.value, 0);
    }

    #[test]
    fn test_parse_sample_rate_fallback() {
        for input in [
            "foo:1|c|@1.2.3",
            "foo:1|c|@.",
            "foo:1|c|@0",
            "foo:1|c|@0.0",
            "foo:1|c|@2",
        ] {
            let sample = Sample::parse(input.as_bytes()).unwrap();
            assert_eq!(sample.sample_rate, 1.0, "{input}");
        }
    }

    #[test]
    fn test_parse_sample_rate_timer() {
        // Accepted for all types but only used for counters.
        let sample = Sample::parse(b"foo:3|ms|@0.1").unwrap();
        assert_eq!(sample.sample_rate, 0.1);
    }

    #[test]
    fn test_parse_all() {
        let data = b"a:1|c\nb:2|g\n\nc:3|ms\n";
        let samples = Sample::parse_all(data)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(
            samples,
            vec![
                Sample::counter("a", 1),
                Sample::gauge("b", 2),
                Sample::timer("c", 3),
            ]
        );
    }

    #[test]
    fn test_parse_all_skips_invalid() {
        let data = b"a:1|c\ngarbage\r\nb:x|c\nc:5|c|@0.5";
        let results: Vec<_> = Sample::parse_all(data).collect();
        assert_eq!(results.len(), 4);

        let samples: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(
            samples,
            vec![
                Sample::counter("a", 1),
                Sample::counter("c", 5).with_sample_rate(0.5),
            ]
        );
    }

    #[test]
    fn test_parse_all_crlf() {
        let samples: Vec<_> = Sample::parse_all(b"a:1|c\r\nb:1|c\r\n")
            .filter_map(Result::ok)
            .collect();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_parse_all_empty() {
        assert_eq!(Sample::parse_all(b"").count(), 0);
        assert_eq!(Sample::parse_all(b"\n\n\n").count(), 0);
    }

    #[test]
    fn test_weight() {
        assert_eq!(Sample::counter("a", 5).weight(), 5);
        assert_eq!(Sample::counter("a", 5).with_sample_rate(0.5).weight(), 10);
        assert_eq!(Sample::counter("a", 1).with_sample_rate(0.1).weight(), 10);
        assert_eq!(Sample::counter("a", 1).with_sample_rate(0.3).weight(), 3);
        assert_eq!(Sample::counter("a", i64::MAX).with_sample_rate(0.5).weight(), i64::MAX);
    }
}
