use std::fmt;

/// The type of a [`Sample`](crate::Sample), determining how it is aggregated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MetricType {
    /// Counts instances of an event.
    ///
    /// Counter samples within one flush interval are summed up, extrapolated by their sample
    /// rate. After being reported, an idle counter keeps reporting `0` for the configured
    /// persistence window.
    Counter,
    /// Stores the last reported value.
    ///
    /// A gauge is reported once after every update and skipped while it is not updated.
    Gauge,
    /// Builds a distribution over durations or other measurements.
    ///
    /// All values of a flush interval are buffered and summarized into percentiles, the middle
    /// value, the bounds and the count.
    Timer,
}

impl MetricType {
    /// Return the shortcode for this metric type as used in the submission protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
            MetricType::Timer => "ms",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "c" => Self::Counter,
            "g" => Self::Gauge,
            "ms" => Self::Timer,
            _ => return Err(ParseMetricError(())),
        })
    }
}

/// An error returned by [`Sample::parse`](crate::Sample::parse) and
/// [`Sample::parse_all`](crate::Sample::parse_all).
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("failed to parse metric")]
pub struct ParseMetricError(pub(crate) ());
