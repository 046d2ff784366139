use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer, Visitor};

/// An error returned when parsing a [`PercentileSpec`] fails.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ParsePercentileError {
    /// The threshold is not a decimal number.
    #[error("invalid percentile threshold {0:?}")]
    Invalid(String),
    /// The threshold is a number outside of `[0, 100]`.
    #[error("percentile threshold {0} must be between 0 and 100")]
    OutOfRange(String),
}

/// A configured percentile threshold for timers.
///
/// Every threshold adds one `<bucket>.upper_<label>` series per timer bucket to a flush, holding
/// the observation at that percentile. The label is derived from the configured decimal text by
/// replacing dots with underscores, so `99.9` is reported as `upper_99_9`.
///
/// When deserialized, integers and strings are accepted. Fractional thresholds have to be quoted
/// strings, since the label depends on their exact text.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileSpec {
    /// The threshold in percent, within `[0, 100]`.
    pub ratio: f64,
    /// Suffix of the reported series.
    pub label: String,
}

impl PercentileSpec {
    /// Returns the index of the threshold value in a sorted sequence of `count` observations.
    ///
    /// This is `ceil(ratio / 100 * count + 0.5)`, clamped to the last index. For sequences of
    /// zero or one elements, the index of the last element is returned.
    pub fn index(&self, count: usize) -> usize {
        if count <= 1 {
            return count.saturating_sub(1);
        }

        let index = ((self.ratio / 100.0) * count as f64 + 0.5).ceil() as usize;
        index.min(count - 1)
    }
}

impl FromStr for PercentileSpec {
    type Err = ParsePercentileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ratio = s
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite())
            .ok_or_else(|| ParsePercentileError::Invalid(s.to_owned()))?;

        if !(0.0..=100.0).contains(&ratio) {
            return Err(ParsePercentileError::OutOfRange(s.to_owned()));
        }

        Ok(Self {
            ratio,
            label: s.replace('.', "_"),
        })
    }
}

impl fmt::Display for PercentileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label.replace('_', "."))
    }
}

tally_common::impl_str_ser!(PercentileSpec);

struct PercentileVisitor;

impl Visitor<'_> for PercentileVisitor {
    type Value = PercentileSpec;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a percentile between 0 and 100")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        self.visit_str(&v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        self.visit_str(&v.to_string())
    }

    // The decimal text of a float is gone at this point, but it determines the label. Fractional
    // thresholds must be given as strings.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Err(E::custom(format_args!(
            "fractional percentile threshold {v} must be quoted, such as \"{v}\""
        )))
    }
}

impl<'de> Deserialize<'de> for PercentileSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PercentileVisitor)
    }
}
