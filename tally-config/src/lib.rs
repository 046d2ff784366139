//! Configuration for the tally daemon.
//!
//! The configuration is loaded from a `config.yml` file in a configuration folder. All values
//! have defaults, so the file and every section within it are optional. Selected values can be
//! overridden from the command line or environment, see [`OverridableConfig`].
//!
//! ```yaml
//! listener:
//!   address: 0.0.0.0:8125
//! collector:
//!   address: 127.0.0.1:2003
//! aggregator:
//!   flush_interval: 10
//!   percent_thresholds: [90, "99.9"]
//! logging:
//!   level: info
//! ```
//!
//! Fractional percentile thresholds must be quoted, since their text becomes part of the
//! reported series name.
#![warn(missing_docs)]

mod config;

pub use crate::config::*;
