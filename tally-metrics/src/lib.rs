//! Metrics protocol, aggregation and flushing.
//!
//! # Protocol
//!
//! Clients submit samples as text lines over UDP. A datagram may contain multiple lines
//! separated by newlines:
//!
//! ```text
//! api.requests:1|c
//! api.requests:1|c|@0.1
//! api.latency:320|ms
//! memory.free:4096|g
//! ```
//!
//! See [`Sample`] for the format and [`MetricType`] for the supported types. Lines that do not
//! match the format are dropped.
//!
//! # Aggregation
//!
//! Decoded samples are sent to the [`AggregatorService`], which owns the [`Aggregator`] and is
//! the only task that ever reads or modifies the aggregation state. The service is reached
//! through a bounded queue, so listeners wait when the aggregator falls behind.
//!
//! # Flushing
//!
//! In a fixed interval and once on shutdown, the aggregator is flushed into a [`FlushBatch`]
//! in the Graphite plaintext format and sent to a [`Collector`]:
//!
//! ```text
//! api.requests 11 1700000000
//! memory.free 4096 1700000000
//! api.latency.upper_90 320 1700000000
//! api.latency.mean 320 1700000000
//! api.latency.upper 320 1700000000
//! api.latency.lower 320 1700000000
//! api.latency.count 1 1700000000
//! ```
#![warn(missing_docs)]

mod aggregator;
mod aggregatorservice;
mod collector;
mod flush;
mod percentile;
mod protocol;
mod sample;

pub use self::aggregator::*;
pub use self::aggregatorservice::*;
pub use self::collector::*;
pub use self::flush::*;
pub use self::percentile::*;
pub use self::protocol::*;
pub use self::sample::*;
