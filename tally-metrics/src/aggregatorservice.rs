use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_common::UnixTimestamp;
use tally_log::LogError;
use tally_system::{Receiver, Service, ShutdownHandle};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::collector::{Collector, CollectorConnection};
use crate::flush::FlushBatch;
use crate::percentile::PercentileSpec;
use crate::sample::Sample;

/// Parameters used by the [`AggregatorService`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AggregatorServiceConfig {
    /// Interval between two flushes in seconds.
    ///
    /// Defaults to `10` seconds.
    pub flush_interval: u64,

    /// Number of flushes that keep reporting `0` for a counter without new samples.
    ///
    /// Defaults to `60`.
    pub persist_count_keys: u32,

    /// Percentile thresholds reported for every timer, each in `[0, 100]`.
    ///
    /// Defaults to none, so timers only report their mean, bounds and count.
    pub percent_thresholds: Vec<PercentileSpec>,

    /// Maximum number of decoded samples waiting for the aggregator.
    ///
    /// Listeners wait for free capacity once the queue is full. Defaults to `1000`.
    pub queue_size: usize,

    /// Logs every flushed line.
    ///
    /// In debug mode, flushes also advance the aggregation state if the collector is
    /// unreachable, discarding the data. Defaults to `false`.
    pub debug: bool,
}

impl AggregatorServiceConfig {
    /// Returns the flush interval as [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval)
    }
}

impl Default for AggregatorServiceConfig {
    fn default() -> Self {
        Self {
            flush_interval: 10,
            persist_count_keys: 60,
            percent_thresholds: Vec::new(),
            queue_size: 1000,
            debug: false,
        }
    }
}

impl From<&AggregatorServiceConfig> for AggregatorConfig {
    fn from(value: &AggregatorServiceConfig) -> Self {
        Self {
            persist_count_keys: value.persist_count_keys,
            percent_thresholds: value.percent_thresholds.clone(),
        }
    }
}

/// Messages accepted by the [`AggregatorService`].
#[derive(Debug)]
pub enum AggregatorMessage {
    /// Adds a decoded sample to the aggregator.
    Insert(Sample),

    /// Returns a copy of the current aggregation state. Used only in tests.
    #[cfg(test)]
    Inspect(tokio::sync::oneshot::Sender<Aggregator>),
}

impl From<Sample> for AggregatorMessage {
    fn from(sample: Sample) -> Self {
        Self::Insert(sample)
    }
}

/// Service owning the [`Aggregator`] and flushing it to a [`Collector`].
///
/// The service flushes in a fixed interval and once more when the shutdown is requested, after
/// which it stops. A flush only changes the aggregation state if the collector could be
/// reached, unless debug mode is enabled.
///
/// While a flush is waiting for the collector, no samples are consumed from the inbox.
#[derive(Debug)]
pub struct AggregatorService<C> {
    aggregator: Aggregator,
    collector: C,
    flush_interval: Duration,
    debug: bool,
    shutdown: ShutdownHandle,
}

impl<C: Collector> AggregatorService<C> {
    /// Creates a new aggregator service flushing to `collector`.
    pub fn new(config: &AggregatorServiceConfig, collector: C, shutdown: ShutdownHandle) -> Self {
        Self {
            aggregator: Aggregator::new(AggregatorConfig::from(config)),
            collector,
            flush_interval: config.flush_interval(),
            debug: config.debug,
            shutdown,
        }
    }

    fn handle_message(&mut self, message: AggregatorMessage) {
        match message {
            AggregatorMessage::Insert(sample) => self.aggregator.insert(sample),
            #[cfg(test)]
            AggregatorMessage::Inspect(sender) => {
                let _ = sender.send(self.aggregator.clone());
            }
        }
    }

    /// Connects to the collector and flushes the aggregator.
    ///
    /// If the collector is unreachable, the state is left untouched so that the data is sent
    /// with the next flush. Write errors lose the flushed data.
    async fn try_flush(&mut self) -> FlushOutcome {
        let address = self.collector.address();

        let connection = match self.collector.connect().await {
            Ok(connection) => Some(connection),
            Err(error) => {
                tally_log::warn!(
                    "failed to connect to collector at {address}: {}",
                    LogError(&error)
                );

                if !self.debug {
                    return FlushOutcome::Unreachable;
                }

                tally_log::warn!("in debug mode, resetting state even though the flush failed");
                None
            }
        };

        let batch = self.aggregator.flush(UnixTimestamp::now());
        if batch.is_empty() {
            tally_log::trace!("nothing to flush");
            return FlushOutcome::Empty;
        }

        let outcome = match connection {
            Some(mut connection) => match connection.send(batch.as_bytes()).await {
                Ok(()) => {
                    tally_log::info!("sent {} stats to {address}", batch.stats());
                    FlushOutcome::Sent(batch.stats())
                }
                Err(error) => {
                    tally_log::error!(
                        "failed to send {} stats to {address}: {}",
                        batch.stats(),
                        LogError(&error)
                    );
                    FlushOutcome::Failed(batch.stats())
                }
            },
            None => FlushOutcome::Discarded(batch.stats()),
        };

        if self.debug {
            for line in debug_lines(&batch) {
                tally_log::info!("{line}");
            }
        }

        outcome
    }
}

/// What a single flush did with the aggregated data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FlushOutcome {
    /// The collector was unreachable and the state was kept.
    Unreachable,
    /// There were no stats to send.
    Empty,
    /// The collector received this many stats.
    Sent(usize),
    /// Writing this many stats failed after the state had been reset.
    Failed(usize),
    /// In debug mode, this many stats were logged but the collector was unreachable.
    Discarded(usize),
}

/// Log lines emitted for every flushed line in debug mode.
fn debug_lines(batch: &FlushBatch) -> impl Iterator<Item = String> + '_ {
    batch.lines().map(|line| format!("debug: {line}"))
}

impl<C: Collector> Service for AggregatorService<C> {
    type Interface = AggregatorMessage;

    fn spawn_handler(mut self, mut rx: Receiver<Self::Interface>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = Instant::now() + self.flush_interval;
            let mut ticker = tokio::time::interval_at(start, self.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut shutdown = self.shutdown.clone();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.try_flush().await;
                    }
                    _ = shutdown.notified() => {
                        tally_log::info!("flushing metrics before shutdown");
                        match self.try_flush().await {
                            FlushOutcome::Empty => (),
                            FlushOutcome::Sent(stats) => {
                                tally_log::debug!("flushed {stats} stats before shutdown")
                            }
                            FlushOutcome::Unreachable => {
                                tally_log::warn!("dropping unflushed metrics on shutdown")
                            }
                            FlushOutcome::Failed(stats) | FlushOutcome::Discarded(stats) => {
                                tally_log::warn!("lost {stats} stats on shutdown")
                            }
                        }
                        break;
                    }
                    Some(message) = rx.recv() => self.handle_message(message),

                    else => break,
                }
            }

            tally_log::debug!("metrics aggregator stopped");
        })
    }
}
