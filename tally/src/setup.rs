use std::net::SocketAddr;

use anyhow::{Context, Result};
use tally_config::Config;

/// Checks that an address has the form `host:port` with a numeric port.
fn check_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("address {address:?} is missing a port"))?;

    if host.is_empty() {
        anyhow::bail!("address {address:?} is missing a host");
    }

    port.parse::<u16>()
        .with_context(|| format!("address {address:?} has an invalid port"))?;

    Ok(())
}

pub fn check_config(config: &Config) -> Result<()> {
    check_address(config.listen_addr()).context("invalid listen address")?;
    check_address(config.collector_addr()).context("invalid collector address")?;

    if let (Ok(listen), Ok(collector)) = (
        config.listen_addr().parse::<SocketAddr>(),
        config.collector_addr().parse::<SocketAddr>(),
    ) && listen.port() == collector.port()
        && (listen.ip() == collector.ip() || listen.ip().is_unspecified())
    {
        tally_log::warn!("collector address {collector} overlaps with the listen address");
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        tally_log::info!("launching tally without config folder");
    } else {
        tally_log::info!(
            "launching tally from config folder {}",
            config.path().display()
        );
    }

    let aggregator = config.aggregator_config();
    let thresholds: Vec<_> = aggregator
        .percent_thresholds
        .iter()
        .map(ToString::to_string)
        .collect();

    tally_log::info!("  listen address: {}", config.listen_addr());
    tally_log::info!("  collector: {}", config.collector_addr());
    tally_log::info!("  flush interval: {}s", aggregator.flush_interval);
    tally_log::info!("  persist count keys: {}", aggregator.persist_count_keys);
    if thresholds.is_empty() {
        tally_log::info!("  percent thresholds: -");
    } else {
        tally_log::info!("  percent thresholds: {}", thresholds.join(", "));
    }
    tally_log::info!("  debug: {}", aggregator.debug);
    tally_log::info!("  log level: {}", config.logging().level);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: serde_json::Value) -> Config {
        Config::from_json_value(json).unwrap()
    }

    #[test]
    fn test_check_address() {
        assert!(check_address("127.0.0.1:2003").is_ok());
        assert!(check_address("graphite.internal:2003").is_ok());
        assert!(check_address("[::1]:2003").is_ok());

        assert!(check_address("localhost").is_err());
        assert!(check_address(":2003").is_err());
        assert!(check_address("localhost:port").is_err());
        assert!(check_address("localhost:70000").is_err());
    }

    #[test]
    fn test_check_config() {
        assert!(check_config(&config(serde_json::json!({}))).is_ok());

        let invalid = config(serde_json::json!({"collector": {"address": "graphite"}}));
        let error = check_config(&invalid).unwrap_err();
        assert_eq!(error.to_string(), "invalid collector address");
    }
}
