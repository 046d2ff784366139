use std::time::Duration;

use similar_asserts::assert_eq;
use tally_config::Config;
use tally_server::{ServerError, ServiceState};
use tally_system::Controller;
use tally_test::MockGraphite;
use tokio::net::UdpSocket;

fn config(graphite: &MockGraphite, flush_interval: u64) -> Config {
    Config::from_json_value(serde_json::json!({
        "listener": {"address": "127.0.0.1:0", "listeners": 2},
        "collector": {"address": graphite.address().to_string()},
        "aggregator": {"flush_interval": flush_interval, "percent_thresholds": ["90"]},
    }))
    .unwrap()
}

/// Strips the timestamp from every line of a payload.
fn strip_timestamps(payload: &str) -> Vec<&str> {
    payload
        .lines()
        .map(|line| line.rsplit_once(' ').unwrap().0)
        .collect()
}

#[tokio::test]
async fn test_final_flush_on_shutdown() {
    tally_test::setup();

    let mut graphite = MockGraphite::start().await.unwrap();
    let config = config(&graphite, 3600);
    let controller = Controller::new();
    let state = ServiceState::start(&config, controller.shutdown_handle())
        .await
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(
            b"hits:5|c|@0.5\nhits:5|c|@0.5\nnot a metric\nlatency:10|ms\nlatency:30|ms\nmem:7|g\n",
            state.listen_addr(),
        )
        .await
        .unwrap();

    // Give the listener time to forward the datagram.
    tokio::time::sleep(Duration::from_millis(300)).await;

    controller.shutdown();
    state.join().await.unwrap();

    let payload = graphite
        .next_payload(Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(
        strip_timestamps(&payload),
        [
            "hits 20",
            "mem 7",
            "latency.upper_90 30",
            "latency.mean 30",
            "latency.upper 30",
            "latency.lower 10",
            "latency.count 2",
        ]
    );

    // Exactly one flush on shutdown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(graphite.try_next_payload(), None);
}

#[tokio::test]
async fn test_periodic_flush() {
    tally_test::setup();

    let mut graphite = MockGraphite::start().await.unwrap();
    let config = config(&graphite, 1);
    let controller = Controller::new();
    let state = ServiceState::start(&config, controller.shutdown_handle())
        .await
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"requests:3|c", state.listen_addr())
        .await
        .unwrap();

    let payload = graphite
        .next_payload(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(strip_timestamps(&payload), ["requests 3"]);

    // The idle counter keeps reporting zero.
    let payload = graphite
        .next_payload(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(strip_timestamps(&payload), ["requests 0"]);

    controller.shutdown();
    state.join().await.unwrap();
}

#[tokio::test]
async fn test_bind_failure() {
    tally_test::setup();

    let occupied = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = occupied.local_addr().unwrap().to_string();

    let config = Config::from_json_value(serde_json::json!({
        "listener": {"address": address},
    }))
    .unwrap();

    let controller = Controller::new();
    let error = ServiceState::start(&config, controller.shutdown_handle())
        .await
        .unwrap_err();

    assert!(matches!(error, ServerError::BindFailed(ref a, _) if *a == address));
    assert_eq!(
        error.to_string(),
        format!("could not bind udp socket to {address}")
    );
}
