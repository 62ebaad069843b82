//! End-to-end service behaviour over mock feeds and a paused tokio clock.


use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::sleep;
use transport::{CloseCode, SocketError, SocketEvent};
use vehicle_realtime::{Config, Service};

use self::provider::{Call, MockConnector, MockProvider, ROUTE_ID, SHORT_NAME};

const PUSH_URL: &str = "wss://feed.example/locations";
const PULL_URL: &str = "https://api.example/vehiclelocations";

fn config(vars: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> =
        vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    vars.entry("PUSH_FEED_URL".to_string()).or_insert_with(|| PUSH_URL.to_string());
    vars.entry("PULL_FEED_URL".to_string()).or_insert_with(|| PULL_URL.to_string());
    vars.entry("PULL_ENABLED".to_string()).or_insert_with(|| "false".to_string());
    Config::from_lookup(|key| vars.get(key).cloned())
}

fn push(vehicle_id: &str, timestamp: i64) -> SocketEvent {
    let message = json!({
        "id": vehicle_id,
        "vehicle": {
            "trip": { "routeId": ROUTE_ID, "directionId": 0 },
            "position": { "latitude": -36.87, "longitude": 174.761 },
            "vehicle": { "id": vehicle_id },
            "timestamp": timestamp.to_string()
        }
    });
    SocketEvent::Message(Bytes::from(message.to_string()))
}

fn entity(vehicle_id: &str, timestamp: i64) -> Value {
    json!({
        "id": vehicle_id,
        "vehicle": {
            "trip": { "route_id": ROUTE_ID, "direction_id": 0 },
            "position": { "latitude": -36.86, "longitude": 174.759 },
            "vehicle": { "id": vehicle_id },
            "timestamp": timestamp
        }
    })
}

async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn timestamps(provider: &MockProvider) -> Vec<i64> {
    provider
        .published()
        .iter()
        .map(|(_, message)| {
            let payload: Value = serde_json::from_slice(&message.payload).expect("should be json");
            payload["timestamp"].as_i64().expect("should have timestamp")
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn publishes_pushed_positions() {
    let provider = MockProvider::new(150);
    let connector = MockConnector::new();
    let service = Service::new(config(&[]), provider.clone(), connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            settle().await;
            connector.emit(0, SocketEvent::Open);
            connector.emit(0, push("59123", 100));
            settle().await;
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");
    let published = provider.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, SHORT_NAME);
    assert_eq!(published[0].1.headers.get("key").map(String::as_str), Some("59123"));
}

#[tokio::test(start_paused = true)]
async fn malformed_push_messages_are_skipped() {
    let provider = MockProvider::new(150);
    let connector = MockConnector::new();
    let service = Service::new(config(&[]), provider.clone(), connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            settle().await;
            connector.emit(0, SocketEvent::Open);
            connector.emit(0, SocketEvent::Message(Bytes::from_static(b"not json")));
            connector.emit(0, SocketEvent::Message(Bytes::from_static(b"{\"vehicle\":{}}")));
            connector.emit(0, push("59123", 100));
            settle().await;
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");
    assert_eq!(timestamps(&provider), vec![100]);
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_push_feed() {
    let provider = MockProvider::new(150);
    let connector = MockConnector::new();
    let config = config(&[("PUSH_FEED_GREETING", "subscribe")]);
    let service = Service::new(config, provider, connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            settle().await;
            connector.emit(0, SocketEvent::Open);
            settle().await;
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");
    assert_eq!(
        connector.calls(0),
        vec![
            Call::Send(Bytes::from_static(b"subscribe")),
            Call::Close(CloseCode::SHUTDOWN, "shutdown".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_close_code_is_fatal() {
    let provider = MockProvider::new(150);
    let connector = MockConnector::new();
    let service = Service::new(config(&[]), provider, connector.clone());

    let (result, ()) = tokio::join!(service.run(), async {
        settle().await;
        connector.emit(0, SocketEvent::Open);
        connector.emit(0, SocketEvent::Close { code: 4500, reason: "revoked".to_string() });
        settle().await;
    });

    let Err(err) = result else {
        panic!("an unknown close code should end the service");
    };
    let err = err.downcast_ref::<transport::Error>().expect("should be a transport error");
    assert_eq!(err.close_code(), Some(4500));
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn known_close_code_reconnects() {
    let provider = MockProvider::new(150);
    let connector = MockConnector::new();
    let service = Service::new(config(&[]), provider, connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            settle().await;
            connector.emit(0, SocketEvent::Open);
            connector.emit(0, SocketEvent::Close { code: CloseCode::GOING_AWAY, reason: String::new() });
            sleep(Duration::from_millis(600)).await;
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");
    assert_eq!(connector.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn busy_upgrade_backs_off() {
    let provider = MockProvider::new(150);
    let connector = MockConnector::new();
    let service = Service::new(config(&[]), provider, connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            settle().await;
            connector.emit(0, SocketEvent::Error(SocketError::Upgrade { status: 503 }));
            sleep(Duration::from_secs(4)).await;
            assert_eq!(connector.connects(), 1);
            sleep(Duration::from_secs(2)).await;
            assert_eq!(connector.connects(), 2);
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");
}

#[tokio::test(start_paused = true)]
async fn pull_and_push_share_ordering() {
    let provider = MockProvider::new(150);
    provider.respond(&json!([entity("59123", 110)]));
    let connector = MockConnector::new();
    let config = config(&[("PULL_ENABLED", "true"), ("FEED_SUBSCRIPTION_KEY", "secret")]);
    let service = Service::new(config, provider.clone(), connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            settle().await;
            connector.emit(0, SocketEvent::Open);
            connector.emit(0, push("59123", 100));
            connector.emit(0, push("59123", 120));
            settle().await;
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");

    // the pushed report older than the pulled one is dropped
    assert_eq!(timestamps(&provider), vec![110, 120]);
    assert_eq!(provider.requests(), vec![format!("{PULL_URL}?subscription_key=secret")]);
    assert_eq!(connector.sockets().urls, vec![format!("{PUSH_URL}?subscription_key=secret")]);
}

#[tokio::test(start_paused = true)]
async fn pulls_on_interval() {
    let provider = MockProvider::new(150);
    provider.respond(&json!([entity("59123", 110)]));
    let connector = MockConnector::new();
    let config = config(&[("PULL_ENABLED", "true"), ("PULL_INTERVAL_SECS", "15")]);
    let service = Service::new(config, provider.clone(), connector.clone());
    let (stop, stopped) = oneshot::channel();

    let (result, ()) = tokio::join!(
        service.run_until(async {
            let _ = stopped.await;
        }),
        async {
            // pongs keep the push feed healthy while time passes
            settle().await;
            connector.emit(0, SocketEvent::Open);
            sleep(Duration::from_secs(31)).await;
            let _ = stop.send(());
        }
    );

    result.expect("service should stop cleanly");
    assert_eq!(provider.requests().len(), 3);
    // repeated reports with the same timestamp are applied again
    assert_eq!(timestamps(&provider), vec![110, 110, 110]);
}
