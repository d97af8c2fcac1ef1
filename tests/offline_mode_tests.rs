//! End-to-end degraded-mode tests: trip to offline, substitute repositories,
//! and explicit reconnection

use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use dash_gateway::Error;
use dash_gateway::config::Config;
use dash_gateway::gateway::DataGateway;
use dash_gateway::mode::{Mode, StoreProbe};
use dash_gateway::orchestrator::FetchRequest;
use dash_gateway::repository::{ActiveRepo, ModeSwitched};

struct LiveWeatherRepo;
struct CannedWeatherRepo;

struct FixedProbe {
    available: bool,
}

#[async_trait]
impl StoreProbe for FixedProbe {
    async fn is_available(&self) -> bool {
        self.available
    }
    async fn is_authenticated(&self) -> bool {
        self.available
    }
}

fn test_gateway() -> DataGateway {
    let mut config = Config::default();
    config.relay.endpoints.clear();
    DataGateway::new(config).unwrap()
}

fn request(key: &str) -> FetchRequest {
    FetchRequest {
        cache_key: key.to_string(),
        ttl: Duration::from_secs(600),
        relay_target: None,
    }
}

async fn fail_once(gateway: &DataGateway, key: &str) {
    let _ = gateway
        .fetcher()
        .fetch(&request(key), || async {
            Err(Error::Network("connection refused".into()))
        })
        .await;
}

#[tokio::test]
async fn test_three_failures_within_window_trip_offline() {
    let gateway = test_gateway();
    let weather = ModeSwitched::new(LiveWeatherRepo, CannedWeatherRepo, gateway.mode());

    assert_eq!(gateway.mode().mode(), Mode::Online);
    assert!(matches!(weather.active(), ActiveRepo::Live(_)));

    // Failures on unrelated keys still count toward the same global window
    fail_once(&gateway, "weather:loc=paris").await;
    fail_once(&gateway, "forecast:loc=paris").await;
    assert_eq!(gateway.mode().mode(), Mode::Online);

    fail_once(&gateway, "feeds:url=https://news.example/rss").await;
    assert_eq!(gateway.mode().mode(), Mode::Offline);

    // A repository consulted after the trip uses the substitute path
    assert!(matches!(weather.active(), ActiveRepo::Substitute(_)));

    // The tracker was reset on transition so recovery cannot instantly re-trip
    assert_eq!(gateway.tracker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_interleaved_success_prevents_the_trip() {
    let gateway = test_gateway();

    fail_once(&gateway, "a").await;
    fail_once(&gateway, "b").await;
    gateway
        .fetcher()
        .fetch(&request("c"), || async { Ok(json!(1)) })
        .await
        .unwrap();
    fail_once(&gateway, "d").await;
    fail_once(&gateway, "e").await;

    assert_eq!(gateway.mode().mode(), Mode::Online);
}

#[tokio::test]
async fn test_fresh_cache_hits_keep_serving_while_offline() {
    let gateway = test_gateway();
    let req = request("weather:loc=paris");

    gateway
        .fetcher()
        .fetch(&req, || async { Ok(json!({"temp": 18})) })
        .await
        .unwrap();

    gateway.mode().go_offline("manual");

    // Cache reads involve no network and keep working in degraded mode
    let value = gateway
        .fetcher()
        .fetch(&req, || async {
            panic!("fresh cache hit must not invoke the fetch capability")
        })
        .await
        .unwrap();
    assert_eq!(value, json!({"temp": 18}));
}

#[tokio::test]
async fn test_reconnect_flips_repositories_back_to_live() {
    let gateway = test_gateway();
    let weather = ModeSwitched::new(LiveWeatherRepo, CannedWeatherRepo, gateway.mode());

    gateway.mode().go_offline("manual");
    assert!(matches!(weather.active(), ActiveRepo::Substitute(_)));

    let reconnected = gateway
        .mode()
        .try_reconnect(&FixedProbe { available: true })
        .await;
    assert!(reconnected);
    assert_eq!(gateway.mode().mode(), Mode::Online);
    assert!(matches!(weather.active(), ActiveRepo::Live(_)));
}

#[tokio::test]
async fn test_failed_reconnect_is_reported_not_thrown() {
    let gateway = test_gateway();
    gateway.mode().go_offline("manual");

    let reconnected = gateway
        .mode()
        .try_reconnect(&FixedProbe { available: false })
        .await;
    assert!(!reconnected);
    assert_eq!(gateway.mode().mode(), Mode::Offline);
}

#[tokio::test]
async fn test_mode_transitions_are_observable() {
    let gateway = test_gateway();
    let mut rx = gateway.mode().subscribe();

    gateway.mode().go_offline("manual");
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), Mode::Offline);

    gateway
        .mode()
        .try_reconnect(&FixedProbe { available: true })
        .await;
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), Mode::Online);
}
