use std::sync::Arc;
use std::time::Duration;

use derrick::api::{self, ApiState};
use derrick::client::{send_payload, ApiClient};
use derrick::control::ControlSurface;
use derrick::{FrameLimits, HistoryStore, IngestServer};

#[tokio::test]
async fn console_round_trip_through_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::open(&dir.path().join("history.json"), false).unwrap());

    let state = ApiState {
        store: store.clone(),
        control: Arc::new(ControlSurface::default()),
        stale_after: Duration::from_secs(30),
    };
    let (api_addr, api_server) = api::bind_api(state, "127.0.0.1:0").unwrap();
    tokio::spawn(api_server);

    let ingest = IngestServer::bind("127.0.0.1:0", store, FrameLimits::default()).await.unwrap();
    let ingest_addr = ingest.local_addr().unwrap().to_string();
    tokio::spawn(ingest.run());

    let api = ApiClient::new(&api_addr.to_string());

    send_payload(
        &ingest_addr,
        br#"{"well_data":[{"timestamp":"2024-01-01T00:00:00Z","client":"W1","Oil volume":50,"forecast":{"forecast_date":"2024-01-02","predictions":{"Oil volume":48}}}]}"#,
    )
    .await
    .unwrap();

    let mut history = Vec::new();
    for _ in 0..200 {
        history = api.history(None).await.unwrap();
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(history.len(), 1);
    assert!(history[0].has_forecast());

    let latest = api.latest(Some("W1")).await.unwrap().unwrap();
    assert_eq!(latest.metric("Oil volume"), Some(50.0));
    assert!(api.latest(Some("W2")).await.unwrap().is_none());

    let status = api.status().await.unwrap();
    assert_eq!(status.records, 1);
    assert_eq!(status.latest_timestamp.as_deref(), Some("2024-01-01T00:00:00+00:00"));
    assert!(!status.active);

    assert!(api.set_active(true).await.unwrap().active);
    assert_eq!(api.reset().await.unwrap().epoch, 1);
    assert!(api.history(Some(10)).await.unwrap().is_empty());
    assert!(api.status().await.unwrap().active);
}

#[test]
fn bad_api_address_is_a_bind_error() {
    let dir = tempfile::tempdir().unwrap();
    let state = ApiState {
        store: Arc::new(HistoryStore::open(&dir.path().join("history.json"), false).unwrap()),
        control: Arc::new(ControlSurface::default()),
        stale_after: Duration::from_secs(30),
    };
    assert!(matches!(
        api::bind_api(state, "not-an-address").err(),
        Some(derrick::Error::Bind { .. })
    ));
}
