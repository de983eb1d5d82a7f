use std::fs;
use std::sync::Arc;
use std::time::Duration;

use derrick::client::send_payload;
use derrick::{FrameLimits, HistoryStore, IngestServer, Record};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

struct Harness {
    dir: TempDir,
    store: Arc<HistoryStore>,
    addr: String,
}

impl Harness {
    async fn start(limits: FrameLimits) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HistoryStore::open(&dir.path().join("history.json"), false).unwrap());
        let server = IngestServer::bind("127.0.0.1:0", store.clone(), limits).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());
        Self { dir, store, addr }
    }

    fn history_bytes(&self) -> Vec<u8> {
        fs::read(self.dir.path().join("history.json")).unwrap()
    }

    /// Polls until the history holds `len` records. Payloads are merged after
    /// the sender has already disconnected, so tests cannot simply await the send.
    async fn wait_for_len(&self, len: usize) -> Vec<Record> {
        for _ in 0..200 {
            let records = self.store.snapshot().unwrap();
            if records.len() == len {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("history never reached {} records", len);
    }
}

fn clients(records: &[Record]) -> Vec<&str> {
    records.iter().map(Record::client_or_unknown).collect()
}

#[tokio::test]
async fn end_to_end_newest_first() {
    let h = Harness::start(FrameLimits::default()).await;

    send_payload(
        &h.addr,
        br#"{"well_data":[{"timestamp":"2024-01-01T00:00:00Z","client":"W1","Oil volume":50}]}"#,
    )
    .await
    .unwrap();
    let records = h.wait_for_len(1).await;
    assert_eq!(clients(&records), ["W1"]);
    assert_eq!(records[0].metric("Oil volume"), Some(50.0));
    assert_eq!(records[0].timestamp_str(), Some("2024-01-01T00:00:00Z"));

    send_payload(
        &h.addr,
        br#"[{"timestamp":"2024-01-01T00:00:10Z","client":"W2","Oil volume":60}]"#,
    )
    .await
    .unwrap();
    let records = h.wait_for_len(2).await;
    assert_eq!(clients(&records), ["W2", "W1"]);
}

#[tokio::test]
async fn malformed_payload_leaves_history_untouched() {
    let h = Harness::start(FrameLimits::default()).await;

    send_payload(&h.addr, br#"{"client":"W1"}"#).await.unwrap();
    h.wait_for_len(1).await;
    let before = h.history_bytes();

    send_payload(&h.addr, br#"{"well_data": [{"client": "W2""#).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.history_bytes(), before);

    send_payload(&h.addr, br#"{"client":"W3"}"#).await.unwrap();
    let records = h.wait_for_len(2).await;
    assert_eq!(clients(&records), ["W3", "W1"]);
}

#[tokio::test]
async fn empty_connection_is_ignored() {
    let h = Harness::start(FrameLimits::default()).await;
    let before = h.history_bytes();

    let stream = TcpStream::connect(&h.addr).await.unwrap();
    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.history_bytes(), before);
    assert!(h.store.snapshot().unwrap().is_empty());
}

#[tokio::test]
async fn stalled_producer_times_out_without_blocking_others() {
    let limits = FrameLimits {
        idle_timeout: Duration::from_millis(300),
        ..FrameLimits::default()
    };
    let h = Harness::start(limits).await;

    // Writes a complete document but never closes.
    let mut stalled = TcpStream::connect(&h.addr).await.unwrap();
    stalled.write_all(br#"{"client":"slow"}"#).await.unwrap();

    send_payload(&h.addr, br#"{"client":"fast"}"#).await.unwrap();
    let records = h.wait_for_len(1).await;
    assert_eq!(clients(&records), ["fast"]);

    let records = h.wait_for_len(2).await;
    assert_eq!(clients(&records), ["slow", "fast"]);
    drop(stalled);
}

#[tokio::test]
async fn concurrent_connections_lose_no_records() {
    let h = Harness::start(FrameLimits::default()).await;
    let k = 25;

    let sends: Vec<_> = (0..k)
        .map(|i| {
            let addr = h.addr.clone();
            tokio::spawn(async move {
                let payload = format!(r#"{{"client":"W{}","Oil volume":{}}}"#, i, i);
                send_payload(&addr, payload.as_bytes()).await.unwrap();
            })
        })
        .collect();
    for s in sends {
        s.await.unwrap();
    }

    let records = h.wait_for_len(k).await;
    let mut seen: Vec<String> = records.iter().map(|r| r.client_or_unknown().to_string()).collect();
    seen.sort();
    let mut expected: Vec<String> = (0..k).map(|i| format!("W{}", i)).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn oversized_payload_is_discarded() {
    let limits = FrameLimits {
        max_payload_bytes: 64,
        ..FrameLimits::default()
    };
    let h = Harness::start(limits).await;
    let before = h.history_bytes();

    let big = format!(r#"{{"client":"W1","note":"{}"}}"#, "x".repeat(200));
    // The server may drop the socket mid-write; either way nothing is stored.
    let _ = send_payload(&h.addr, big.as_bytes()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.history_bytes(), before);

    send_payload(&h.addr, br#"{"client":"W2"}"#).await.unwrap();
    assert_eq!(clients(&h.wait_for_len(1).await), ["W2"]);
}

#[tokio::test]
async fn reset_after_ingest_is_observed_immediately() {
    let h = Harness::start(FrameLimits::default()).await;

    send_payload(&h.addr, br#"[{"client":"W1"},{"client":"W2"}]"#).await.unwrap();
    h.wait_for_len(2).await;

    let store = h.store.clone();
    let epoch = tokio::task::spawn_blocking(move || store.reset()).await.unwrap().unwrap();
    assert_eq!(epoch, 1);
    assert!(h.store.snapshot().unwrap().is_empty());

    send_payload(&h.addr, br#"{"client":"W3"}"#).await.unwrap();
    assert_eq!(clients(&h.wait_for_len(1).await), ["W3"]);
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let h = Harness::start(FrameLimits::default()).await;
    let err = IngestServer::bind(&h.addr, h.store.clone(), FrameLimits::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, derrick::Error::Bind { .. }));
}
