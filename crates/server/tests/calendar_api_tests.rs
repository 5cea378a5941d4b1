//! Integration tests for the calendar HTTP endpoints.

mod common;

use axum::http::StatusCode;
use bytes::Bytes;
use calsnap_metadata::repos::OwnerRepo;
use common::{TestServer, calendar_uri, seeded_bytes};
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const START: &str = "2024-01-01T00:00:00Z";
const END: &str = "2024-01-02T00:00:00Z";

async fn reserve(server: &TestServer, owner: &str, hash: &str) -> StatusCode {
    let uri = calendar_uri("ReserveName", owner, hash, &[]);
    server.send("POST", &uri, None).await.0
}

async fn upload_full(server: &TestServer, owner: &str, hash: &str, data: Bytes) -> StatusCode {
    let uri = calendar_uri("AddFullSnapshot", owner, hash, &[]);
    server.send("POST", &uri, Some(data)).await.0
}

async fn upload_partial(
    server: &TestServer,
    owner: &str,
    hash: &str,
    start: &str,
    end: &str,
    data: Bytes,
) -> StatusCode {
    let uri = calendar_uri(
        "AddPartialSnapshot",
        owner,
        hash,
        &[("windowStart", start), ("windowEnd", end)],
    );
    server.send("POST", &uri, Some(data)).await.0
}

async fn list(server: &TestServer, owner: &str, hash: &str) -> (StatusCode, Value) {
    let uri = calendar_uri("GetAvailableSnapshots", owner, hash, &[]);
    server.send_json("GET", &uri, None).await
}

#[tokio::test]
async fn test_alive_and_health() {
    let server = TestServer::new().await;

    let (status, _) = server.send("GET", "/calendar/Alive", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = server.send_json("GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("status").and_then(|v| v.as_str()), Some("ok"));
}

#[tokio::test]
async fn test_reserve_then_authenticate() {
    let server = TestServer::new().await;

    assert_eq!(reserve(&server, "alice", "h1").await, StatusCode::NO_CONTENT);
    // Reserving again with the same hash acts as a login.
    assert_eq!(reserve(&server, "alice", "h1").await, StatusCode::NO_CONTENT);

    let uri = calendar_uri("Authenticate", "alice", "h1", &[]);
    assert_eq!(server.send("GET", &uri, None).await.0, StatusCode::NO_CONTENT);

    assert_eq!(server.metadata().list_owners().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_wrong_hash_is_unauthorized() {
    let server = TestServer::new().await;
    assert_eq!(reserve(&server, "alice", "h1").await, StatusCode::NO_CONTENT);

    assert_eq!(reserve(&server, "alice", "h2").await, StatusCode::UNAUTHORIZED);

    let uri = calendar_uri("Authenticate", "alice", "h2", &[]);
    let (status, body) = server.send_json("GET", &uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.get("code").and_then(|v| v.as_str()), Some("unauthorized"));
}

#[tokio::test]
async fn test_unknown_owner_is_unauthorized_and_not_created() {
    let server = TestServer::new().await;

    let uri = calendar_uri("Authenticate", "ghost", "h", &[]);
    assert_eq!(server.send("GET", &uri, None).await.0, StatusCode::UNAUTHORIZED);

    let status = upload_full(&server, "ghost", "h", Bytes::from_static(b"data")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(server.metadata().list_owners().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_are_unauthorized() {
    let server = TestServer::new().await;

    let (status, _) = server
        .send("GET", "/calendar/Authenticate?ownerName=alice", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server.send("POST", "/calendar/ReserveName", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_full_snapshot_round_trip() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;

    let data = seeded_bytes(7, 4096);
    assert_eq!(
        upload_full(&server, "alice", "h", data.clone()).await,
        StatusCode::NO_CONTENT
    );

    let (status, body) = list(&server, "alice", "h").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["type"], "Full");
    assert!(entries[0]["windowStart"].is_null());
    assert!(entries[0]["windowEnd"].is_null());

    let id = entries[0]["id"].as_i64().unwrap().to_string();
    let uri = calendar_uri("GetSnapshotData", "alice", "h", &[("id", &id)]);
    let (status, fetched) = server.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, data);
}

#[tokio::test]
async fn test_partial_snapshot_records_window() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;

    let status = upload_partial(&server, "alice", "h", START, END, seeded_bytes(1, 32)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = list(&server, "alice", "h").await;
    let entry = &body.as_array().unwrap()[0];
    assert_eq!(entry["type"], "Partial");
    assert_eq!(entry["windowStart"], START);
    assert_eq!(entry["windowEnd"], END);
}

#[tokio::test]
async fn test_partial_snapshot_accepts_legacy_parameter_names() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;

    let uri = calendar_uri(
        "AddPartialSnapshot",
        "alice",
        "h",
        &[
            ("modifiedInterval_Start", "2024-03-01T00:00:00"),
            ("modifiedInterval_End", "2024-03-02"),
        ],
    );
    let (status, _) = server.send("POST", &uri, Some(seeded_bytes(2, 8))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Legacy listing route.
    let uri = calendar_uri("GetAvaliableSnapshots", "alice", "h", &[]);
    let (status, body) = server.send_json("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_snapshot_rejects_bad_windows() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;
    let data = seeded_bytes(3, 16);

    // start > end
    let status = upload_partial(&server, "alice", "h", END, START, data.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // unparsable bound
    let status = upload_partial(&server, "alice", "h", "not-a-date", END, data.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // missing bound
    let uri = calendar_uri("AddPartialSnapshot", "alice", "h", &[("windowStart", START)]);
    assert_eq!(
        server.send("POST", &uri, Some(data)).await.0,
        StatusCode::BAD_REQUEST
    );

    let (_, body) = list(&server, "alice", "h").await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_body_is_bad_request() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;

    assert_eq!(
        upload_full(&server, "alice", "h", Bytes::new()).await,
        StatusCode::BAD_REQUEST
    );
    let status = upload_partial(&server, "alice", "h", START, END, Bytes::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_not_truncated() {
    let server = TestServer::with_config(|config| {
        config.server.max_payload_bytes = 1024;
        config.server.serialize_large_payload_reads = true;
    })
    .await;
    reserve(&server, "alice", "h").await;

    let status = upload_full(&server, "alice", "h", seeded_bytes(4, 1025)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let status = upload_full(&server, "alice", "h", seeded_bytes(4, 1024)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = list(&server, "alice", "h").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_listing_is_ordered_oldest_first() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;

    upload_full(&server, "alice", "h", seeded_bytes(1, 8)).await;
    upload_partial(&server, "alice", "h", START, END, seeded_bytes(2, 8)).await;
    upload_full(&server, "alice", "h", seeded_bytes(3, 8)).await;

    let (_, body) = list(&server, "alice", "h").await;
    let entries = body.as_array().unwrap();
    let kinds: Vec<&str> = entries.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["Full", "Partial", "Full"]);

    let timestamps: Vec<OffsetDateTime> = entries
        .iter()
        .map(|e| OffsetDateTime::parse(e["timestamp"].as_str().unwrap(), &Rfc3339).unwrap())
        .collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_snapshot_data_errors() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "h").await;

    let uri = calendar_uri("GetSnapshotData", "alice", "h", &[("id", "abc")]);
    assert_eq!(server.send("GET", &uri, None).await.0, StatusCode::BAD_REQUEST);

    let uri = calendar_uri("GetSnapshotData", "alice", "h", &[]);
    assert_eq!(server.send("GET", &uri, None).await.0, StatusCode::BAD_REQUEST);

    let uri = calendar_uri("GetSnapshotData", "alice", "h", &[("id", "999")]);
    assert_eq!(server.send("GET", &uri, None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_snapshots_are_scoped_to_owner() {
    let server = TestServer::new().await;
    reserve(&server, "alice", "ha").await;
    reserve(&server, "bob", "hb").await;

    upload_full(&server, "alice", "ha", seeded_bytes(9, 64)).await;

    let (_, body) = list(&server, "bob", "hb").await;
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = list(&server, "alice", "ha").await;
    let id = body[0]["id"].as_i64().unwrap().to_string();

    let uri = calendar_uri("GetSnapshotData", "bob", "hb", &[("id", &id)]);
    assert_eq!(server.send("GET", &uri, None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_reservations_yield_one_owner() {
    let server = Arc::new(TestServer::new().await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            reserve(&server, "race", "same").await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::NO_CONTENT);
    }

    assert_eq!(server.metadata().list_owners().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_exporter_endpoints() {
    let temp = tempfile::tempdir().unwrap();
    let version_path = temp.path().join("version.txt");
    let archive_path = temp.path().join("calsnap-client.zip");
    std::fs::write(&version_path, "1.4.2\n").unwrap();
    std::fs::write(&archive_path, b"PK\x03\x04archive").unwrap();

    let server = TestServer::with_config(|config| {
        config.exporter.version_path = Some(version_path.clone());
        config.exporter.archive_path = Some(archive_path.clone());
    })
    .await;

    let (status, body) = server.send("GET", "/exporter/GetVersion", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"1.4.2");

    let (status, body) = server.send("GET", "/exporter/GetArchive", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"PK\x03\x04archive");

    let bare = TestServer::new().await;
    let (status, _) = bare.send("GET", "/exporter/GetVersion", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = bare.send("GET", "/exporter/GetArchive", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint_toggle() {
    calsnap_server::metrics::register_metrics();

    let server = TestServer::new().await;
    let (status, body) = server.send("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("calsnap_"));

    let server = TestServer::with_config(|config| config.server.metrics_enabled = false).await;
    let (status, _) = server.send("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
