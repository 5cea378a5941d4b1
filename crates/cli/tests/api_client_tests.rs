use bytes::Bytes;
use calsnap_cli::{ApiClient, OwnerCredentials, SnapshotTransport, TransportError};
use calsnap_core::{SnapshotId, SnapshotKind, SnapshotWindow};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use time::macros::datetime;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        &server.base_url(),
        OwnerCredentials {
            owner_name: "alice".to_string(),
            passphrase_hash: "hash-1".to_string(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_uploads_send_credentials_and_body() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let reserve = server.mock(|when, then| {
        when.method(POST)
            .path("/calendar/ReserveName")
            .query_param("ownerName", "alice")
            .query_param("passphraseHash", "hash-1");
        then.status(204);
    });
    let full = server.mock(|when, then| {
        when.method(POST)
            .path("/calendar/AddFullSnapshot")
            .query_param("ownerName", "alice")
            .header("content-type", "application/octet-stream")
            .body("full-bytes");
        then.status(204);
    });
    let partial = server.mock(|when, then| {
        when.method(POST)
            .path("/calendar/AddPartialSnapshot")
            .query_param("passphraseHash", "hash-1")
            .query_param("windowStart", "2024-01-01T00:00:00Z")
            .query_param("windowEnd", "2024-01-02T12:30:00Z")
            .body("partial-bytes");
        then.status(204);
    });

    let client = client(&server);
    client.reserve_or_authenticate().await.unwrap();
    client
        .upload_full(Bytes::from_static(b"full-bytes"))
        .await
        .unwrap();
    let window = SnapshotWindow::new(
        datetime!(2024-01-01 00:00:00 UTC),
        datetime!(2024-01-02 12:30:00 UTC),
    )
    .unwrap();
    client
        .upload_partial(window, Bytes::from_static(b"partial-bytes"))
        .await
        .unwrap();

    reserve.assert();
    full.assert();
    partial.assert();
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/calendar/Authenticate");
        then.status(401)
            .json_body(json!({"code": "unauthorized", "message": "invalid owner credentials"}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/calendar/AddFullSnapshot");
        then.status(413)
            .json_body(json!({"code": "payload_too_large", "message": "too big"}));
    });

    let client = client(&server);
    assert!(matches!(
        client.authenticate().await,
        Err(TransportError::Unauthorized)
    ));

    let err = client
        .upload_full(Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    match err {
        TransportError::Rejected { status, message } => {
            assert_eq!(status, 413);
            assert!(message.contains("too big"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_list_and_fetch_decode_responses() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/calendar/GetAvailableSnapshots")
            .query_param("ownerName", "alice");
        then.status(200).json_body(json!([
            {
                "id": 1,
                "timestamp": "2024-03-01T10:00:00Z",
                "type": "Full",
                "windowStart": null,
                "windowEnd": null
            },
            {
                "id": 2,
                "timestamp": "2024-03-02T10:00:00Z",
                "type": "Partial",
                "windowStart": "2024-03-01T10:00:00Z",
                "windowEnd": "2024-03-02T10:00:00Z"
            }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/calendar/GetSnapshotData")
            .query_param("id", "2");
        then.status(200)
            .header("content-type", "application/octet-stream")
            .body("opaque");
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/calendar/GetSnapshotData")
            .query_param("id", "9");
        then.status(404)
            .json_body(json!({"code": "not_found", "message": "snapshot not found"}));
    });

    let client = client(&server);
    let snapshots = client.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].kind, SnapshotKind::Full);
    assert!(snapshots[0].window_start.is_none());
    assert_eq!(snapshots[1].kind, SnapshotKind::Partial);
    assert_eq!(
        snapshots[1].window_end,
        Some(datetime!(2024-03-02 10:00:00 UTC))
    );

    let data = client.fetch_snapshot(SnapshotId::new(2)).await.unwrap();
    assert_eq!(&data[..], b"opaque");

    assert!(matches!(
        client.fetch_snapshot(SnapshotId::new(9)).await,
        Err(TransportError::Rejected { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_malformed_listing_is_a_decode_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/calendar/GetAvailableSnapshots");
        then.status(200).body("not json");
    });

    let err = client(&server).list_snapshots().await.unwrap_err();
    assert!(matches!(err, TransportError::Decode(_)));
}
