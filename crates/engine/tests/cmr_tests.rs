// CMR search client against a mock HTTP server.

use granary_engine::{CmrClient, EngineError, LookupOutcome, MetadataSource};
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client(server: &MockServer) -> CmrClient {
    CmrClient::new(&server.base_url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_lookup_returns_first_item_umm() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/search/granules.umm_json")
                .query_param("ShortName", "ATL03")
                .query_param("GranuleUR", "ATL03_20181014_001");
            then.status(200).json_body(json!({
                "hits": 2,
                "took": 12,
                "items": [
                    {"meta": {"concept-id": "G1-X"}, "umm": {"GranuleUR": "ATL03_20181014_001"}},
                    {"meta": {"concept-id": "G2-X"}, "umm": {"GranuleUR": "other"}}
                ]
            }));
        })
        .await;

    let outcome = client(&server)
        .lookup("ATL03", "ATL03_20181014_001")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(
        outcome,
        LookupOutcome::Found(json!({"GranuleUR": "ATL03_20181014_001"}))
    );
}

#[tokio::test]
async fn test_zero_hits_is_not_an_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search/granules.umm_json");
            then.status(200).json_body(json!({"hits": 0, "took": 3, "items": []}));
        })
        .await;

    let outcome = client(&server).lookup("ATL03", "missing").await.unwrap();
    assert_eq!(outcome, LookupOutcome::NoHits);
}

#[tokio::test]
async fn test_server_error_is_lookup_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search/granules.umm_json");
            then.status(503).body("service unavailable");
        })
        .await;

    let err = client(&server).lookup("ATL03", "G1").await.unwrap_err();
    match err {
        EngineError::RemoteLookup { granule, message } => {
            assert_eq!(granule, "G1");
            assert!(message.contains("503"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_hits_without_items_is_lookup_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search/granules.umm_json");
            then.status(200).json_body(json!({"hits": 1, "items": []}));
        })
        .await;

    assert!(matches!(
        client(&server).lookup("ATL03", "G1").await,
        Err(EngineError::RemoteLookup { .. })
    ));
}

#[tokio::test]
async fn test_undecodable_body_is_lookup_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search/granules.umm_json");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    assert!(matches!(
        client(&server).lookup("ATL03", "G1").await,
        Err(EngineError::RemoteLookup { .. })
    ));
}

#[tokio::test]
async fn test_truncated_body_reports_read_failure() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    // Promises more body than it sends, then closes the connection.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await.unwrap();
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n{\"hits\": 1,",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let client = CmrClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    match client.lookup("ATL03", "G1").await {
        Err(EngineError::RemoteLookup { granule, message }) => {
            assert_eq!(granule, "G1");
            assert!(
                message.contains("failed to read search response"),
                "unexpected message: {message}"
            );
        }
        other => panic!("expected lookup failure, got {other:?}"),
    }
    server.await.unwrap();
}
