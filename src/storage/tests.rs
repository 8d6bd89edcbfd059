use super::*;
use crate::storage::file::ObjectMetadata;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

fn storage(server: &MockServer) -> FirebaseStorage {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseStorage::new_with_client(client, server.url("/v0"), "demo.appspot.com".to_string())
}

#[tokio::test]
async fn test_save_returns_metadata() {
    let server = MockServer::start();
    let storage = storage(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v0/b/demo.appspot.com/o")
            .query_param("name", "posts/1700000000000.jpg")
            .header("content-type", "image/jpeg")
            .body("jpeg-bytes");
        then.status(200).json_body(json!({
            "name": "posts/1700000000000.jpg",
            "bucket": "demo.appspot.com",
            "generation": "1700000000000001",
            "contentType": "image/jpeg",
            "size": "10",
            "downloadTokens": "tok-1"
        }));
    });

    let file = storage.bucket(None).file("posts/1700000000000.jpg");
    let metadata = file.save(b"jpeg-bytes".to_vec(), "image/jpeg").await.unwrap();

    mock.assert();
    assert_eq!(metadata.download_tokens.as_deref(), Some("tok-1"));
    assert_eq!(
        file.download_url(&metadata).unwrap(),
        server.url("/v0/b/demo.appspot.com/o/posts%2F1700000000000.jpg?alt=media&token=tok-1")
    );
}

#[tokio::test]
async fn test_save_failure() {
    let server = MockServer::start();
    let storage = storage(&server);

    server.mock(|when, then| {
        when.method(POST).path("/v0/b/other-bucket/o");
        then.status(403).body("Permission denied");
    });

    let err = storage
        .bucket(Some("other-bucket"))
        .file("a.jpg")
        .save(Vec::new(), "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::ApiError(ref msg) if msg.contains("Permission denied")));
}

#[tokio::test]
async fn test_delete() {
    let server = MockServer::start();
    let storage = storage(&server);

    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path_matches("^/v0/b/demo.appspot.com/o/posts(%2F|/)old.jpg$");
        then.status(204);
    });

    storage.bucket(None).file("posts/old.jpg").delete().await.unwrap();
    mock.assert();
}

#[test]
fn test_download_url_takes_first_token() {
    let storage = FirebaseStorage::new_with_client(
        ClientBuilder::new(Client::new()).build(),
        "https://firebasestorage.googleapis.com/v0".to_string(),
        "demo.appspot.com".to_string(),
    );
    let file = storage.bucket(None).file("posts/1.jpg");

    let metadata = ObjectMetadata {
        download_tokens: Some("first,second".to_string()),
        ..Default::default()
    };
    assert_eq!(
        file.download_url(&metadata).unwrap(),
        "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o/posts%2F1.jpg?alt=media&token=first"
    );

    assert!(matches!(
        file.download_url(&ObjectMetadata::default()),
        Err(StorageError::MissingDownloadToken(_))
    ));
}
