use super::*;
use futures::StreamExt;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde::Deserialize;
use serde_json::json;

const ROOT: &str = "/v1/projects/p/databases/(default)/documents";
const ROOT_NAME: &str = "projects/p/databases/(default)/documents";

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PostData {
    caption: String,
    user_id: String,
    likes: Vec<String>,
}

fn firestore(server: &MockServer) -> FirebaseFirestore {
    FirebaseFirestore::new_with_client(ClientBuilder::new(Client::new()).build(), server.url(ROOT))
}

fn post_document(id: &str, caption: &str, created_at: &str) -> serde_json::Value {
    json!({
        "name": format!("{}/posts/{}", ROOT_NAME, id),
        "fields": {
            "caption": { "stringValue": caption },
            "userId": { "stringValue": "u1" },
            "likes": { "arrayValue": { "values": [{ "stringValue": "u2" }] } },
            "createdAt": { "timestampValue": created_at }
        },
        "createTime": created_at,
        "updateTime": created_at
    })
}

#[tokio::test]
async fn test_get_document() {
    let server = MockServer::start();
    let db = firestore(&server);

    let mock = server.mock(|when, then| {
        when.method(GET).path(format!("{}/posts/abc", ROOT));
        then.status(200)
            .json_body(post_document("abc", "sunset", "2024-01-01T00:00:00Z"));
    });

    let snapshot = db.get_document("posts/abc").await.unwrap();
    mock.assert();

    assert!(snapshot.exists());
    assert_eq!(snapshot.id(), "abc");
    assert_eq!(snapshot.path(), "posts/abc");
    let data: PostData = snapshot.data().unwrap().unwrap();
    assert_eq!(
        data,
        PostData {
            caption: "sunset".into(),
            user_id: "u1".into(),
            likes: vec!["u2".into()],
        }
    );

    assert_eq!(snapshot.get_field::<String>("caption").unwrap().as_deref(), Some("sunset"));
    assert_eq!(snapshot.get_field::<Vec<String>>("likes").unwrap(), Some(vec!["u2".to_string()]));
    assert_eq!(snapshot.get_field::<String>("missing").unwrap(), None);
    assert!(snapshot.get_field::<i64>("caption").is_err());
}

#[tokio::test]
async fn test_get_missing_document() {
    let server = MockServer::start();
    let db = firestore(&server);

    server.mock(|when, then| {
        when.method(GET).path(format!("{}/users/ghost", ROOT));
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
        }));
    });

    let snapshot = db.get_document("users/ghost").await.unwrap();
    assert!(!snapshot.exists());
    assert_eq!(snapshot.id(), "ghost");
    assert_eq!(snapshot.data::<PostData>().unwrap(), None);
    assert_eq!(snapshot.get_field::<String>("caption").unwrap(), None);
}

#[tokio::test]
async fn test_run_query_on_subcollection() {
    let server = MockServer::start();
    let db = firestore(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/posts/abc:runQuery", ROOT))
            .json_body(json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "comments" }],
                    "orderBy": [{ "field": { "fieldPath": "createdAt" }, "direction": "ASCENDING" }]
                }
            }));
        then.status(200).json_body(json!([
            {
                "document": {
                    "name": format!("{}/posts/abc/comments/c1", ROOT_NAME),
                    "fields": { "content": { "stringValue": "first" } }
                },
                "readTime": "2024-01-01T00:00:05Z"
            },
            {
                "document": {
                    "name": format!("{}/posts/abc/comments/c2", ROOT_NAME),
                    "fields": { "content": { "stringValue": "second" } }
                },
                "readTime": "2024-01-01T00:00:05Z"
            }
        ]));
    });

    let query = Query::at_path("posts/abc/comments").order_by("createdAt", Direction::Ascending);
    let snapshot = db.run_query(&query).await.unwrap();
    mock.assert();

    assert_eq!(snapshot.size(), 2);
    let ids: Vec<&str> = snapshot.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert_eq!(snapshot.documents()[1].path(), "posts/abc/comments/c2");
    assert_eq!(snapshot.read_time(), Some("2024-01-01T00:00:05Z"));
}

#[tokio::test]
async fn test_empty_query_result() {
    let server = MockServer::start();
    let db = firestore(&server);

    server.mock(|when, then| {
        when.method(POST).path(format!("{}:runQuery", ROOT));
        then.status(200)
            .json_body(json!([{ "readTime": "2024-01-01T00:00:00Z" }]));
    });

    let snapshot = db.run_query(&Query::new("posts")).await.unwrap();
    assert!(snapshot.empty());
}

#[tokio::test]
async fn test_update_document_sends_array_union() {
    let server = MockServer::start();
    let db = firestore(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:commit", ROOT))
            .json_body(json!({
                "writes": [{
                    "update": { "name": format!("{}/posts/abc", ROOT_NAME), "fields": {} },
                    "updateMask": { "fieldPaths": [] },
                    "updateTransforms": [{
                        "fieldPath": "likes",
                        "appendMissingElements": { "values": [{ "stringValue": "u9" }] }
                    }],
                    "currentDocument": { "exists": true }
                }]
            }));
        then.status(200).json_body(json!({
            "writeResults": [{ "updateTime": "2024-01-01T00:00:01Z" }],
            "commitTime": "2024-01-01T00:00:01Z"
        }));
    });

    db.update_document(
        "posts/abc",
        vec![FieldUpdate::ArrayUnion("likes".into(), vec![json!("u9")])],
    )
    .await
    .unwrap();

    mock.assert();
}

#[tokio::test]
async fn test_update_missing_document_fails() {
    let server = MockServer::start();
    let db = firestore(&server);

    server.mock(|when, then| {
        when.method(POST).path(format!("{}:commit", ROOT));
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "No document to update", "status": "NOT_FOUND" }
        }));
    });

    let err = db
        .update_document("posts/gone", vec![FieldUpdate::set("caption", "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, FirestoreError::ApiError(ref msg) if msg.contains("No document to update")));
}

#[tokio::test]
async fn test_add_document_generates_id() {
    let server = MockServer::start();
    let db = firestore(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:commit", ROOT))
            .body_includes(format!("{}/posts/abc/comments/", ROOT_NAME))
            .body_includes("\"setToServerValue\":\"REQUEST_TIME\"")
            .body_includes("\"exists\":false");
        then.status(200).json_body(json!({
            "writeResults": [{ "updateTime": "2024-01-01T00:00:01Z" }],
            "commitTime": "2024-01-01T00:00:01Z"
        }));
    });

    let id = db
        .add_document(
            "posts/abc/comments",
            vec![
                FieldUpdate::set("content", "nice"),
                FieldUpdate::ServerTimestamp("createdAt".into()),
            ],
        )
        .await
        .unwrap();

    mock.assert();
    assert_eq!(id.len(), 20);
}

#[tokio::test]
async fn test_listen_query_assembles_ordered_snapshot() {
    let server = MockServer::start();
    let db = firestore(&server);

    let body = json!([
        { "targetChange": { "targetChangeType": "ADD", "targetIds": [1] } },
        { "documentChange": { "document": post_document("old", "first", "2024-01-01T00:00:00Z"), "targetIds": [1] } },
        { "documentChange": { "document": post_document("new", "second", "2024-01-02T00:00:00Z"), "targetIds": [1] } },
        { "targetChange": { "targetChangeType": "CURRENT", "targetIds": [1] } },
        { "targetChange": { "readTime": "2024-01-02T00:00:01Z" } }
    ]);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:listen", ROOT))
            .body_includes("\"database\":\"projects/p/databases/(default)\"")
            .body_includes("\"targetId\":1");
        then.status(200).body(body.to_string());
    });

    let query = Query::new("posts").order_by("createdAt", Direction::Descending);
    let mut stream = db.listen_query(&query).await.unwrap();

    let snapshot = stream.next().await.unwrap().unwrap();
    mock.assert();

    let ids: Vec<&str> = snapshot.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["new", "old"]);
    assert_eq!(snapshot.read_time(), Some("2024-01-02T00:00:01Z"));

    // body exhausted
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_listen_document_reports_absence() {
    let server = MockServer::start();
    let db = firestore(&server);

    let body = json!([
        { "targetChange": { "targetChangeType": "ADD", "targetIds": [1] } },
        { "targetChange": { "targetChangeType": "CURRENT", "targetIds": [1] } },
        { "targetChange": { "readTime": "2024-01-01T00:00:00Z" } }
    ]);

    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:listen", ROOT))
            .body_includes(format!("{}/users/u1", ROOT_NAME));
        then.status(200).body(body.to_string());
    });

    let mut stream = db.listen_document("users/u1").await.unwrap();
    let snapshot = stream.next().await.unwrap().unwrap();
    assert!(!snapshot.exists());
    assert_eq!(snapshot.path(), "users/u1");
}

#[tokio::test]
async fn test_listen_rejected() {
    let server = MockServer::start();
    let db = firestore(&server);

    server.mock(|when, then| {
        when.method(POST).path(format!("{}:listen", ROOT));
        then.status(403).body("permission denied");
    });

    let result = db.listen_query(&Query::new("posts")).await;
    assert!(matches!(result, Err(FirestoreError::ApiError(_))));
}

#[test]
fn test_connection_addressing() {
    let conn = Connection::new(
        ClientBuilder::new(Client::new()).build(),
        format!("https://firestore.googleapis.com{}", ROOT),
    );

    assert_eq!(conn.name(""), ROOT_NAME);
    assert_eq!(conn.name("posts/a"), format!("{}/posts/a", ROOT_NAME));
    assert_eq!(conn.relative(&format!("{}/posts/a", ROOT_NAME)), "posts/a");
    assert_eq!(conn.database_name(), "projects/p/databases/(default)");
    assert_eq!(
        conn.url("posts/a"),
        format!("https://firestore.googleapis.com{}/posts/a", ROOT)
    );
}
