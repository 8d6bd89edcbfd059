//! Cloud Firestore module.
//!
//! This module provides functionality for interacting with Cloud Firestore as a
//! signed-in end user: references to collections and documents, one-shot reads,
//! queries, field updates with server-side transforms, and real-time listeners.
//!
//! # Real-time Updates
//!
//! `listen()` on a `DocumentReference` or an `ExecutableQuery` returns a stream of
//! full snapshots. Each item replaces the previous one; dropping the stream closes
//! the underlying connection.

pub mod commit;
pub mod listen;
pub mod models;
pub mod query;
pub mod reference;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod tests;

use self::query::{ExecutableQuery, Query};
use self::reference::{CollectionReference, DocumentReference};
use crate::config::ClientConfig;
use crate::core::middleware::IdTokenMiddleware;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use thiserror::Error;

pub use self::commit::FieldUpdate;
pub use self::models::{Direction, FieldOperator};
pub use self::snapshot::{DocumentSnapshot, QuerySnapshot};
pub use self::store::DocumentStore;

/// A live sequence of full snapshots.
pub type SnapshotStream<T> = BoxStream<'static, Result<T, FirestoreError>>;

/// Errors that can occur during Firestore operations.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Firestore API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// HTTP client plus the addressing of one database.
#[derive(Clone)]
pub(crate) struct Connection {
    pub(crate) client: ClientWithMiddleware,
    /// URL of the documents root, e.g. `.../v1/projects/p/databases/(default)/documents`
    pub(crate) base_url: String,
    /// Resource name of the documents root, e.g. `projects/p/databases/(default)/documents`
    root_name: String,
}

impl Connection {
    pub(crate) fn new(client: ClientWithMiddleware, base_url: String) -> Self {
        let root_name = match base_url.find("projects/") {
            Some(idx) => base_url[idx..].to_string(),
            None => base_url.clone(),
        };
        Self {
            client,
            base_url,
            root_name,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub(crate) fn name(&self, path: &str) -> String {
        if path.is_empty() {
            self.root_name.clone()
        } else {
            format!("{}/{}", self.root_name, path)
        }
    }

    /// Strips the documents root off a resource name.
    pub(crate) fn relative<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.root_name.as_str())
            .unwrap_or(name)
            .trim_start_matches('/')
    }

    pub(crate) fn database_name(&self) -> String {
        self.root_name
            .strip_suffix("/documents")
            .unwrap_or(&self.root_name)
            .to_string()
    }
}

/// Client for interacting with Cloud Firestore.
#[derive(Clone)]
pub struct FirebaseFirestore {
    conn: Connection,
}

impl FirebaseFirestore {
    /// Creates a new `FirebaseFirestore` instance.
    ///
    /// This is typically called via `PhotoFeedApp::firestore()`.
    pub fn new(config: &ClientConfig, middleware: IdTokenMiddleware) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(middleware)
            .build();

        Self::new_with_client(client, config.firestore_url())
    }

    /// Creates a new `FirebaseFirestore` instance over a prepared client (emulators, tests).
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self {
            conn: Connection::new(client, base_url),
        }
    }

    /// Gets a `CollectionReference` for the collection at the specified path.
    ///
    /// # Arguments
    ///
    /// * `collection_path` - e.g. `"posts"` or `"posts/abc/comments"`.
    pub fn collection(&self, collection_path: &str) -> CollectionReference {
        CollectionReference {
            conn: self.conn.clone(),
            path: collection_path.to_string(),
        }
    }

    /// Gets a `DocumentReference` for the document at the specified path.
    ///
    /// # Arguments
    ///
    /// * `document_path` - The slash-separated path to the document (e.g., "users/user1").
    pub fn doc(&self, document_path: &str) -> DocumentReference {
        DocumentReference {
            conn: self.conn.clone(),
            path: document_path.to_string(),
        }
    }

    /// Creates an executable query from a query definition.
    pub fn query(&self, query: Query) -> ExecutableQuery {
        ExecutableQuery::new(self.conn.clone(), query)
    }
}
