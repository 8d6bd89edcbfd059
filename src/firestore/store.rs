use super::commit::FieldUpdate;
use super::query::Query;
use super::snapshot::{DocumentSnapshot, QuerySnapshot};
use super::{FirebaseFirestore, FirestoreError, SnapshotStream};

/// The document-store capabilities the views are written against.
///
/// Paths are slash-separated and relative to the database root
/// (`posts/abc`, `posts/abc/comments`).
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, path: &str) -> Result<DocumentSnapshot, FirestoreError>;

    async fn run_query(&self, query: &Query) -> Result<QuerySnapshot, FirestoreError>;

    async fn listen_document(
        &self,
        path: &str,
    ) -> Result<SnapshotStream<DocumentSnapshot>, FirestoreError>;

    async fn listen_query(
        &self,
        query: &Query,
    ) -> Result<SnapshotStream<QuerySnapshot>, FirestoreError>;

    /// Creates a document with a generated id and returns that id.
    async fn add_document(
        &self,
        collection_path: &str,
        fields: Vec<FieldUpdate>,
    ) -> Result<String, FirestoreError>;

    async fn update_document(
        &self,
        path: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<(), FirestoreError>;
}

#[async_trait::async_trait]
impl DocumentStore for FirebaseFirestore {
    async fn get_document(&self, path: &str) -> Result<DocumentSnapshot, FirestoreError> {
        self.doc(path).get().await
    }

    async fn run_query(&self, query: &Query) -> Result<QuerySnapshot, FirestoreError> {
        self.query(query.clone()).get().await
    }

    async fn listen_document(
        &self,
        path: &str,
    ) -> Result<SnapshotStream<DocumentSnapshot>, FirestoreError> {
        self.doc(path).listen().await
    }

    async fn listen_query(
        &self,
        query: &Query,
    ) -> Result<SnapshotStream<QuerySnapshot>, FirestoreError> {
        self.query(query.clone()).listen().await
    }

    async fn add_document(
        &self,
        collection_path: &str,
        fields: Vec<FieldUpdate>,
    ) -> Result<String, FirestoreError> {
        let doc_ref = self.collection(collection_path).add(fields).await?;
        Ok(doc_ref.id().to_string())
    }

    async fn update_document(
        &self,
        path: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<(), FirestoreError> {
        self.doc(path).update(updates).await
    }
}
