use crate::core::parse_error_response;
use super::listen::{listen_request, query_snapshots};
use super::models::{
    CollectionSelector, CompositeFilter, CompositeOperator, Direction, FieldFilter, FieldOperator,
    FieldReference, Filter, ListenRequest, Order, QueryTarget, RunQueryRequest, RunQueryResponse,
    StructuredQuery, Target, TargetType,
};
use super::reference::convert_serde_value_to_firestore_value;
use super::snapshot::{DocumentSnapshot, QuerySnapshot};
use super::{Connection, FirestoreError, SnapshotStream};
use reqwest::header;
use serde::Serialize;

/// A definition of a Firestore query, including the target collection and filters.
///
/// This struct allows you to build a query independently of a specific Firestore client
/// or execution context, enabling reuse across different contexts.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Document path the collection hangs off; empty for root collections.
    pub(crate) parent: String,
    pub(crate) collection_id: String,
    pub(crate) query: StructuredQuery,
}

impl Query {
    /// Creates a new `Query` targeting the specified root collection.
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self::with_parent("", collection_id)
    }

    /// Creates a query on a collection given by its full path, e.g. `posts/abc/comments`.
    pub fn at_path(collection_path: &str) -> Self {
        match collection_path.rsplit_once('/') {
            Some((parent, collection_id)) => Self::with_parent(parent, collection_id),
            None => Self::new(collection_path),
        }
    }

    fn with_parent(parent: &str, collection_id: impl Into<String>) -> Self {
        let collection_id = collection_id.into();
        Self {
            parent: parent.to_string(),
            collection_id: collection_id.clone(),
            query: StructuredQuery {
                from: Some(vec![CollectionSelector {
                    collection_id,
                    all_descendants: None,
                }]),
                where_clause: None,
                order_by: None,
                limit: None,
            },
        }
    }

    /// Adds a filter to the query. Multiple filters are combined with AND.
    pub fn where_filter<T: Serialize>(
        mut self,
        field: &str,
        op: FieldOperator,
        value: T,
    ) -> Result<Self, FirestoreError> {
        let serde_value = serde_json::to_value(value)?;
        let firestore_value = convert_serde_value_to_firestore_value(serde_value)?;

        let filter = Filter::FieldFilter(FieldFilter {
            field: FieldReference {
                field_path: field.to_string(),
            },
            op,
            value: firestore_value,
        });

        self.query.where_clause = Some(match self.query.where_clause.take() {
            None => filter,
            Some(Filter::CompositeFilter(mut cf)) if cf.op == CompositeOperator::And => {
                cf.filters.push(filter);
                Filter::CompositeFilter(cf)
            }
            Some(existing) => Filter::CompositeFilter(CompositeFilter {
                op: CompositeOperator::And,
                filters: vec![existing, filter],
            }),
        });

        Ok(self)
    }

    /// Sorts the query results by the specified field.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        let order = Order {
            field: FieldReference {
                field_path: field.to_string(),
            },
            direction,
        };

        self.query.order_by.get_or_insert_with(Vec::new).push(order);
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: i32) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Full path of the queried collection.
    pub fn collection_path(&self) -> String {
        if self.parent.is_empty() {
            self.collection_id.clone()
        } else {
            format!("{}/{}", self.parent, self.collection_id)
        }
    }

    pub(crate) fn orders(&self) -> &[Order] {
        self.query.order_by.as_deref().unwrap_or_default()
    }

    /// The equality filters of the query, flattened.
    pub(crate) fn field_filters(&self) -> Vec<&FieldFilter> {
        fn collect<'a>(filter: &'a Filter, out: &mut Vec<&'a FieldFilter>) {
            match filter {
                Filter::FieldFilter(ff) => out.push(ff),
                Filter::CompositeFilter(cf) => cf.filters.iter().for_each(|f| collect(f, out)),
            }
        }

        let mut out = Vec::new();
        if let Some(filter) = &self.query.where_clause {
            collect(filter, &mut out);
        }
        out
    }
}

/// A `Query` attached to a Firestore client, ready for execution.
#[derive(Clone)]
pub struct ExecutableQuery {
    pub(crate) conn: Connection,
    pub(crate) query: Query,
}

impl ExecutableQuery {
    pub(crate) fn new(conn: Connection, query: Query) -> Self {
        Self { conn, query }
    }

    /// Executes the query once and returns the results as a `QuerySnapshot`.
    pub async fn get(&self) -> Result<QuerySnapshot, FirestoreError> {
        let url = format!("{}:runQuery", self.conn.url(&self.query.parent));

        let request = RunQueryRequest {
            structured_query: self.query.query.clone(),
        };

        let response = self
            .conn
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let message = parse_error_response(response, "Run query failed").await;
            return Err(FirestoreError::ApiError(message));
        }

        let responses: Vec<RunQueryResponse> = response.json().await?;

        let mut documents = Vec::new();
        let mut read_time = None;

        for res in responses {
            if let Some(rt) = res.read_time {
                read_time = Some(rt);
            }

            if let Some(doc) = res.document {
                documents.push(DocumentSnapshot::from_document(&self.conn, doc, read_time.clone()));
            }
        }

        Ok(QuerySnapshot {
            documents,
            read_time,
        })
    }

    /// Listens to the query results. Every item is the full, ordered result set.
    pub async fn listen(&self) -> Result<SnapshotStream<QuerySnapshot>, FirestoreError> {
        let request = ListenRequest {
            database: self.conn.database_name(),
            add_target: Target {
                target_type: TargetType::Query(QueryTarget {
                    parent: self.conn.name(&self.query.parent),
                    structured_query: self.query.query.clone(),
                }),
                target_id: 1,
            },
        };

        let stream = listen_request(&self.conn, &request).await?;
        Ok(query_snapshots(stream, self.conn.clone(), self.query.orders().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_query_wire_shape() {
        let query = Query::new("posts")
            .where_filter("userId", FieldOperator::Equal, "u1")
            .unwrap()
            .order_by("createdAt", Direction::Descending)
            .limit(10);

        assert_eq!(
            serde_json::to_value(&query.query).unwrap(),
            json!({
                "from": [{ "collectionId": "posts" }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "userId" },
                        "op": "EQUAL",
                        "value": { "stringValue": "u1" }
                    }
                },
                "orderBy": [{ "field": { "fieldPath": "createdAt" }, "direction": "DESCENDING" }],
                "limit": 10
            })
        );
    }

    #[test]
    fn test_filters_combine_with_and() {
        let query = Query::new("posts")
            .where_filter("userId", FieldOperator::Equal, "u1")
            .unwrap()
            .where_filter("caption", FieldOperator::Equal, "x")
            .unwrap()
            .where_filter("imageUrl", FieldOperator::Equal, "y")
            .unwrap();

        match &query.query.where_clause {
            Some(Filter::CompositeFilter(cf)) => assert_eq!(cf.filters.len(), 3),
            other => panic!("expected composite filter, got {:?}", other),
        }
        assert_eq!(query.field_filters().len(), 3);
    }

    #[test]
    fn test_at_path_splits_parent() {
        let query = Query::at_path("posts/abc/comments");
        assert_eq!(query.parent, "posts/abc");
        assert_eq!(query.collection_id, "comments");
        assert_eq!(query.collection_path(), "posts/abc/comments");

        let root = Query::at_path("posts");
        assert_eq!(root.parent, "");
        assert_eq!(root.collection_path(), "posts");
    }
}
