use crate::core::parse_error_response;
use super::commit::{commit, document_write, FieldUpdate, WriteMode};
use super::listen::{document_snapshots, listen_request};
use super::models::{
    ArrayValue, Document, DocumentsTarget, ListenRequest, MapValue, Target, TargetType, Value,
    ValueType,
};
use super::query::Query;
use super::snapshot::DocumentSnapshot;
use super::{Connection, FirestoreError, SnapshotStream};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::Error;
use serde::ser::Error as SerError;
use serde_json::map::Map;
use serde_json::Value as SerdeValue;
use std::collections::HashMap;

const AUTO_ID_LEN: usize = 20;

// Helper to convert Firestore's value map to a standard serde_json::Value
pub(crate) fn convert_fields_to_serde_value(
    fields: HashMap<String, Value>,
) -> Result<SerdeValue, FirestoreError> {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key, convert_value_to_serde_value(value)?);
    }
    Ok(SerdeValue::Object(map))
}

pub(crate) fn convert_value_to_serde_value(value: Value) -> Result<SerdeValue, FirestoreError> {
    use serde_json::json;
    Ok(match value.value_type {
        ValueType::StringValue(s) => SerdeValue::String(s),
        ValueType::IntegerValue(s) => {
            let i: i64 = s.parse().map_err(|e| {
                <serde_json::Error as Error>::custom(format!(
                    "Failed to parse integer string '{}': {}",
                    s, e
                ))
            })?;
            SerdeValue::Number(i.into())
        }
        ValueType::DoubleValue(d) => SerdeValue::Number(
            serde_json::Number::from_f64(d).ok_or_else(|| {
                <serde_json::Error as Error>::custom(format!("Invalid f64 value: {}", d))
            })?,
        ),
        ValueType::BooleanValue(b) => SerdeValue::Bool(b),
        ValueType::MapValue(map_value) => convert_fields_to_serde_value(map_value.fields)?,
        ValueType::ArrayValue(array_value) => {
            let values = array_value
                .values
                .into_iter()
                .map(convert_value_to_serde_value)
                .collect::<Result<Vec<_>, _>>()?;
            SerdeValue::Array(values)
        }
        ValueType::NullValue(_) => SerdeValue::Null,
        ValueType::TimestampValue(s) => SerdeValue::String(s),
        ValueType::GeoPointValue(gp) => {
            json!({ "latitude": gp.latitude, "longitude": gp.longitude })
        }
        ValueType::BytesValue(s) => SerdeValue::String(s),
        ValueType::ReferenceValue(s) => SerdeValue::String(s),
    })
}

/// Converts a serializable struct to Firestore's value map. Used to seed test
/// fixtures; writes go through field updates.
#[cfg(test)]
pub(crate) fn convert_serializable_to_fields<T: serde::Serialize>(
    value: &T,
) -> Result<HashMap<String, Value>, FirestoreError> {
    let serde_value = serde_json::to_value(value)?;
    if let SerdeValue::Object(map) = serde_value {
        let mut fields = HashMap::new();
        for (k, v) in map {
            fields.insert(k, convert_serde_value_to_firestore_value(v)?);
        }
        Ok(fields)
    } else {
        Err(FirestoreError::SerializationError(SerError::custom(
            "Can only set objects as documents",
        )))
    }
}

pub(crate) fn convert_serde_value_to_firestore_value(
    value: SerdeValue,
) -> Result<Value, FirestoreError> {
    let value_type = match value {
        SerdeValue::Null => ValueType::NullValue(()),
        SerdeValue::Bool(b) => ValueType::BooleanValue(b),
        SerdeValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                ValueType::IntegerValue(i.to_string())
            } else if let Some(f) = n.as_f64() {
                ValueType::DoubleValue(f)
            } else {
                return Err(FirestoreError::SerializationError(SerError::custom(format!(
                    "Unsupported number type: {}",
                    n
                ))));
            }
        }
        SerdeValue::String(s) => ValueType::StringValue(s),
        SerdeValue::Array(a) => {
            let values = a
                .into_iter()
                .map(convert_serde_value_to_firestore_value)
                .collect::<Result<Vec<_>, _>>()?;
            ValueType::ArrayValue(ArrayValue { values })
        }
        SerdeValue::Object(o) => {
            let mut fields = HashMap::new();
            for (k, v) in o {
                fields.insert(k, convert_serde_value_to_firestore_value(v)?);
            }
            ValueType::MapValue(MapValue { fields })
        }
    };
    Ok(Value { value_type })
}

/// A 20-character id, the same shape the Firestore SDKs generate client side.
pub(crate) fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LEN)
        .map(char::from)
        .collect()
}

/// A document at a slash-separated path relative to the database root.
#[derive(Clone)]
pub struct DocumentReference {
    pub(crate) conn: Connection,
    pub(crate) path: String,
}

impl DocumentReference {
    /// The last path segment.
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// A sub-collection of this document.
    pub fn collection(&self, collection_id: &str) -> CollectionReference {
        CollectionReference {
            conn: self.conn.clone(),
            path: format!("{}/{}", self.path, collection_id),
        }
    }

    /// Reads the document once.
    pub async fn get(&self) -> Result<DocumentSnapshot, FirestoreError> {
        let response = self.conn.client.get(self.conn.url(&self.path)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DocumentSnapshot::missing(self.path.clone(), None));
        }

        if !response.status().is_success() {
            let message = parse_error_response(response, "Get document failed").await;
            return Err(FirestoreError::ApiError(message));
        }

        let doc: Document = response.json().await?;
        Ok(DocumentSnapshot::from_document(&self.conn, doc, None))
    }

    /// Applies field updates to an existing document.
    ///
    /// Fails when the document does not exist.
    pub async fn update(&self, updates: Vec<FieldUpdate>) -> Result<(), FirestoreError> {
        let write = document_write(&self.conn, &self.path, updates, WriteMode::Update)?;
        commit(&self.conn, vec![write]).await?;
        Ok(())
    }

    /// Listens to this document. Every item is a full snapshot of it.
    pub async fn listen(&self) -> Result<SnapshotStream<DocumentSnapshot>, FirestoreError> {
        let request = ListenRequest {
            database: self.conn.database_name(),
            add_target: Target {
                target_type: TargetType::Documents(DocumentsTarget {
                    documents: vec![self.conn.name(&self.path)],
                }),
                target_id: 1,
            },
        };

        let stream = listen_request(&self.conn, &request).await?;
        Ok(document_snapshots(stream, self.conn.clone(), self.path.clone()))
    }
}

#[derive(Clone)]
pub struct CollectionReference {
    pub(crate) conn: Connection,
    pub(crate) path: String,
}

impl CollectionReference {
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn doc(&self, document_id: &str) -> DocumentReference {
        DocumentReference {
            conn: self.conn.clone(),
            path: format!("{}/{}", self.path, document_id),
        }
    }

    /// A query over this collection, to be refined with filters and ordering.
    pub fn query(&self) -> Query {
        Query::at_path(&self.path)
    }

    /// Creates a new document with a generated id.
    pub async fn add(&self, updates: Vec<FieldUpdate>) -> Result<DocumentReference, FirestoreError> {
        let doc_ref = self.doc(&auto_id());
        let write = document_write(&self.conn, &doc_ref.path, updates, WriteMode::Create)?;
        commit(&self.conn, vec![write]).await?;
        Ok(doc_ref)
    }
}
