use crate::core::parse_error_response;
use super::models::{
    ArrayValue, CommitRequest, CommitResponse, Document, DocumentMask, FieldTransform,
    Precondition, ServerValue, TransformType, Write, WriteResult,
};
use super::reference::convert_serde_value_to_firestore_value;
use super::{Connection, FirestoreError};
use reqwest::header;
use serde_json::Value as SerdeValue;
use std::collections::HashMap;

/// One change to a top-level field of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Overwrites the field.
    Set(String, SerdeValue),
    /// Adds each value not already present (set-add).
    ArrayUnion(String, Vec<SerdeValue>),
    /// Removes every occurrence of each value (set-remove).
    ArrayRemove(String, Vec<SerdeValue>),
    /// Sets the field to the commit time assigned by the backend.
    ServerTimestamp(String),
}

impl FieldUpdate {
    pub fn set(field: &str, value: impl Into<SerdeValue>) -> Self {
        FieldUpdate::Set(field.to_string(), value.into())
    }

    pub fn field(&self) -> &str {
        match self {
            FieldUpdate::Set(f, _)
            | FieldUpdate::ArrayUnion(f, _)
            | FieldUpdate::ArrayRemove(f, _)
            | FieldUpdate::ServerTimestamp(f) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// The document must not exist yet.
    Create,
    /// The document must exist; only the named fields change.
    Update,
}

pub(crate) fn document_write(
    conn: &Connection,
    path: &str,
    updates: Vec<FieldUpdate>,
    mode: WriteMode,
) -> Result<Write, FirestoreError> {
    let mut fields = HashMap::new();
    let mut field_paths = Vec::new();
    let mut transforms = Vec::new();

    for update in updates {
        match update {
            FieldUpdate::Set(field, value) => {
                fields.insert(field.clone(), convert_serde_value_to_firestore_value(value)?);
                field_paths.push(field);
            }
            FieldUpdate::ArrayUnion(field, values) => transforms.push(FieldTransform {
                field_path: field,
                transform: TransformType::AppendMissingElements(array(values)?),
            }),
            FieldUpdate::ArrayRemove(field, values) => transforms.push(FieldTransform {
                field_path: field,
                transform: TransformType::RemoveAllFromArray(array(values)?),
            }),
            FieldUpdate::ServerTimestamp(field) => transforms.push(FieldTransform {
                field_path: field,
                transform: TransformType::SetToServerValue(ServerValue::RequestTime),
            }),
        }
    }

    let (update_mask, exists) = match mode {
        WriteMode::Create => (None, false),
        // An empty mask keeps a transform-only update from clearing the document.
        WriteMode::Update => (Some(DocumentMask { field_paths }), true),
    };

    Ok(Write {
        update: Document {
            name: conn.name(path),
            fields,
            create_time: String::new(), // Ignored on write
            update_time: String::new(), // Ignored on write
        },
        update_mask,
        update_transforms: transforms,
        current_document: Some(Precondition { exists }),
    })
}

fn array(values: Vec<SerdeValue>) -> Result<ArrayValue, FirestoreError> {
    Ok(ArrayValue {
        values: values
            .into_iter()
            .map(convert_serde_value_to_firestore_value)
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Commits the writes atomically.
pub(crate) async fn commit(
    conn: &Connection,
    writes: Vec<Write>,
) -> Result<Vec<WriteResult>, FirestoreError> {
    if writes.is_empty() {
        return Ok(Vec::new());
    }

    let url = format!("{}:commit", conn.base_url);
    let request = CommitRequest { writes };

    let response = conn
        .client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(&request)?)
        .send()
        .await?;

    if !response.status().is_success() {
        let message = parse_error_response(response, "Commit failed").await;
        return Err(FirestoreError::ApiError(message));
    }

    let result: CommitResponse = response.json().await?;
    Ok(result.write_results)
}
