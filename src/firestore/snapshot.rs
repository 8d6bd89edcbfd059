use super::models::{Direction, Document, Order, Value, ValueType};
use super::reference::{convert_fields_to_serde_value, convert_value_to_serde_value};
use super::{Connection, FirestoreError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::cmp::Ordering;

/// A snapshot of a document in Firestore.
///
/// It contains data read from a document in your Firestore database.
/// The data can be extracted with `.data()`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) document: Option<Document>,
    pub(crate) read_time: Option<String>,
}

impl DocumentSnapshot {
    pub(crate) fn from_document(conn: &Connection, document: Document, read_time: Option<String>) -> Self {
        let path = conn.relative(&document.name).to_string();
        Self {
            id: last_segment(&path).to_string(),
            path,
            document: Some(document),
            read_time,
        }
    }

    pub(crate) fn missing(path: String, read_time: Option<String>) -> Self {
        Self {
            id: last_segment(&path).to_string(),
            path,
            document: None,
            read_time,
        }
    }

    /// The ID of the document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the document relative to the database root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if the document exists.
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    /// The time the document was created. Returns `None` if the document does not exist.
    pub fn create_time(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.create_time.as_str())
    }

    /// The time the document was last updated. Returns `None` if the document does not exist.
    pub fn update_time(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.update_time.as_str())
    }

    /// The time this snapshot was read.
    pub fn read_time(&self) -> Option<&str> {
        self.read_time.as_deref()
    }

    /// Retrieves all fields in the document as a specific type.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, FirestoreError> {
        if let Some(doc) = &self.document {
            let serde_value = convert_fields_to_serde_value(doc.fields.clone())?;
            let obj = serde_json::from_value(serde_value)?;
            Ok(Some(obj))
        } else {
            Ok(None)
        }
    }

    /// Retrieves a top-level field from the document.
    pub fn get_field<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, FirestoreError> {
        match self.document.as_ref().and_then(|doc| doc.fields.get(field)) {
            Some(value) => {
                let serde_value = convert_value_to_serde_value(value.clone())?;
                Ok(Some(serde_json::from_value(serde_value)?))
            }
            None => Ok(None),
        }
    }
}

/// A `QuerySnapshot` contains zero or more `DocumentSnapshot` objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    pub(crate) documents: Vec<DocumentSnapshot>,
    pub(crate) read_time: Option<String>,
}

impl QuerySnapshot {
    /// The documents in this snapshot.
    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    /// Returns `true` if there are no documents in the snapshot.
    pub fn empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The number of documents in the snapshot.
    pub fn size(&self) -> usize {
        self.documents.len()
    }

    /// The time this snapshot was read.
    pub fn read_time(&self) -> Option<&str> {
        self.read_time.as_deref()
    }

    /// Iterates over the document snapshots.
    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot> {
        self.documents.iter()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a DocumentSnapshot;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Orders documents the way the backend orders query results: by each order-by
/// field in turn, then by document name in the direction of the last order.
pub(crate) fn compare_documents(a: &Document, b: &Document, orders: &[Order]) -> Ordering {
    for order in orders {
        let ord = compare_values(
            a.fields.get(&order.field.field_path),
            b.fields.get(&order.field.field_path),
        );
        let ord = match order.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    let by_name = a.name.cmp(&b.name);
    match orders.last().map(|o| o.direction) {
        Some(Direction::Descending) => by_name.reverse(),
        _ => by_name,
    }
}

// Cross-type order: null < bool < number < timestamp < string < bytes < reference < geo < array < map
fn type_rank(value: &ValueType) -> u8 {
    match value {
        ValueType::NullValue(_) => 0,
        ValueType::BooleanValue(_) => 1,
        ValueType::IntegerValue(_) | ValueType::DoubleValue(_) => 2,
        ValueType::TimestampValue(_) => 3,
        ValueType::StringValue(_) => 4,
        ValueType::BytesValue(_) => 5,
        ValueType::ReferenceValue(_) => 6,
        ValueType::GeoPointValue(_) => 7,
        ValueType::ArrayValue(_) => 8,
        ValueType::MapValue(_) => 9,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (&a.value_type, &b.value_type),
    };

    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (ValueType::BooleanValue(x), ValueType::BooleanValue(y)) => x.cmp(y),
        (ValueType::TimestampValue(x), ValueType::TimestampValue(y)) => {
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (ValueType::StringValue(x), ValueType::StringValue(y))
        | (ValueType::BytesValue(x), ValueType::BytesValue(y))
        | (ValueType::ReferenceValue(x), ValueType::ReferenceValue(y)) => x.cmp(y),
        (ValueType::GeoPointValue(x), ValueType::GeoPointValue(y)) => x
            .latitude
            .total_cmp(&y.latitude)
            .then(x.longitude.total_cmp(&y.longitude)),
        (ValueType::ArrayValue(x), ValueType::ArrayValue(y)) => {
            for (l, r) in x.values.iter().zip(&y.values) {
                let ord = compare_values(Some(l), Some(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.values.len().cmp(&y.values.len())
        }
        (x, y) => match (as_number(x), as_number(y)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

fn as_number(value: &ValueType) -> Option<f64> {
    match value {
        ValueType::IntegerValue(s) => s.parse::<i64>().ok().map(|i| i as f64),
        ValueType::DoubleValue(d) => Some(*d),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}
