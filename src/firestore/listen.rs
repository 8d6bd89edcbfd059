use crate::core::parse_error_response;
use super::models::{Document, ListenRequest, ListenResponse, Order, TargetChangeType};
use super::snapshot::{compare_documents, DocumentSnapshot, QuerySnapshot};
use super::{Connection, FirestoreError, SnapshotStream};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Every listen request registers exactly one target.
const TARGET_ID: i32 = 1;

/// A stream of `ListenResponse` messages.
///
/// The response body is a JSON array whose elements arrive over time; elements are
/// decoded as soon as they are complete.
pub struct ListenStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: BytesMut,
}

impl ListenStream {
    pub fn new(inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }
}

impl Stream for ListenStream {
    type Item = Result<ListenResponse, FirestoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // 1. Try to take a complete JSON object off the buffer.
            let (skip, end) = find_object(&self.buffer);
            if skip > 0 {
                let _ = self.buffer.split_to(skip);
            }
            if let Some(end) = end {
                let bytes = self.buffer.split_to(end - skip);
                return match serde_json::from_slice::<ListenResponse>(&bytes) {
                    Ok(msg) => Poll::Ready(Some(Ok(msg))),
                    Err(e) => Poll::Ready(Some(Err(FirestoreError::SerializationError(e)))),
                };
            }

            // 2. If no complete object, poll the underlying stream for more bytes.
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(FirestoreError::RequestError(e))));
                }
                Poll::Ready(None) => {
                    if !self.buffer.is_empty() {
                        self.buffer.clear();
                        return Poll::Ready(Some(Err(FirestoreError::ApiError(
                            "Stream ended with incomplete JSON".into(),
                        ))));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Finds the next top-level JSON object in `buf`.
///
/// Returns how many leading bytes are framing (whitespace and the enclosing
/// array's `[`, `,` and `]`) and, when the object is complete, the offset just
/// past its closing brace.
fn find_object(buf: &[u8]) -> (usize, Option<usize>) {
    let start = buf
        .iter()
        .position(|b| !(b.is_ascii_whitespace() || matches!(b, b'[' | b']' | b',')))
        .unwrap_or(buf.len());

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in buf.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (start, Some(i + 1));
                }
            }
            _ => {}
        }
    }

    (start, None)
}

pub async fn listen_request(
    conn: &Connection,
    request: &ListenRequest,
) -> Result<ListenStream, FirestoreError> {
    let url = format!("{}:listen", conn.base_url);

    let response = conn.client.post(&url).json(request).send().await?;

    if !response.status().is_success() {
        let message = parse_error_response(response, "Listen failed").await;
        return Err(FirestoreError::ApiError(message));
    }

    // Use unfold to create a stream from response.chunk()
    let stream = stream::unfold(response, |mut resp| async move {
        match resp.chunk().await {
            Ok(Some(bytes)) => Some((Ok(bytes), resp)),
            Ok(None) => None,
            Err(e) => Some((Err(e), resp)),
        }
    });

    Ok(ListenStream::new(Box::pin(stream)))
}

/// Folds target and document changes into the current result set of one target.
///
/// A snapshot is due at every consistent point (a global `NO_CHANGE` once the
/// target is `CURRENT`) if anything changed since the previous one. The first
/// consistent point always produces a snapshot, even an empty one.
#[derive(Debug, Default)]
pub(crate) struct SnapshotAssembler {
    docs: HashMap<String, Document>,
    current: bool,
    changed: bool,
    emitted: bool,
}

impl SnapshotAssembler {
    /// Applies one message; returns `Some(read_time)` when a snapshot is due.
    pub(crate) fn apply(
        &mut self,
        msg: ListenResponse,
    ) -> Result<Option<Option<String>>, FirestoreError> {
        if let Some(change) = msg.document_change {
            if change.target_ids.contains(&TARGET_ID) {
                self.docs.insert(change.document.name.clone(), change.document);
                self.changed = true;
            } else if change.removed_target_ids.contains(&TARGET_ID)
                && self.docs.remove(&change.document.name).is_some()
            {
                self.changed = true;
            }
        }

        for removal in [msg.document_delete, msg.document_remove].into_iter().flatten() {
            if self.docs.remove(&removal.document).is_some() {
                self.changed = true;
            }
        }

        if let Some(filter) = msg.filter {
            if filter.count as usize != self.docs.len() {
                warn!(
                    expected = filter.count,
                    held = self.docs.len(),
                    "listen existence filter mismatch"
                );
            }
        }

        let Some(change) = msg.target_change else {
            return Ok(None);
        };
        let ours = change.target_ids.is_empty() || change.target_ids.contains(&TARGET_ID);

        match change.target_change_type {
            TargetChangeType::Add => {}
            TargetChangeType::Current if ours => self.current = true,
            TargetChangeType::Reset if ours => {
                debug!("listen target reset");
                self.docs.clear();
                self.current = false;
                self.changed = true;
            }
            TargetChangeType::Remove if ours => {
                let cause = change
                    .cause
                    .map(|s| format!("{} (code: {})", s.message, s.code))
                    .unwrap_or_else(|| "target removed".to_string());
                return Err(FirestoreError::ApiError(format!("Listen target removed: {}", cause)));
            }
            TargetChangeType::NoChange
                if change.target_ids.is_empty() && self.current && (self.changed || !self.emitted) =>
            {
                self.changed = false;
                self.emitted = true;
                return Ok(Some(change.read_time));
            }
            _ => {}
        }

        Ok(None)
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub(crate) fn document(&self, name: &str) -> Option<&Document> {
        self.docs.get(name)
    }
}

fn snapshots<T, F>(stream: ListenStream, build: F) -> SnapshotStream<T>
where
    T: Send + 'static,
    F: FnMut(&SnapshotAssembler, Option<String>) -> T + Send + 'static,
{
    let state = Some((stream, SnapshotAssembler::default(), build));

    stream::unfold(state, |state| async move {
        let (mut stream, mut assembler, mut build) = state?;
        loop {
            match stream.next().await {
                Some(Ok(msg)) => match assembler.apply(msg) {
                    Ok(Some(read_time)) => {
                        let snapshot = build(&assembler, read_time);
                        return Some((Ok(snapshot), Some((stream, assembler, build))));
                    }
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(e), None)),
                None => return None,
            }
        }
    })
    .boxed()
}

pub(crate) fn query_snapshots(
    stream: ListenStream,
    conn: Connection,
    orders: Vec<Order>,
) -> SnapshotStream<QuerySnapshot> {
    snapshots(stream, move |assembler, read_time| {
        let mut docs: Vec<&Document> = assembler.documents().collect();
        docs.sort_by(|a, b| compare_documents(a, b, &orders));

        QuerySnapshot {
            documents: docs
                .into_iter()
                .map(|d| DocumentSnapshot::from_document(&conn, d.clone(), read_time.clone()))
                .collect(),
            read_time,
        }
    })
}

pub(crate) fn document_snapshots(
    stream: ListenStream,
    conn: Connection,
    path: String,
) -> SnapshotStream<DocumentSnapshot> {
    let name = conn.name(&path);
    snapshots(stream, move |assembler, read_time| match assembler.document(&name) {
        Some(doc) => DocumentSnapshot::from_document(&conn, doc.clone(), read_time),
        None => DocumentSnapshot::missing(path.clone(), read_time),
    })
}
