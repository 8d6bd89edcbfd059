//! In-memory stand-ins for the backend, used by the view-model tests.

use crate::auth::{AuthState, IdentityError, IdentityService, Session, SessionHandle, SessionStore};
use crate::firestore::models::{ArrayValue, Document, Value, ValueType};
use crate::firestore::query::Query;
use crate::firestore::reference::{convert_serde_value_to_firestore_value, convert_serializable_to_fields};
use crate::firestore::snapshot::compare_documents;
use crate::firestore::{
    DocumentSnapshot, DocumentStore, FieldUpdate, FirestoreError, QuerySnapshot, SnapshotStream,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, OwnedMutexGuard};

/// First value handed out by the fake server clock.
pub const SERVER_EPOCH_MILLIS: i64 = 1_700_000_000_000;

pub fn session(uid: &str, email: Option<&str>) -> Session {
    Session {
        uid: uid.to_string(),
        email: email.map(str::to_string),
        display_name: None,
        photo_url: None,
        id_token: format!("id-token-{}", uid),
        refresh_token: format!("refresh-token-{}", uid),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub fn signed_in(session: Session) -> SessionHandle {
    SessionHandle::fixed(AuthState::SignedIn(session))
}

pub fn timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .expect("timestamp in range")
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(std::time::Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

/// Resolves once `flag` is set.
pub async fn until_set(flag: &super::BusyFlag) {
    while !flag.is_set() {
        tokio::task::yield_now().await;
    }
}

struct Inner {
    docs: Mutex<BTreeMap<String, Document>>,
    version: watch::Sender<u64>,
    clock: AtomicI64,
    write_calls: AtomicUsize,
    next_id: AtomicUsize,
    active_listeners: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_listens: AtomicBool,
    break_listeners: AtomicBool,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Counts one open listen stream for as long as it lives.
struct ListenerGuard(Arc<Inner>);

impl ListenerGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.active_listeners.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.active_listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A document store held in memory.
///
/// Listen streams deliver the current result at once and a fresh full result
/// after every successful write. Server timestamps come from a clock that
/// advances one millisecond per use.
#[derive(Clone)]
pub struct FakeStore {
    inner: Arc<Inner>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        let (version, _) = watch::channel(0);
        Arc::new(Self {
            inner: Arc::new(Inner {
                docs: Mutex::new(BTreeMap::new()),
                version,
                clock: AtomicI64::new(SERVER_EPOCH_MILLIS),
                write_calls: AtomicUsize::new(0),
                next_id: AtomicUsize::new(1),
                active_listeners: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
                fail_listens: AtomicBool::new(false),
                break_listeners: AtomicBool::new(false),
                write_lock: Arc::new(tokio::sync::Mutex::new(())),
            }),
        })
    }

    /// Stores a document directly, bypassing the write counter.
    pub fn insert(&self, path: &str, data: serde_json::Value) {
        let fields = convert_serializable_to_fields(&data).expect("object data");
        self.put(path, fields);
    }

    /// Stores a post with a real timestamp in `createdAt`.
    pub fn insert_post(&self, id: &str, author: &str, caption: &str, created_at: i64, likes: &[&str]) {
        let mut fields = convert_serializable_to_fields(&serde_json::json!({
            "userId": author,
            "username": format!("name_{}", author),
            "avatar": format!("https://i.pravatar.cc/150?u={}", author),
            "caption": caption,
            "imageUrl": format!("https://img.example.com/{}.jpg", id),
            "likes": likes,
        }))
        .expect("object data");
        fields.insert("createdAt".to_string(), timestamp_value(created_at));
        self.put(&format!("posts/{}", id), fields);
    }

    /// Stores a comment with a real timestamp in `createdAt`.
    pub fn insert_comment(&self, post_id: &str, id: &str, content: &str, created_at: i64) {
        let mut fields = convert_serializable_to_fields(&serde_json::json!({
            "content": content,
            "username": "someone",
        }))
        .expect("object data");
        fields.insert("createdAt".to_string(), timestamp_value(created_at));
        self.put(&format!("posts/{}/comments/{}", post_id, id), fields);
    }

    fn put(&self, path: &str, fields: HashMap<String, Value>) {
        self.inner.docs.lock().unwrap().insert(
            path.to_string(),
            Document {
                name: path.to_string(),
                fields,
                create_time: String::new(),
                update_time: String::new(),
            },
        );
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// The document's fields as plain JSON.
    pub fn data(&self, path: &str) -> Option<serde_json::Value> {
        snapshot_at(&self.inner, path).data().expect("decodable document")
    }

    /// Paths of the documents directly under `collection_path`.
    pub fn paths_in(&self, collection_path: &str) -> Vec<String> {
        self.inner
            .docs
            .lock()
            .unwrap()
            .keys()
            .filter(|p| parent_of(p) == Some(collection_path))
            .cloned()
            .collect()
    }

    /// Calls to `add_document` and `update_document`, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.inner.write_calls.load(Ordering::SeqCst)
    }

    pub fn active_listeners(&self) -> usize {
        self.inner.active_listeners.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_listens(&self, fail: bool) {
        self.inner.fail_listens.store(fail, Ordering::SeqCst);
    }

    /// Makes every open listen stream fail with its next item.
    pub fn break_listeners(&self) {
        self.inner.break_listeners.store(true, Ordering::SeqCst);
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// Writes wait until the returned guard is dropped.
    pub async fn hold_writes(&self) -> OwnedMutexGuard<()> {
        self.inner.write_lock.clone().lock_owned().await
    }

    /// Resolves once no listen stream is open.
    pub async fn wait_until_detached(&self) {
        while self.active_listeners() > 0 {
            tokio::task::yield_now().await;
        }
    }

    fn server_time(&self) -> Value {
        timestamp_value(self.inner.clock.fetch_add(1, Ordering::SeqCst))
    }

    async fn write(
        &self,
        path: &str,
        updates: Vec<FieldUpdate>,
        create: bool,
    ) -> Result<(), FirestoreError> {
        self.inner.write_calls.fetch_add(1, Ordering::SeqCst);
        let _hold = self.inner.write_lock.lock().await;

        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(FirestoreError::ApiError("PERMISSION_DENIED".to_string()));
        }

        {
            let mut docs = self.inner.docs.lock().unwrap();
            match (create, docs.contains_key(path)) {
                (true, true) => return Err(FirestoreError::ApiError("ALREADY_EXISTS".to_string())),
                (false, false) => return Err(FirestoreError::ApiError("NOT_FOUND".to_string())),
                _ => {}
            }

            let doc = docs.entry(path.to_string()).or_insert_with(|| Document {
                name: path.to_string(),
                fields: HashMap::new(),
                create_time: String::new(),
                update_time: String::new(),
            });

            for update in updates {
                match update {
                    FieldUpdate::Set(field, value) => {
                        doc.fields.insert(field, convert_serde_value_to_firestore_value(value)?);
                    }
                    FieldUpdate::ArrayUnion(field, values) => {
                        let mut array = array_field(doc, &field);
                        for value in values {
                            let value = convert_serde_value_to_firestore_value(value)?;
                            if !array.contains(&value) {
                                array.push(value);
                            }
                        }
                        set_array(doc, field, array);
                    }
                    FieldUpdate::ArrayRemove(field, values) => {
                        let removed = values
                            .into_iter()
                            .map(convert_serde_value_to_firestore_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        let mut array = array_field(doc, &field);
                        array.retain(|v| !removed.contains(v));
                        set_array(doc, field, array);
                    }
                    FieldUpdate::ServerTimestamp(field) => {
                        doc.fields.insert(field, self.server_time());
                    }
                }
            }
        }

        self.inner.version.send_modify(|v| *v += 1);
        Ok(())
    }
}

fn timestamp_value(millis: i64) -> Value {
    Value {
        value_type: ValueType::TimestampValue(timestamp(millis)),
    }
}

fn array_field(doc: &Document, field: &str) -> Vec<Value> {
    match doc.fields.get(field).map(|v| &v.value_type) {
        Some(ValueType::ArrayValue(array)) => array.values.clone(),
        _ => Vec::new(),
    }
}

fn set_array(doc: &mut Document, field: String, values: Vec<Value>) {
    doc.fields.insert(
        field,
        Value {
            value_type: ValueType::ArrayValue(ArrayValue { values }),
        },
    );
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn snapshot_of(doc: &Document) -> DocumentSnapshot {
    DocumentSnapshot {
        id: doc.name.rsplit('/').next().unwrap_or_default().to_string(),
        path: doc.name.clone(),
        document: Some(doc.clone()),
        read_time: None,
    }
}

fn snapshot_at(inner: &Inner, path: &str) -> DocumentSnapshot {
    match inner.docs.lock().unwrap().get(path) {
        Some(doc) => snapshot_of(doc),
        None => DocumentSnapshot::missing(path.to_string(), None),
    }
}

fn query_at(inner: &Inner, query: &Query) -> QuerySnapshot {
    let collection = query.collection_path();
    let filters = query.field_filters();
    let docs = inner.docs.lock().unwrap();

    let mut matched: Vec<&Document> = docs
        .values()
        .filter(|d| parent_of(&d.name) == Some(collection.as_str()))
        .filter(|d| {
            filters
                .iter()
                .all(|f| d.fields.get(&f.field.field_path) == Some(&f.value))
        })
        .collect();
    matched.sort_by(|a, b| compare_documents(a, b, query.orders()));
    if let Some(limit) = query.query.limit {
        matched.truncate(limit.max(0) as usize);
    }

    QuerySnapshot {
        documents: matched.into_iter().map(snapshot_of).collect(),
        read_time: None,
    }
}

/// Emits `read` now and again after every change, until dropped or broken.
fn live<T, F>(inner: Arc<Inner>, read: F) -> SnapshotStream<T>
where
    T: Send + 'static,
    F: Fn(&Inner) -> T + Send + 'static,
{
    let rx = inner.version.subscribe();
    let guard = ListenerGuard::new(inner);
    stream::unfold(Some((guard, rx, read, true)), |state| async move {
        let (guard, mut rx, read, first) = state?;
        if !first {
            rx.changed().await.ok()?;
        }
        if guard.0.break_listeners.load(Ordering::SeqCst) {
            return Some((Err(FirestoreError::ApiError("UNAVAILABLE".to_string())), None));
        }
        let item = read(guard.0.as_ref());
        Some((Ok(item), Some((guard, rx, read, false))))
    })
    .boxed()
}

#[async_trait::async_trait]
impl DocumentStore for FakeStore {
    async fn get_document(&self, path: &str) -> Result<DocumentSnapshot, FirestoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(FirestoreError::ApiError("UNAVAILABLE".to_string()));
        }
        Ok(snapshot_at(&self.inner, path))
    }

    async fn run_query(&self, query: &Query) -> Result<QuerySnapshot, FirestoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(FirestoreError::ApiError("UNAVAILABLE".to_string()));
        }
        Ok(query_at(&self.inner, query))
    }

    async fn listen_document(
        &self,
        path: &str,
    ) -> Result<SnapshotStream<DocumentSnapshot>, FirestoreError> {
        if self.inner.fail_listens.load(Ordering::SeqCst) {
            return Err(FirestoreError::ApiError("PERMISSION_DENIED".to_string()));
        }
        let path = path.to_string();
        Ok(live(self.inner.clone(), move |inner| snapshot_at(inner, &path)))
    }

    async fn listen_query(
        &self,
        query: &Query,
    ) -> Result<SnapshotStream<QuerySnapshot>, FirestoreError> {
        if self.inner.fail_listens.load(Ordering::SeqCst) {
            return Err(FirestoreError::ApiError("PERMISSION_DENIED".to_string()));
        }
        let query = query.clone();
        Ok(live(self.inner.clone(), move |inner| query_at(inner, &query)))
    }

    async fn add_document(
        &self,
        collection_path: &str,
        fields: Vec<FieldUpdate>,
    ) -> Result<String, FirestoreError> {
        let id = format!("auto{:04}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.write(&format!("{}/{}", collection_path, id), fields, true).await?;
        Ok(id)
    }

    async fn update_document(
        &self,
        path: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<(), FirestoreError> {
        self.write(path, updates, false).await
    }
}

/// Identity service with accounts kept in memory.
pub struct FakeIdentity {
    store: SessionStore,
    accounts: Mutex<HashMap<String, (String, String)>>,
    logout_calls: AtomicUsize,
    sign_in_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: SessionStore::new(),
            accounts: Mutex::new(HashMap::new()),
            logout_calls: AtomicUsize::new(0),
            sign_in_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Blocks register and login until the guard is dropped.
    pub async fn hold_sign_in(&self) -> OwnedMutexGuard<()> {
        self.sign_in_lock.clone().lock_owned().await
    }

    /// Delivers the first session event as "nobody signed in".
    pub fn start_signed_out(&self) {
        self.store.set(AuthState::SignedOut);
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn sign_in(&self, uid: &str, email: &str) -> Session {
        let session = session(uid, Some(email));
        self.store.set(AuthState::SignedIn(session.clone()));
        session
    }
}

#[async_trait::async_trait]
impl IdentityService for FakeIdentity {
    async fn register(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let _hold = self.sign_in_lock.lock().await;
        let uid = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(IdentityError::EmailInUse);
            }
            let uid = format!("uid{:03}", accounts.len() + 1);
            accounts.insert(email.to_string(), (password.to_string(), uid.clone()));
            uid
        };
        Ok(self.sign_in(&uid, email))
    }

    async fn login(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let _hold = self.sign_in_lock.lock().await;
        let uid = match self.accounts.lock().unwrap().get(email) {
            Some((stored, uid)) if stored == password => uid.clone(),
            _ => return Err(IdentityError::InvalidCredentials),
        };
        Ok(self.sign_in(&uid, email))
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.store.set(AuthState::SignedOut);
        Ok(())
    }

    fn session(&self) -> SessionHandle {
        self.store.handle()
    }
}
