use super::busy::BusyFlag;
use super::display::display_name;
use super::models::{comments_path, fields, Comment};
use super::subscription::{Subscription, SubscriptionState};
use crate::auth::Session;
use crate::firestore::query::Query;
use crate::firestore::{Direction, DocumentStore, FieldUpdate, FirestoreError, QuerySnapshot};
use std::sync::Arc;
use tracing::{debug, error};

/// Comments of a post, oldest first.
pub fn comments_query(post_id: &str) -> Query {
    Query::at_path(&comments_path(post_id)).order_by(fields::CREATED_AT, Direction::Ascending)
}

fn comments_from(snapshot: QuerySnapshot) -> Result<Vec<Comment>, FirestoreError> {
    snapshot.iter().map(Comment::from_snapshot).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentSubmit {
    /// Blank input; nothing was written.
    Ignored,
    Sent,
}

/// The live comment list of one post plus the input box under it.
///
/// Both the inline thread of a post card and the full-screen comment view are
/// built on this.
pub struct CommentThread {
    store: Arc<dyn DocumentStore>,
    session: Session,
    post_id: String,
    comments: Subscription<Vec<Comment>>,
    input: String,
    submitting: BusyFlag,
}

impl CommentThread {
    pub fn mount(store: Arc<dyn DocumentStore>, session: Session, post_id: &str) -> Self {
        let comments = {
            let store = store.clone();
            let query = comments_query(post_id);
            Subscription::open(
                "comments",
                async move { store.listen_query(&query).await },
                comments_from,
            )
        };

        Self {
            store,
            session,
            post_id: post_id.to_string(),
            comments,
            input: String::new(),
            submitting: BusyFlag::new(),
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn state(&self) -> SubscriptionState<Vec<Comment>> {
        self.comments.state()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.current().unwrap_or_default()
    }

    pub fn subscription(&mut self) -> &mut Subscription<Vec<Comment>> {
        &mut self.comments
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_set()
    }

    /// A handle on the submitting flag that stays readable during `submit`.
    pub fn submitting_flag(&self) -> BusyFlag {
        self.submitting.clone()
    }

    /// Posts the input as a comment signed with the session's display name.
    ///
    /// The input is cleared only once the write is acknowledged; a failed
    /// write leaves it in place for another attempt.
    pub async fn submit(&mut self) -> Result<CommentSubmit, FirestoreError> {
        if self.input.trim().is_empty() {
            return Ok(CommentSubmit::Ignored);
        }

        let guard = self.submitting.try_enter();
        let result = self
            .store
            .add_document(
                &comments_path(&self.post_id),
                vec![
                    FieldUpdate::set(fields::CONTENT, self.input.as_str()),
                    FieldUpdate::set(fields::USERNAME, display_name(&self.session)),
                    FieldUpdate::ServerTimestamp(fields::CREATED_AT.to_string()),
                ],
            )
            .await;
        drop(guard);

        match result {
            Ok(id) => {
                debug!(post_id = %self.post_id, comment_id = %id, "comment added");
                self.input.clear();
                Ok(CommentSubmit::Sent)
            }
            Err(e) => {
                error!(post_id = %self.post_id, error = %e, "failed to send comment");
                Err(e)
            }
        }
    }
}

/// Full-screen comments of one post.
pub struct CommentView {
    thread: CommentThread,
    avatar_url: String,
}

impl CommentView {
    /// `avatar_url` is the picture shown next to the input box.
    pub fn mount(
        store: Arc<dyn DocumentStore>,
        session: Session,
        post_id: &str,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            thread: CommentThread::mount(store, session, post_id),
            avatar_url: avatar_url.into(),
        }
    }

    pub fn avatar_url(&self) -> &str {
        &self.avatar_url
    }

    pub fn thread(&self) -> &CommentThread {
        &self.thread
    }

    pub fn thread_mut(&mut self) -> &mut CommentThread {
        &mut self.thread
    }
}
