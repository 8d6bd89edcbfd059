use super::busy::BusyFlag;
use super::comments::{CommentSubmit, CommentThread};
use super::models::{fields, post_path, Post};
use super::subscription::Subscription;
use crate::auth::Session;
use crate::firestore::{DocumentSnapshot, DocumentStore, FieldUpdate, FirestoreError};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: usize,
}

impl LikeState {
    pub fn of(likes: &BTreeSet<String>, uid: &str) -> Self {
        Self {
            liked: likes.contains(uid),
            like_count: likes.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToggle {
    Added,
    Removed,
    /// An earlier toggle is still waiting for its acknowledgment; nothing was sent.
    InFlight,
}

/// One post in a list, with its like button and comment thread.
///
/// The like state and the comments are two independent live subscriptions;
/// dropping the card closes both.
pub struct PostCard {
    store: Arc<dyn DocumentStore>,
    session: Session,
    seed: Post,
    post: Subscription<Post>,
    thread: CommentThread,
    show_comments: bool,
    like_in_flight: BusyFlag,
}

impl PostCard {
    pub fn mount(store: Arc<dyn DocumentStore>, session: Session, post: Post) -> Self {
        let subscription = {
            let store = store.clone();
            let path = post_path(&post.id);
            Subscription::open(
                "post",
                async move { store.listen_document(&path).await },
                |snapshot: DocumentSnapshot| Post::from_snapshot(&snapshot),
            )
        };
        let thread = CommentThread::mount(store.clone(), session.clone(), &post.id);

        Self {
            store,
            session,
            seed: post,
            post: subscription,
            thread,
            show_comments: false,
            like_in_flight: BusyFlag::new(),
        }
    }

    /// The latest version of the post, or the one the card was mounted with.
    pub fn post(&self) -> Post {
        self.post.current().unwrap_or_else(|| self.seed.clone())
    }

    pub fn like_state(&self) -> LikeState {
        let post = self.post();
        LikeState::of(&post.likes, &self.session.uid)
    }

    pub fn post_subscription(&mut self) -> &mut Subscription<Post> {
        &mut self.post
    }

    pub fn is_like_in_flight(&self) -> bool {
        self.like_in_flight.is_set()
    }

    /// Adds or removes the current user from the post's likes.
    ///
    /// The like state is not changed locally; it follows the post
    /// subscription once the write is echoed back.
    pub async fn toggle_like(&self) -> Result<LikeToggle, FirestoreError> {
        let Some(_guard) = self.like_in_flight.try_enter() else {
            return Ok(LikeToggle::InFlight);
        };

        let uid = serde_json::Value::from(self.session.uid.as_str());
        let (update, outcome) = if self.like_state().liked {
            (FieldUpdate::ArrayRemove(fields::LIKES.to_string(), vec![uid]), LikeToggle::Removed)
        } else {
            (FieldUpdate::ArrayUnion(fields::LIKES.to_string(), vec![uid]), LikeToggle::Added)
        };

        match self
            .store
            .update_document(&post_path(&self.seed.id), vec![update])
            .await
        {
            Ok(()) => Ok(outcome),
            Err(e) => {
                error!(post_id = %self.seed.id, error = %e, "failed to update like");
                Err(e)
            }
        }
    }

    pub fn comments_visible(&self) -> bool {
        self.show_comments
    }

    /// Shows or hides the comment thread; returns the new visibility.
    pub fn toggle_comments(&mut self) -> bool {
        self.show_comments = !self.show_comments;
        self.show_comments
    }

    pub fn thread(&self) -> &CommentThread {
        &self.thread
    }

    pub fn thread_mut(&mut self) -> &mut CommentThread {
        &mut self.thread
    }

    pub fn set_comment_input(&mut self, text: impl Into<String>) {
        self.thread.set_input(text);
    }

    pub async fn submit_comment(&mut self) -> Result<CommentSubmit, FirestoreError> {
        self.thread.submit().await
    }
}
