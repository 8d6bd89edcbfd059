use super::models::{fields, Post, POSTS};
use super::subscription::{Subscription, SubscriptionState};
use crate::firestore::query::Query;
use crate::firestore::{Direction, DocumentStore, FirestoreError, QuerySnapshot};
use std::sync::Arc;

/// Every post, newest first.
pub fn feed_query() -> Query {
    Query::new(POSTS).order_by(fields::CREATED_AT, Direction::Descending)
}

pub(crate) fn posts_from(snapshot: QuerySnapshot) -> Result<Vec<Post>, FirestoreError> {
    snapshot.iter().map(Post::from_snapshot).collect()
}

/// Reads the feed once.
pub async fn fetch_posts(store: &dyn DocumentStore) -> Result<Vec<Post>, FirestoreError> {
    posts_from(store.run_query(&feed_query()).await?)
}

/// The home feed, kept live.
///
/// Each snapshot replaces the whole list; rendering every element as a
/// [`PostCard`](super::post_card::PostCard) is up to the host.
#[derive(Debug)]
pub struct FeedView {
    posts: Subscription<Vec<Post>>,
}

impl FeedView {
    pub fn mount(store: Arc<dyn DocumentStore>) -> Self {
        let posts = Subscription::open(
            "feed",
            async move { store.listen_query(&feed_query()).await },
            posts_from,
        );
        Self { posts }
    }

    pub fn state(&self) -> SubscriptionState<Vec<Post>> {
        self.posts.state()
    }

    /// The latest list, empty until the first snapshot.
    pub fn posts(&self) -> Vec<Post> {
        self.posts.current().unwrap_or_default()
    }

    pub fn subscription(&mut self) -> &mut Subscription<Vec<Post>> {
        &mut self.posts
    }
}
