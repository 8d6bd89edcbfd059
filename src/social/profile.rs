use super::display::{avatar_url, display_name};
use super::feed::posts_from;
use super::models::{fields, user_path, Post, UserProfile, POSTS};
use super::subscription::{Subscription, SubscriptionState};
use crate::auth::{IdentityError, IdentityService, Session, SessionHandle};
use crate::firestore::query::Query;
use crate::firestore::{Direction, DocumentStore, FieldOperator, FirestoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

pub const GRID_COLUMNS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("You are not signed in")]
    NotSignedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FollowCounts {
    pub followers: usize,
    pub following: usize,
}

/// The user's own posts, newest first.
pub fn user_posts_query(uid: &str) -> Result<Query, FirestoreError> {
    Ok(Query::new(POSTS)
        .where_filter(fields::USER_ID, FieldOperator::Equal, uid)?
        .order_by(fields::CREATED_AT, Direction::Descending))
}

/// Reads the follow counts; a failed or missing read counts as zero.
async fn read_counts(store: &dyn DocumentStore, uid: &str) -> FollowCounts {
    let profile = match store.get_document(&user_path(uid)).await {
        Ok(snapshot) => UserProfile::from_snapshot(&snapshot),
        Err(e) => Err(e),
    };

    match profile {
        Ok(profile) => FollowCounts {
            followers: profile.followers.len(),
            following: profile.following.len(),
        },
        Err(e) => {
            error!(uid = %uid, error = %e, "failed to read profile");
            FollowCounts::default()
        }
    }
}

/// The signed-in user's profile screen.
///
/// Posts are live; follow counts are read at mount and on
/// [`refresh_counts`](Self::refresh_counts) only.
pub struct ProfileView {
    store: Arc<dyn DocumentStore>,
    session: Session,
    avatar_placeholder: String,
    counts: FollowCounts,
    posts: Subscription<Vec<Post>>,
}

impl ProfileView {
    pub async fn mount(
        store: Arc<dyn DocumentStore>,
        session: &SessionHandle,
        avatar_placeholder: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        let Some(session) = session.current() else {
            warn!("profile opened without an active session");
            return Err(ProfileError::NotSignedIn);
        };

        let posts = {
            let store = store.clone();
            let uid = session.uid.clone();
            Subscription::open(
                "profile_posts",
                async move {
                    let query = user_posts_query(&uid)?;
                    store.listen_query(&query).await
                },
                posts_from,
            )
        };
        let counts = read_counts(store.as_ref(), &session.uid).await;

        Ok(Self {
            store,
            session,
            avatar_placeholder: avatar_placeholder.into(),
            counts,
            posts,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn display_name(&self) -> String {
        display_name(&self.session)
    }

    pub fn avatar_url(&self) -> String {
        avatar_url(&self.session, &self.avatar_placeholder)
    }

    pub fn counts(&self) -> FollowCounts {
        self.counts
    }

    /// Re-reads the follow counts.
    pub async fn refresh_counts(&mut self) -> FollowCounts {
        self.counts = read_counts(self.store.as_ref(), &self.session.uid).await;
        self.counts
    }

    pub fn state(&self) -> SubscriptionState<Vec<Post>> {
        self.posts.state()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.current().unwrap_or_default()
    }

    pub fn post_count(&self) -> usize {
        self.posts().len()
    }

    /// Posts laid out in rows of [`GRID_COLUMNS`]; the last row may be short.
    pub fn grid(&self) -> Vec<Vec<Post>> {
        self.posts()
            .chunks(GRID_COLUMNS)
            .map(|row| row.to_vec())
            .collect()
    }

    pub fn subscription(&mut self) -> &mut Subscription<Vec<Post>> {
        &mut self.posts
    }

    /// Signs out. The session gate takes it from there.
    pub async fn sign_out(&self, identity: &dyn IdentityService) -> Result<(), IdentityError> {
        match identity.logout().await {
            Ok(()) => {
                info!(uid = %self.session.uid, "signed out");
                Ok(())
            }
            Err(e) => {
                error!(uid = %self.session.uid, error = %e, "sign out failed");
                Err(e)
            }
        }
    }
}
