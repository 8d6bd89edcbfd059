use crate::firestore::{DocumentSnapshot, FirestoreError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const POSTS: &str = "posts";
pub const USERS: &str = "users";
pub const COMMENTS: &str = "comments";

/// Field names of the stored documents.
pub mod fields {
    pub const USER_ID: &str = "userId";
    pub const USERNAME: &str = "username";
    pub const AVATAR: &str = "avatar";
    pub const CAPTION: &str = "caption";
    pub const IMAGE_URL: &str = "imageUrl";
    pub const CREATED_AT: &str = "createdAt";
    pub const LIKES: &str = "likes";
    pub const CONTENT: &str = "content";
}

pub fn post_path(post_id: &str) -> String {
    format!("{}/{}", POSTS, post_id)
}

pub fn comments_path(post_id: &str) -> String {
    format!("{}/{}/{}", POSTS, post_id, COMMENTS)
}

pub fn user_path(uid: &str) -> String {
    format!("{}/{}", USERS, uid)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub author_avatar_url: String,
    pub caption: String,
    pub image_url: String,
    /// `None` until the backend has assigned it.
    pub created_at: Option<DateTime<Utc>>,
    pub likes: BTreeSet<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PostRecord {
    user_id: String,
    username: String,
    avatar: String,
    caption: String,
    image_url: String,
    created_at: Option<String>,
    likes: Vec<String>,
}

impl Post {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Self, FirestoreError> {
        let record: PostRecord = snapshot.data()?.unwrap_or_default();
        Ok(Self {
            id: snapshot.id().to_string(),
            author_id: record.user_id,
            author_display_name: record.username,
            author_avatar_url: record.avatar,
            caption: record.caption,
            image_url: record.image_url,
            created_at: record.created_at.as_deref().and_then(parse_time),
            likes: record.likes.into_iter().collect(),
        })
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn is_liked_by(&self, uid: &str) -> bool {
        self.likes.contains(uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub username: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CommentRecord {
    content: String,
    username: String,
    created_at: Option<String>,
}

impl Comment {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Self, FirestoreError> {
        let record: CommentRecord = snapshot.data()?.unwrap_or_default();
        Ok(Self {
            id: snapshot.id().to_string(),
            content: record.content,
            username: record.username,
            created_at: record.created_at.as_deref().and_then(parse_time),
        })
    }
}

/// `users/{uid}`. Nothing in this crate writes it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub followers: BTreeSet<String>,
    pub following: BTreeSet<String>,
}

impl UserProfile {
    /// A missing document reads as an empty profile.
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Self, FirestoreError> {
        Ok(snapshot.data()?.unwrap_or_default())
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}
