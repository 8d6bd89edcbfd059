//! View-models of the photo feed.
//!
//! Each screen is a plain struct holding its view state. Live data arrives
//! through [`Subscription`]s that the view owns, so dropping a view is what
//! unmounting it means: its streams are closed and nothing fires afterwards.
//! Views receive the session and the store explicitly; nothing here reaches
//! for a global.
//!
//! ```rust,ignore
//! # use photofeed::PhotoFeedApp;
//! # use photofeed::social::{FeedView, PostCard, SessionGate, Route};
//! # async fn run(app: PhotoFeedApp) -> anyhow::Result<()> {
//! app.start().await?;
//! let mut gate = app.session_gate();
//! while let Some(view) = gate.changed().await {
//!     let (Route::Tabs, Some(session)) = (view.route(), view.session().cloned()) else {
//!         continue;
//!     };
//!     let mut feed = FeedView::mount(app.document_store());
//!     feed.subscription().wait_for(|s| !s.is_pending()).await;
//!     for post in feed.posts() {
//!         let card = PostCard::mount(app.document_store(), session.clone(), post);
//!         // render card
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth_form;
pub mod busy;
pub mod comments;
pub mod create_post;
pub mod display;
pub mod feed;
pub mod models;
pub mod post_card;
pub mod profile;
pub mod session_gate;
pub mod subscription;
pub mod validation;

#[cfg(test)]
mod testing;

pub use auth_form::{AuthForm, AuthFormError, AuthMode, AuthOutcome};
pub use busy::BusyFlag;
pub use comments::{CommentSubmit, CommentThread, CommentView};
pub use create_post::{CreatePostError, CreatePostForm, DirectUrl, ImageError, ImageSource};
#[cfg(feature = "storage")]
pub use create_post::UploadToStorage;
pub use display::{avatar_url, display_name};
pub use feed::{fetch_posts, FeedView};
pub use models::{Comment, Post, UserProfile};
pub use post_card::{LikeState, LikeToggle, PostCard};
pub use profile::{FollowCounts, ProfileError, ProfileView};
pub use session_gate::{GateView, Route, SessionGate, Tab, TABS};
pub use subscription::{Subscription, SubscriptionState};
