use super::busy::BusyFlag;
use super::display::{avatar_url, display_name};
use super::models::{fields, POSTS};
use crate::auth::Session;
use crate::firestore::{DocumentStore, FieldUpdate, FirestoreError};
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

#[cfg(feature = "storage")]
pub use self::upload::UploadToStorage;

pub const MISSING_FIELDS_MESSAGE: &str = "Please enter an image link and a caption.";

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Image download failed with status {0}")]
    DownloadFailed(reqwest::StatusCode),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage")]
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

#[derive(Error, Debug)]
pub enum CreatePostError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
    #[error("Store error: {0}")]
    Store(#[from] FirestoreError),
}

impl CreatePostError {
    /// Text fit for an alert; backend details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            CreatePostError::Validation(msg) => msg.to_string(),
            CreatePostError::Image(_) => "The image could not be uploaded. Please try another one.".into(),
            CreatePostError::Store(_) => "Your post could not be published. Please try again.".into(),
        }
    }
}

/// Turns what the user entered as the image into the URL stored on the post.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn resolve(&self, image_ref: &str) -> Result<String, ImageError>;
}

/// Stores the entered link as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectUrl;

#[async_trait]
impl ImageSource for DirectUrl {
    async fn resolve(&self, image_ref: &str) -> Result<String, ImageError> {
        Ok(image_ref.to_string())
    }
}

/// The new-post form.
#[derive(Debug, Default)]
pub struct CreatePostForm {
    caption: String,
    image_ref: String,
    avatar_placeholder: String,
    submitting: BusyFlag,
}

impl CreatePostForm {
    /// `avatar_placeholder` is the base URL the uid is appended to when the
    /// session has no photo.
    pub fn new(avatar_placeholder: impl Into<String>) -> Self {
        Self {
            avatar_placeholder: avatar_placeholder.into(),
            ..Default::default()
        }
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.caption = caption.into();
    }

    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    pub fn set_image_ref(&mut self, image_ref: impl Into<String>) {
        self.image_ref = image_ref.into();
    }

    /// What to show in the preview box.
    pub fn preview(&self) -> Option<&str> {
        Some(self.image_ref.as_str()).filter(|r| !r.trim().is_empty())
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_set()
    }

    /// A handle on the submitting flag that stays readable during `submit`.
    pub fn submitting_flag(&self) -> BusyFlag {
        self.submitting.clone()
    }

    /// Publishes the post and returns its id. The form is cleared on success
    /// and left untouched on failure.
    pub async fn submit(
        &mut self,
        store: &dyn DocumentStore,
        session: &Session,
        source: &dyn ImageSource,
    ) -> Result<String, CreatePostError> {
        if self.image_ref.trim().is_empty() || self.caption.trim().is_empty() {
            return Err(CreatePostError::Validation(MISSING_FIELDS_MESSAGE));
        }

        let result = {
            let _guard = self.submitting.try_enter();
            self.publish(store, session, source).await
        };

        match result {
            Ok(id) => {
                info!(post_id = %id, uid = %session.uid, "post created");
                self.caption.clear();
                self.image_ref.clear();
                Ok(id)
            }
            Err(e) => {
                error!(uid = %session.uid, error = %e, "failed to create post");
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        store: &dyn DocumentStore,
        session: &Session,
        source: &dyn ImageSource,
    ) -> Result<String, CreatePostError> {
        let image_url = source.resolve(&self.image_ref).await?;

        let id = store
            .add_document(
                POSTS,
                vec![
                    FieldUpdate::set(fields::USER_ID, session.uid.as_str()),
                    FieldUpdate::set(fields::USERNAME, display_name(session)),
                    FieldUpdate::set(fields::AVATAR, avatar_url(session, &self.avatar_placeholder)),
                    FieldUpdate::set(fields::CAPTION, self.caption.as_str()),
                    FieldUpdate::set(fields::IMAGE_URL, image_url),
                    FieldUpdate::set(fields::LIKES, json!([])),
                    FieldUpdate::ServerTimestamp(fields::CREATED_AT.to_string()),
                ],
            )
            .await?;

        Ok(id)
    }
}

#[cfg(feature = "storage")]
mod upload {
    use super::{ImageError, ImageSource};
    use crate::storage::FirebaseStorage;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;
    use tracing::debug;

    /// Copies the image into a temporary file, uploads it to
    /// `posts/{millis}.jpg` and stores the download URL.
    ///
    /// `http(s)` references are downloaded; anything else is read as a local
    /// path (an optional `file://` prefix is stripped). The temporary file is
    /// removed once the attempt is over, successful or not.
    pub struct UploadToStorage {
        storage: FirebaseStorage,
        bucket: Option<String>,
        http: reqwest::Client,
        temp_dir: Option<PathBuf>,
    }

    impl UploadToStorage {
        pub fn new(storage: FirebaseStorage) -> Self {
            Self {
                storage,
                bucket: None,
                http: reqwest::Client::new(),
                temp_dir: None,
            }
        }

        pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
            self.bucket = Some(bucket.into());
            self
        }

        /// Where temporary copies are created instead of the system default.
        pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
            self.temp_dir = Some(dir.into());
            self
        }

        fn temp_file(&self) -> std::io::Result<NamedTempFile> {
            match &self.temp_dir {
                Some(dir) => NamedTempFile::new_in(dir),
                None => NamedTempFile::new(),
            }
        }

        async fn fetch_into(&self, image_ref: &str, target: &Path) -> Result<(), ImageError> {
            if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
                let response = self.http.get(image_ref).send().await?;
                if response.status() != reqwest::StatusCode::OK {
                    return Err(ImageError::DownloadFailed(response.status()));
                }
                let bytes = response.bytes().await?;
                tokio::fs::write(target, &bytes).await?;
            } else {
                let source = image_ref.strip_prefix("file://").unwrap_or(image_ref);
                tokio::fs::copy(source, target).await?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ImageSource for UploadToStorage {
        async fn resolve(&self, image_ref: &str) -> Result<String, ImageError> {
            let object_name = format!("posts/{}.jpg", Utc::now().timestamp_millis());
            let temp = self.temp_file()?;

            self.fetch_into(image_ref, temp.path()).await?;
            let data = tokio::fs::read(temp.path()).await?;

            let file = self.storage.bucket(self.bucket.as_deref()).file(&object_name);
            let metadata = file.save(data, "image/jpeg").await?;
            debug!(object = %object_name, "image uploaded");

            Ok(file.download_url(&metadata)?)
        }
    }
}
