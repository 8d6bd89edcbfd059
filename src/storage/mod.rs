//! Cloud Storage for Firebase module.
//!
//! Uploads go through the Firebase Storage REST API, the one the client SDKs
//! use, so the signed-in user's ID token is enough to authorize them.
//!
//! # Examples
//!
//! ```rust,ignore
//! # use photofeed::PhotoFeedApp;
//! # async fn run(app: PhotoFeedApp) -> anyhow::Result<()> {
//! let storage = app.storage();
//! let file = storage.bucket(None).file("posts/1700000000000.jpg");
//! let metadata = file.save(std::fs::read("photo.jpg")?, "image/jpeg").await?;
//! let url = file.download_url(&metadata)?;
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod file;

use crate::config::ClientConfig;
use crate::core::middleware::IdTokenMiddleware;
use bucket::Bucket;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use thiserror::Error;

/// Errors that can occur during Storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Storage API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// The object was stored but came back without a download token.
    #[error("Object {0} has no download token")]
    MissingDownloadToken(String),
}

/// Client for interacting with Cloud Storage for Firebase.
#[derive(Clone)]
pub struct FirebaseStorage {
    client: ClientWithMiddleware,
    pub base_url: String,
    default_bucket: String,
}

impl FirebaseStorage {
    /// Creates a new `FirebaseStorage` instance.
    ///
    /// This is typically called via `PhotoFeedApp::storage()`.
    pub fn new(config: &ClientConfig, middleware: IdTokenMiddleware) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(middleware)
            .build();

        Self::new_with_client(client, config.endpoints.storage.clone(), config.bucket_name())
    }

    pub fn new_with_client(
        client: ClientWithMiddleware,
        base_url: String,
        default_bucket: String,
    ) -> Self {
        Self {
            client,
            base_url,
            default_bucket,
        }
    }

    /// Gets a `Bucket` instance that refers to the specific bucket.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the bucket (e.g. "my-project.appspot.com").
    ///   If not provided, the configured bucket is used.
    pub fn bucket(&self, name: Option<&str>) -> Bucket {
        let bucket_name = name.unwrap_or(&self.default_bucket).to_string();
        Bucket::new(self.client.clone(), self.base_url.clone(), bucket_name)
    }
}

#[cfg(test)]
mod tests;
