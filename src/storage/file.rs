use crate::core::parse_error_response;
use crate::storage::StorageError;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

/// Represents an object within a Cloud Storage bucket.
pub struct File {
    client: ClientWithMiddleware,
    base_url: String,
    bucket_name: String,
    name: String,
}

/// Metadata the Firebase Storage API returns for an object.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: Option<String>,
    pub bucket: Option<String>,
    pub generation: Option<String>,
    pub metageneration: Option<String>,
    pub content_type: Option<String>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub size: Option<String>,
    pub md5_hash: Option<String>,
    /// Comma-separated tokens; any of them grants read access through the download URL.
    pub download_tokens: Option<String>,
}

impl File {
    pub(crate) fn new(
        client: ClientWithMiddleware,
        base_url: String,
        bucket_name: String,
        name: String,
    ) -> Self {
        Self {
            client,
            base_url,
            bucket_name,
            name,
        }
    }

    /// Returns the name of the object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the bucket containing the object.
    pub fn bucket(&self) -> &str {
        &self.bucket_name
    }

    fn object_url(&self) -> String {
        let encoded_name = url::form_urlencoded::byte_serialize(self.name.as_bytes()).collect::<String>();
        format!("{}/b/{}/o/{}", self.base_url, self.bucket_name, encoded_name)
    }

    /// Uploads data to the object in a single request.
    ///
    /// # Arguments
    ///
    /// * `body` - The data to upload.
    /// * `mime_type` - The MIME type of the data.
    pub async fn save(
        &self,
        body: impl Into<reqwest::Body>,
        mime_type: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        let url = format!("{}/b/{}/o", self.base_url, self.bucket_name);

        let response = self
            .client
            .post(&url)
            .query(&[("name", self.name.as_str())])
            .header(header::CONTENT_TYPE, mime_type)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let message = parse_error_response(response, "Upload failed").await;
            return Err(StorageError::ApiError(message));
        }

        Ok(response.json().await?)
    }

    /// The URL any client can fetch the object from, authorized by its download token.
    pub fn download_url(&self, metadata: &ObjectMetadata) -> Result<String, StorageError> {
        let token = metadata
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StorageError::MissingDownloadToken(self.name.clone()))?;

        Ok(format!("{}?alt=media&token={}", self.object_url(), token))
    }

    /// Deletes the object.
    pub async fn delete(&self) -> Result<(), StorageError> {
        let response = self.client.delete(self.object_url()).send().await?;

        if !response.status().is_success() {
            let message = parse_error_response(response, "Delete failed").await;
            return Err(StorageError::ApiError(message));
        }

        Ok(())
    }
}
