use crate::storage::file::File;
use reqwest_middleware::ClientWithMiddleware;

/// A reference to a Cloud Storage bucket.
pub struct Bucket {
    client: ClientWithMiddleware,
    base_url: String,
    name: String,
}

impl Bucket {
    pub(crate) fn new(client: ClientWithMiddleware, base_url: String, name: String) -> Self {
        Self {
            client,
            base_url,
            name,
        }
    }

    /// Returns the name of the bucket.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a `File` instance that refers to the object at the specified path.
    ///
    /// # Arguments
    ///
    /// * `name` - The path to the object within the bucket (e.g., "posts/1700000000000.jpg").
    pub fn file(&self, name: &str) -> File {
        File::new(
            self.client.clone(),
            self.base_url.clone(),
            self.name.clone(),
            name.to_string(),
        )
    }
}
