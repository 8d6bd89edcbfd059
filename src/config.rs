//! Client configuration.
//!
//! Loads the Firebase project coordinates from environment variables or from any
//! `serde` source the host application already uses.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const IDENTITY_API: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_API: &str = "https://securetoken.googleapis.com/v1";
const FIRESTORE_API: &str =
    "https://firestore.googleapis.com/v1/projects/{project_id}/databases/(default)/documents";
const STORAGE_API: &str = "https://firebasestorage.googleapis.com/v0";

/// Everything needed to reach one Firebase project as an end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Web API key of the Firebase project
    pub api_key: String,
    /// Project id, used for the Firestore database path
    pub project_id: String,
    /// Storage bucket; `{project_id}.appspot.com` when absent
    #[serde(default)]
    pub storage_bucket: Option<String>,
    /// Where the signed-in session is persisted between runs
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    /// Prefix of the generated avatar URL, completed with the user id
    #[serde(default = "default_avatar_placeholder_url")]
    pub avatar_placeholder_url: String,
    /// Retries for transient HTTP failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Base URLs of the backend services. Overridden for emulators and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub identity: String,
    pub secure_token: String,
    /// Firestore documents root; `{project_id}` is substituted
    pub firestore: String,
    pub storage: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity: IDENTITY_API.to_string(),
            secure_token: SECURE_TOKEN_API.to_string(),
            firestore: FIRESTORE_API.to_string(),
            storage: STORAGE_API.to_string(),
        }
    }
}

fn default_avatar_placeholder_url() -> String {
    "https://i.pravatar.cc/150?u=".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            storage_bucket: None,
            session_file: None,
            avatar_placeholder_url: default_avatar_placeholder_url(),
            max_retries: default_max_retries(),
            endpoints: Endpoints::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("PHOTOFEED_API_KEY").context("PHOTOFEED_API_KEY is required")?;
        let project_id =
            std::env::var("PHOTOFEED_PROJECT_ID").context("PHOTOFEED_PROJECT_ID is required")?;

        let mut config = Self::new(api_key, project_id);
        config.storage_bucket = std::env::var("PHOTOFEED_STORAGE_BUCKET").ok();
        config.session_file = std::env::var("PHOTOFEED_SESSION_FILE").ok().map(PathBuf::from);

        if let Ok(url) = std::env::var("PHOTOFEED_AVATAR_PLACEHOLDER_URL") {
            config.avatar_placeholder_url = url;
        }
        if let Ok(retries) = std::env::var("PHOTOFEED_MAX_RETRIES") {
            config.max_retries = retries
                .parse()
                .context("PHOTOFEED_MAX_RETRIES must be a non-negative integer")?;
        }

        if let Ok(url) = std::env::var("PHOTOFEED_IDENTITY_URL") {
            config.endpoints.identity = url;
        }
        if let Ok(url) = std::env::var("PHOTOFEED_SECURE_TOKEN_URL") {
            config.endpoints.secure_token = url;
        }
        if let Ok(url) = std::env::var("PHOTOFEED_FIRESTORE_URL") {
            config.endpoints.firestore = url;
        }
        if let Ok(url) = std::env::var("PHOTOFEED_STORAGE_URL") {
            config.endpoints.storage = url;
        }

        Ok(config)
    }

    pub fn firestore_url(&self) -> String {
        self.endpoints.firestore.replace("{project_id}", &self.project_id)
    }

    pub fn bucket_name(&self) -> String {
        self.storage_bucket
            .clone()
            .unwrap_or_else(|| format!("{}.appspot.com", self.project_id))
    }
}
