//! Client core of a small photo-sharing app backed by Firebase.
//!
//! [`PhotoFeedApp`] wires the Firebase services to one project and hands out
//! the pieces the views in [`social`] are mounted with.

pub mod auth;
pub mod config;
pub mod core;
pub mod firestore;
pub mod social;
#[cfg(feature = "storage")]
pub mod storage;

use auth::{AuthState, FirebaseIdentity, IdentityError, IdentityService, SessionHandle};
use config::ClientConfig;
use crate::core::middleware::IdTokenMiddleware;
use firestore::{DocumentStore, FirebaseFirestore};
use social::SessionGate;
use std::sync::Arc;
#[cfg(feature = "storage")]
use storage::FirebaseStorage;

pub struct PhotoFeedApp {
    config: ClientConfig,
    identity: Arc<FirebaseIdentity>,
}

impl PhotoFeedApp {
    pub fn new(config: ClientConfig) -> Self {
        let identity = Arc::new(FirebaseIdentity::new(&config));
        Self { config, identity }
    }

    /// Builds the app from `PHOTOFEED_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    /// Restores the persisted session and publishes the first session event.
    pub async fn start(&self) -> Result<AuthState, IdentityError> {
        self.identity.restore().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn identity(&self) -> Arc<FirebaseIdentity> {
        self.identity.clone()
    }

    pub fn session(&self) -> SessionHandle {
        self.identity.session()
    }

    pub fn firestore(&self) -> FirebaseFirestore {
        FirebaseFirestore::new(&self.config, self.middleware())
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        Arc::new(self.firestore())
    }

    #[cfg(feature = "storage")]
    pub fn storage(&self) -> FirebaseStorage {
        FirebaseStorage::new(&self.config, self.middleware())
    }

    pub fn session_gate(&self) -> SessionGate {
        SessionGate::mount(self.session())
    }

    fn middleware(&self) -> IdTokenMiddleware {
        IdTokenMiddleware::new(self.identity.as_ref().clone())
    }
}
