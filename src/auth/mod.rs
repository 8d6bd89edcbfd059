//! End-user identity: register, sign in, sign out and the session stream.
//!
//! Talks to the Identity Toolkit (`accounts:signUp`, `accounts:signInWithPassword`)
//! and Secure Token APIs with the project's web API key. The resulting
//! [`Session`] is published through a [`SessionStore`]; consumers hold
//! [`SessionHandle`]s.

pub mod models;
pub mod session;

use crate::auth::models::{IdTokenClaims, PasswordRequest, RefreshTokenResponse, SignInResponse};
use crate::config::ClientConfig;
use crate::core::read_error_response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use session::{AuthState, Session, SessionHandle, SessionStore};


/// ID tokens this close to expiry are refreshed before use.
pub const REFRESH_LEEWAY_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email address already in use")]
    EmailInUse,
    #[error("Password rejected as too weak")]
    WeakPassword,
    #[error("Malformed email address")]
    InvalidEmail,
    #[error("Account disabled")]
    UserDisabled,
    #[error("Too many attempts")]
    TooManyAttempts,
    #[error("Session expired")]
    SessionExpired,
    #[error("No active session")]
    NotSignedIn,
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Session persistence failed: {0}")]
    PersistenceError(#[from] std::io::Error),
}

impl IdentityError {
    /// Maps an Identity Toolkit / Secure Token error code.
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "EMAIL_EXISTS" => IdentityError::EmailInUse,
            "INVALID_PASSWORD" | "EMAIL_NOT_FOUND" | "INVALID_LOGIN_CREDENTIALS" => {
                IdentityError::InvalidCredentials
            }
            "WEAK_PASSWORD" => IdentityError::WeakPassword,
            "INVALID_EMAIL" => IdentityError::InvalidEmail,
            "USER_DISABLED" => IdentityError::UserDisabled,
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => {
                IdentityError::SessionExpired
            }
            c if c.starts_with("TOO_MANY_ATTEMPTS_TRY_LATER") => IdentityError::TooManyAttempts,
            _ => IdentityError::ApiError(message),
        }
    }

    /// Whether the backend refused the request, as opposed to it failing to
    /// arrive or to be read.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            IdentityError::RequestError(_)
                | IdentityError::MiddlewareError(_)
                | IdentityError::SerializationError(_)
                | IdentityError::PersistenceError(_)
        )
    }

    /// Text fit for an alert. Transport and unexpected API failures collapse
    /// into one generic sentence; the details go to the log.
    pub fn user_message(&self) -> String {
        match self {
            IdentityError::InvalidCredentials => "The email or password is incorrect.".into(),
            IdentityError::EmailInUse => "An account already exists for this email.".into(),
            IdentityError::WeakPassword => "Please choose a stronger password.".into(),
            IdentityError::InvalidEmail => "Please enter a valid email address.".into(),
            IdentityError::UserDisabled => "This account has been disabled.".into(),
            IdentityError::TooManyAttempts => {
                "Too many attempts. Please wait a moment and try again.".into()
            }
            IdentityError::SessionExpired | IdentityError::NotSignedIn => {
                "Your session has ended. Please sign in again.".into()
            }
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

/// The identity capabilities the views depend on.
#[async_trait::async_trait]
pub trait IdentityService: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<Session, IdentityError>;
    async fn login(&self, email: &str, password: &str) -> Result<Session, IdentityError>;
    async fn logout(&self) -> Result<(), IdentityError>;
    fn session(&self) -> SessionHandle;
}

#[derive(Clone)]
pub struct FirebaseIdentity {
    client: ClientWithMiddleware,
    identity_url: String,
    secure_token_url: String,
    api_key: String,
    store: Arc<SessionStore>,
    session_file: Option<PathBuf>,
    /// Single-flight for token refreshes.
    refresh_lock: Arc<Mutex<()>>,
    /// Held while the session and its file change together.
    state_lock: Arc<Mutex<()>>,
}

impl FirebaseIdentity {
    pub fn new(config: &ClientConfig) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            identity_url: config.endpoints.identity.clone(),
            secure_token_url: config.endpoints.secure_token.clone(),
            api_key: config.api_key.clone(),
            store: Arc::new(SessionStore::new()),
            session_file: config.session_file.clone(),
            refresh_lock: Arc::new(Mutex::new(())),
            state_lock: Arc::new(Mutex::new(())),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        identity_url: String,
        secure_token_url: String,
        session_file: Option<PathBuf>,
    ) -> Self {
        Self {
            client,
            identity_url,
            secure_token_url,
            api_key: "test-key".to_string(),
            store: Arc::new(SessionStore::new()),
            session_file,
            refresh_lock: Arc::new(Mutex::new(())),
            state_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the persisted session, if any, and publishes the first session event.
    ///
    /// A saved session whose ID token is about to expire is refreshed first. If
    /// the backend rejects its refresh token the user starts signed out; if the
    /// backend cannot be reached the saved session is kept.
    pub async fn restore(&self) -> Result<AuthState, IdentityError> {
        let saved = match &self.session_file {
            Some(path) => match tokio::fs::read(path).await {
                Ok(raw) => match serde_json::from_slice::<Session>(&raw) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "discarding unreadable session file");
                        None
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let state = match saved {
            Some(session) if session.is_expiring(Utc::now(), Duration::seconds(REFRESH_LEEWAY_SECS)) => {
                match self.exchange_refresh_token(&session).await {
                    Ok(refreshed) => {
                        self.write_session_file(&refreshed).await?;
                        AuthState::SignedIn(refreshed)
                    }
                    Err(e) if e.is_rejection() => {
                        warn!(uid = %session.uid, error = %e, "saved session rejected, signing out");
                        self.remove_session_file().await?;
                        AuthState::SignedOut
                    }
                    Err(e) => {
                        warn!(uid = %session.uid, error = %e, "could not refresh saved session");
                        AuthState::SignedIn(session)
                    }
                }
            }
            Some(session) => AuthState::SignedIn(session),
            None => AuthState::SignedOut,
        };

        let _guard = self.state_lock.lock().await;
        info!(signed_in = state.session().is_some(), "session restored");
        self.store.set(state.clone());
        Ok(state)
    }

    /// Exchanges the refresh token for a fresh ID token.
    ///
    /// Concurrent callers are serialized; a caller that waited behind a successful
    /// refresh gets that session without another round trip. A rejected refresh
    /// signs the user out. If the user signed out or in while the request was
    /// in flight, its result is dropped and the current session stands.
    pub async fn refresh(&self) -> Result<Session, IdentityError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.store.state().session().cloned().ok_or(IdentityError::NotSignedIn)?;
        if !current.is_expiring(Utc::now(), Duration::seconds(REFRESH_LEEWAY_SECS)) {
            return Ok(current);
        }

        match self.exchange_refresh_token(&current).await {
            Ok(session) => {
                if self.replace_if_current(&current.refresh_token, Some(session.clone())).await? {
                    return Ok(session);
                }
                debug!(uid = %current.uid, "session changed during refresh, dropping new token");
                self.store.state().session().cloned().ok_or(IdentityError::NotSignedIn)
            }
            Err(e) if e.is_rejection() => {
                if self.replace_if_current(&current.refresh_token, None).await? {
                    warn!(uid = %current.uid, error = %e, "token refresh rejected, signing out");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange_refresh_token(&self, session: &Session) -> Result<Session, IdentityError> {
        debug!(uid = %session.uid, "refreshing id token");
        let url = format!("{}/token", self.secure_token_url);
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &session.refresh_token)
            .finish();

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_failure(response).await);
        }

        let result: RefreshTokenResponse = response.json().await?;
        Ok(Session {
            uid: result.user_id.unwrap_or_else(|| session.uid.clone()),
            expires_at: token_expiry(&result.id_token, result.expires_in.as_deref()),
            id_token: result.id_token,
            refresh_token: result.refresh_token,
            ..session.clone()
        })
    }

    async fn password_request(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let url = format!("{}/accounts:{}", self.identity_url, endpoint);
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_failure(response).await);
        }

        let result: SignInResponse = response.json().await?;
        let session = Session {
            expires_at: token_expiry(&result.id_token, result.expires_in.as_deref()),
            uid: result.local_id,
            email: result.email.or_else(|| Some(email.to_string())),
            display_name: result.display_name.filter(|n| !n.is_empty()),
            photo_url: result.profile_picture.filter(|p| !p.is_empty()),
            id_token: result.id_token,
            refresh_token: result.refresh_token,
        };

        self.publish(session.clone()).await?;
        info!(uid = %session.uid, "signed in");
        Ok(session)
    }

    async fn publish(&self, session: Session) -> Result<(), IdentityError> {
        let _guard = self.state_lock.lock().await;
        self.write_session_file(&session).await?;
        self.store.set(AuthState::SignedIn(session));
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), IdentityError> {
        let _guard = self.state_lock.lock().await;
        self.store.set(AuthState::SignedOut);
        self.remove_session_file().await
    }

    /// Publishes `next` (or signs out for `None`) only while the stored session
    /// still holds `refresh_token`. Returns whether it did.
    async fn replace_if_current(
        &self,
        refresh_token: &str,
        next: Option<Session>,
    ) -> Result<bool, IdentityError> {
        let _guard = self.state_lock.lock().await;
        let unchanged = self
            .store
            .state()
            .session()
            .is_some_and(|s| s.refresh_token == refresh_token);
        if !unchanged {
            return Ok(false);
        }

        match next {
            Some(session) => {
                self.write_session_file(&session).await?;
                self.store.set(AuthState::SignedIn(session));
            }
            None => {
                self.store.set(AuthState::SignedOut);
                self.remove_session_file().await?;
            }
        }
        Ok(true)
    }

    async fn write_session_file(&self, session: &Session) -> Result<(), IdentityError> {
        if let Some(path) = &self.session_file {
            tokio::fs::write(path, serde_json::to_vec(session)?).await?;
        }
        Ok(())
    }

    async fn remove_session_file(&self) -> Result<(), IdentityError> {
        if let Some(path) = &self.session_file {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityService for FirebaseIdentity {
    async fn register(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        self.password_request("signUp", email, password).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        self.password_request("signInWithPassword", email, password).await
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        self.clear_session().await?;
        info!("signed out");
        Ok(())
    }

    fn session(&self) -> SessionHandle {
        self.store.handle()
    }
}

async fn api_failure(response: reqwest::Response) -> IdentityError {
    match read_error_response(response).await {
        Ok(envelope) => IdentityError::from_code(envelope.error_code(), envelope.display_message()),
        Err(raw) => IdentityError::ApiError(raw),
    }
}

/// Expiry from `expiresIn` seconds, falling back to the token's own `exp` claim.
fn token_expiry(id_token: &str, expires_in: Option<&str>) -> DateTime<Utc> {
    if let Some(secs) = expires_in.and_then(|s| s.parse::<i64>().ok()) {
        return Utc::now() + Duration::seconds(secs);
    }

    id_token
        .split('.')
        .nth(1)
        .and_then(|payload| URL_SAFE_NO_PAD.decode(payload).ok())
        .and_then(|raw| serde_json::from_slice::<IdTokenClaims>(&raw).ok())
        .and_then(|claims| DateTime::from_timestamp(claims.exp, 0))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1))
}
