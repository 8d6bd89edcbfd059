use crate::auth::{FirebaseIdentity, IdentityService, REFRESH_LEEWAY_SECS};
use chrono::{Duration, Utc};
use http::Extensions;
use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next};

/// Attaches the signed-in user's ID token to Firestore and Storage requests.
///
/// Tokens close to expiry are refreshed first. Requests made while signed out
/// are sent without credentials and fail by the backend's security rules.
#[derive(Clone)]
pub struct IdTokenMiddleware {
    identity: FirebaseIdentity,
}

impl IdTokenMiddleware {
    pub fn new(identity: FirebaseIdentity) -> Self {
        Self { identity }
    }

    async fn get_token(&self) -> Result<Option<String>, anyhow::Error> {
        let Some(session) = self.identity.session().current() else {
            return Ok(None);
        };

        if session.is_expiring(Utc::now(), Duration::seconds(REFRESH_LEEWAY_SECS)) {
            let refreshed = self.identity.refresh().await?;
            return Ok(Some(refreshed.id_token));
        }

        Ok(Some(session.id_token))
    }
}

#[async_trait::async_trait]
impl Middleware for IdTokenMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self.get_token().await.map_err(|e| {
            reqwest_middleware::Error::Middleware(anyhow::anyhow!("Failed to get ID token: {}", e))
        })?;

        if let Some(token) = token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                reqwest_middleware::Error::Middleware(anyhow::anyhow!("Invalid ID token: {}", e))
            })?;
            req.headers_mut().insert(header::AUTHORIZATION, value);
        }

        next.run(req, extensions).await
    }
}
