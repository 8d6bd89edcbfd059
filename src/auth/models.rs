use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

/// Response of `accounts:signUp` and `accounts:signInWithPassword`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub registered: Option<bool>,
}

/// Response of the Secure Token API. This one is snake_case on the wire.
#[derive(Debug, Deserialize)]
pub struct RefreshTokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub user_id: Option<String>,
}

/// The only claim read from an ID token on the client.
#[derive(Debug, Deserialize)]
pub(crate) struct IdTokenClaims {
    pub exp: i64,
}
