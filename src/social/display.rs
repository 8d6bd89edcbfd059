//! How a signed-in user is shown to others.

use crate::auth::Session;

/// Prefix of the name given to accounts without an email address.
pub const SYNTHETIC_NAME_PREFIX: &str = "user_";

/// The text before the first `@` of the session's email, or `user_` followed
/// by the first six characters of the uid when there is no email.
pub fn display_name(session: &Session) -> String {
    match session.email.as_deref().filter(|e| !e.is_empty()) {
        Some(email) => email.split('@').next().unwrap_or_default().to_string(),
        None => {
            let prefix: String = session.uid.chars().take(6).collect();
            format!("{}{}", SYNTHETIC_NAME_PREFIX, prefix)
        }
    }
}

/// The session's photo, or the placeholder keyed by uid.
pub fn avatar_url(session: &Session, placeholder_base: &str) -> String {
    match session.photo_url.as_deref().filter(|p| !p.is_empty()) {
        Some(photo) => photo.to_string(),
        None => format!("{}{}", placeholder_base, session.uid),
    }
}
