use regex::Regex;
use std::sync::LazyLock;

pub const PASSWORD_SYMBOLS: &str = "@$!%*?&";
pub const MIN_PASSWORD_LEN: usize = 8;

pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email (e.g. user@domain.com)";
pub const INVALID_PASSWORD_MESSAGE: &str = "Password must be at least 8 characters and include an uppercase letter, a lowercase letter, a digit and a special character (@$!%*?&)";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

static PASSWORD_CHARSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@$!%*?&]{8,}$").expect("Invalid password regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// At least eight characters from letters, digits and `@$!%*?&`, with at least
/// one lowercase letter, one uppercase letter, one digit and one symbol.
pub fn is_valid_password(password: &str) -> bool {
    PASSWORD_CHARSET_RE.is_match(password)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
}
