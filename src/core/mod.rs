pub mod logging;
pub mod middleware;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        format!("{} (code: {})", self.error.message, self.error.code)
    }

    /// The machine-readable part of the message.
    ///
    /// Identity Toolkit encodes errors as `CODE` or `CODE : human text`.
    pub fn error_code(&self) -> &str {
        self.error
            .message
            .split(" : ")
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Reads a failed response into the structured envelope, when the body is one.
pub async fn read_error_response(response: reqwest::Response) -> Result<FirebaseErrorResponse, String> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<FirebaseErrorResponse>(&text).map_err(|_| format!("{}: {}", status, text))
}

pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    match read_error_response(response).await {
        Ok(error_resp) => error_resp.display_message(),
        Err(raw) => format!("{}: {}", default_msg, raw),
    }
}
