use super::busy::BusyFlag;
use super::validation::{
    is_valid_email, is_valid_password, INVALID_EMAIL_MESSAGE, INVALID_PASSWORD_MESSAGE,
};
use crate::auth::{IdentityError, IdentityService, Session};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    Register,
}

#[derive(Error, Debug)]
pub enum AuthFormError {
    /// Field errors are on the form.
    #[error("Invalid input")]
    Invalid,
    #[error("{}", .0.user_message())]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Registered(Session),
    LoggedIn(Session),
}

/// The sign-in / sign-up screen.
#[derive(Debug, Default)]
pub struct AuthForm {
    pub email: String,
    pub password: String,
    mode: AuthMode,
    email_error: Option<&'static str>,
    password_error: Option<&'static str>,
    submitting: BusyFlag,
}

impl AuthForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Switches between login and registration; field errors are cleared.
    pub fn toggle_mode(&mut self) -> AuthMode {
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        };
        self.email_error = None;
        self.password_error = None;
        self.mode
    }

    pub fn email_error(&self) -> Option<&'static str> {
        self.email_error
    }

    pub fn password_error(&self) -> Option<&'static str> {
        self.password_error
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_set()
    }

    /// A handle on the submitting flag that stays readable during `submit`.
    pub fn submitting_flag(&self) -> BusyFlag {
        self.submitting.clone()
    }

    /// Checks both fields, recording a message on each invalid one.
    pub fn validate(&mut self) -> bool {
        self.email_error = (!is_valid_email(&self.email)).then_some(INVALID_EMAIL_MESSAGE);
        self.password_error =
            (!is_valid_password(&self.password)).then_some(INVALID_PASSWORD_MESSAGE);
        self.email_error.is_none() && self.password_error.is_none()
    }

    pub async fn submit(
        &mut self,
        identity: &dyn IdentityService,
    ) -> Result<AuthOutcome, AuthFormError> {
        if !self.validate() {
            return Err(AuthFormError::Invalid);
        }

        let guard = self.submitting.try_enter();
        let result = match self.mode {
            AuthMode::Login => identity
                .login(&self.email, &self.password)
                .await
                .map(AuthOutcome::LoggedIn),
            AuthMode::Register => identity
                .register(&self.email, &self.password)
                .await
                .map(AuthOutcome::Registered),
        };
        drop(guard);

        match result {
            Ok(outcome) => {
                if let AuthOutcome::Registered(session) = &outcome {
                    info!(uid = %session.uid, "account registered");
                    self.mode = AuthMode::Login;
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(mode = ?self.mode, error = %e, "authentication failed");
                Err(e.into())
            }
        }
    }
}
