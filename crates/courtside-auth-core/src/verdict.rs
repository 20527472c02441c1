use serde::{Deserialize, Serialize};

use crate::session::{AuthUser, Session};

/// Outcome category of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// No validation pass has completed yet.
    Initial,
    NoSession,
    Expired,
    InvalidToken,
    ValidationFailed,
    Healthy,
    SignedOut,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Initial => "initial",
            ValidationStatus::NoSession => "no_session",
            ValidationStatus::Expired => "expired",
            ValidationStatus::InvalidToken => "invalid_token",
            ValidationStatus::ValidationFailed => "validation_failed",
            ValidationStatus::Healthy => "healthy",
            ValidationStatus::SignedOut => "signed_out",
        }
    }
}

/// Recovery step the caller should take after a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    None,
    ClearCookies,
    RedirectLogin,
    RefreshToken,
    Retry,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::None => "none",
            RecoveryAction::ClearCookies => "clear_cookies",
            RecoveryAction::RedirectLogin => "redirect_login",
            RecoveryAction::RefreshToken => "refresh_token",
            RecoveryAction::Retry => "retry",
        }
    }
}

/// Immutable outcome of a single validation pass.
///
/// Values are built through the constructors below, which keep the recovery
/// flags consistent with the status: a valid verdict never carries recovery
/// steps, an expired verdict always asks for a refresh, and an invalid-token
/// verdict always asks for a cookie wipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub should_clear_cookies: bool,
    pub should_redirect_to_login: bool,
    pub action: RecoveryAction,
}

impl ValidationVerdict {
    fn base(status: ValidationStatus) -> Self {
        Self {
            is_valid: false,
            status,
            session: None,
            user: None,
            reason: None,
            should_clear_cookies: false,
            should_redirect_to_login: false,
            action: RecoveryAction::None,
        }
    }

    /// Session confirmed usable, locally and (when probed) by the server.
    pub fn healthy(session: Session, user: AuthUser) -> Self {
        Self {
            is_valid: true,
            session: Some(session),
            user: Some(user),
            ..Self::base(ValidationStatus::Healthy)
        }
    }

    /// Placeholder before the first validation pass completes.
    pub fn initial() -> Self {
        Self::base(ValidationStatus::Initial)
    }

    /// The user signed out deliberately; nothing to recover.
    pub fn signed_out() -> Self {
        Self::base(ValidationStatus::SignedOut)
    }

    /// No credential is stored at all.
    pub fn no_session() -> Self {
        Self {
            reason: Some("no active session".to_owned()),
            should_redirect_to_login: true,
            action: RecoveryAction::RedirectLogin,
            ..Self::base(ValidationStatus::NoSession)
        }
    }

    /// The stored credential has passed its expiry instant.
    pub fn expired(session: Session) -> Self {
        Self {
            session: Some(session),
            reason: Some("session expired".to_owned()),
            action: RecoveryAction::RefreshToken,
            ..Self::base(ValidationStatus::Expired)
        }
    }

    /// The credential is structurally unusable (bad signature, corrupt JWT).
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            should_clear_cookies: true,
            should_redirect_to_login: true,
            action: RecoveryAction::ClearCookies,
            ..Self::base(ValidationStatus::InvalidToken)
        }
    }

    /// Validation could not complete; the credential may still be fine.
    pub fn validation_failed(reason: impl Into<String>, redirect_to_login: bool) -> Self {
        Self {
            reason: Some(reason.into()),
            should_redirect_to_login: redirect_to_login,
            action: RecoveryAction::Retry,
            ..Self::base(ValidationStatus::ValidationFailed)
        }
    }

    /// Attach the session this verdict was produced from.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}
