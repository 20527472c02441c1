use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds before expiry at which a session becomes eligible for a refresh.
pub const NEAR_EXPIRY_WINDOW_SECS: u64 = 120;

/// Credential snapshot held by the client between validations.
///
/// Tokens are opaque to this crate; expiry is tracked in epoch seconds with
/// second resolution, and a session whose `expires_at` equals the current
/// second is already expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant in epoch seconds.
    pub expires_at: u64,
    /// Identifier of the user this credential belongs to.
    pub user_id: String,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: u64,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            user_id: user_id.into(),
        }
    }

    /// Returns `true` once the expiry instant has been reached.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Server-confirmed identity echoed back by a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Returns `true` when the session expires within the refresh window.
///
/// Already-expired sessions also report `true`; the window is a refresh
/// trigger, not a validity check.
pub fn is_token_near_expiry(session: &Session, now: u64) -> bool {
    session.expires_at.saturating_sub(now) <= NEAR_EXPIRY_WINDOW_SECS
}
