use serde::{Deserialize, Serialize};

/// Status value the health endpoint uses for a structurally bad token.
pub const HEALTH_STATUS_INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Recovery hint attached to a failed health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthAction {
    ClearCookiesAndReauth,
    RetryOrReauth,
    #[serde(other)]
    Other,
}

/// Body returned by the session health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<HealthAction>,
}

impl HealthReport {
    /// Returns `true` when the report declares the credential unusable
    /// rather than the check merely failing.
    pub fn requires_reauth(&self) -> bool {
        self.status == HEALTH_STATUS_INVALID_TOKEN
            || matches!(self.action, Some(HealthAction::ClearCookiesAndReauth))
    }

    /// Returns `true` when the report asks the client to retry or fall back
    /// to the login screen.
    pub fn suggests_retry_or_reauth(&self) -> bool {
        matches!(self.action, Some(HealthAction::RetryOrReauth))
    }
}
