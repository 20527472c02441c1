use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

use courtside_auth_core::{AuthUser, Session};

use crate::storage::StorageError;

/// Message fragments the identity provider uses for signature-level JWT
/// failures. Matching is case-sensitive, same as the provider emits them.
const JWT_ERROR_MARKERS: [&str; 3] = [
    "invalid JWT",
    "signature is invalid",
    "unable to parse or verify signature",
];

/// Credential mutation reported by the store's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity endpoint returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("no active session")]
    NotSignedIn,
}

/// Coarse classification of a store failure, decided once at the validation
/// boundary so downstream logic never re-inspects raw message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorClass {
    /// The credential itself is unusable; recovery means wiping it.
    JwtInvalid,
    /// Everything else: transport, serialization, provider hiccups.
    Transient,
}

impl StoreErrorClass {
    pub fn of(error: &StoreError) -> Self {
        let message = error.to_string();
        if JWT_ERROR_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            StoreErrorClass::JwtInvalid
        } else {
            StoreErrorClass::Transient
        }
    }
}

/// Interface to the identity provider's credential store.
///
/// Implementations own the persisted session; the keeper and validator only
/// ever hold read copies handed out by these calls.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Currently held session, if any. Local lookup, no server round trip.
    async fn session(&self) -> Result<Option<Session>, StoreError>;

    /// Server-confirmed identity for the current session.
    async fn user(&self) -> Result<Option<AuthUser>, StoreError>;

    /// Register a new account. Providers that require e-mail confirmation
    /// answer without a session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<Session>, StoreError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, StoreError>;

    /// Build the provider authorize URL the caller should redirect to.
    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<Url, StoreError>;

    /// Drop the local session and revoke it server-side where possible.
    async fn sign_out(&self) -> Result<(), StoreError>;

    /// Send a password recovery e-mail, optionally linking back to
    /// `redirect_to` instead of the provider default.
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Exchange the refresh token for a new session.
    async fn refresh_session(&self) -> Result<Session, StoreError>;

    /// Subscribe to credential change events.
    fn changes(&self) -> broadcast::Receiver<SessionChange>;
}
