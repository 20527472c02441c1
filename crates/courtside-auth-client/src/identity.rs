use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, Response, cookie::Jar};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use courtside_auth_core::{AuthUser, Session, now_epoch_seconds};

use crate::{
    config::IdentityConfig,
    storage::StorageArea,
    store::{CredentialStore, SessionChange, StoreError},
};

const EVENT_CAPACITY: usize = 16;
const DEFAULT_TTL_SECS: u64 = 3600;

/// HTTP credential store backed by a GoTrue-style identity API.
///
/// The current session is cached in memory, persisted as JSON into the
/// configured [`StorageArea`], and every mutation is announced on the
/// change stream.
pub struct IdentityClient {
    http: Client,
    base_url: Url,
    api_key: String,
    storage_key: String,
    storage: Arc<dyn StorageArea>,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionChange>,
}

impl IdentityClient {
    pub fn new(config: IdentityConfig, storage: Arc<dyn StorageArea>) -> Result<Self, StoreError> {
        Self::build(config, storage, None)
    }

    /// Share a cookie jar with the rest of the auth stack so the sweeper
    /// can expire whatever cookies these requests pick up.
    pub fn with_jar(
        config: IdentityConfig,
        storage: Arc<dyn StorageArea>,
        jar: Arc<Jar>,
    ) -> Result<Self, StoreError> {
        Self::build(config, storage, Some(jar))
    }

    fn build(
        config: IdentityConfig,
        storage: Arc<dyn StorageArea>,
        jar: Option<Arc<Jar>>,
    ) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(jar) = jar {
            builder = builder.cookie_provider(jar);
        }
        let http = builder.build()?;
        let current = load_snapshot(storage.as_ref(), &config.storage_key)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url: config.base_url,
            api_key: config.api_key,
            storage_key: config.storage_key,
            storage,
            current: RwLock::new(current),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        let raw = format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'));
        Ok(Url::parse(&raw)?)
    }

    fn current_session(&self) -> Option<Session> {
        self.current.read().expect("session lock poisoned").clone()
    }

    /// Replace the cached session and its persisted snapshot in one step.
    fn store_session(&self, session: Option<Session>) -> Result<(), StoreError> {
        match &session {
            Some(value) => {
                let payload = serde_json::to_string(value)?;
                self.storage.set(&self.storage_key, &payload)?;
            }
            None => self.storage.remove(&self.storage_key)?,
        }
        *self.current.write().expect("session lock poisoned") = session;
        Ok(())
    }

    fn emit(&self, change: SessionChange) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.events.send(change);
    }

    fn session_from_token(&self, token: TokenResponse) -> Result<Session, StoreError> {
        let user = token
            .user
            .ok_or_else(|| StoreError::InvalidResponse("missing user in token response".into()))?;
        let expires_at = token.expires_at.unwrap_or_else(|| {
            now_epoch_seconds().saturating_add(token.expires_in.unwrap_or(DEFAULT_TTL_SECS))
        });
        Ok(Session::new(
            token.access_token,
            token.refresh_token,
            expires_at,
            user.id,
        ))
    }

    async fn post_token_grant(
        &self,
        grant_type: &str,
        body: &impl Serialize,
    ) -> Result<TokenResponse, StoreError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CredentialStore for IdentityClient {
    async fn session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.current_session())
    }

    async fn user(&self) -> Result<Option<AuthUser>, StoreError> {
        let access_token = match self.current_session() {
            Some(session) => session.access_token,
            None => return Ok(None),
        };
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }
        let wire: WireUser = response.json().await?;
        Ok(Some(AuthUser {
            id: wire.id,
            email: wire.email,
        }))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<Session>, StoreError> {
        let url = self.endpoint("auth/v1/signup")?;
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&SignUpRequest {
                email,
                password,
                data: metadata,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }
        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            // Confirmation-gated providers answer with a bare user record.
            debug!(target: "auth.identity", email, "sign-up accepted, confirmation pending");
            return Ok(None);
        }
        let session = self.session_from_token(token)?;
        self.store_session(Some(session.clone()))?;
        self.emit(SessionChange::SignedIn);
        Ok(Some(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, StoreError> {
        let token = self
            .post_token_grant("password", &PasswordGrant { email, password })
            .await?;
        let session = self.session_from_token(token)?;
        self.store_session(Some(session.clone()))?;
        self.emit(SessionChange::SignedIn);
        debug!(target: "auth.identity", user_id = session.user_id.as_str(), "signed in");
        Ok(session)
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<Url, StoreError> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("provider", provider);
            if let Some(target) = redirect_to {
                pairs.append_pair("redirect_to", target);
            }
        }
        Ok(url)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let access_token = self.current_session().map(|session| session.access_token);

        // Local credentials go first; revocation failures only get logged.
        self.store_session(None)?;
        self.emit(SessionChange::SignedOut);

        if let Some(token) = access_token {
            let url = self.endpoint("auth/v1/logout")?;
            let result = self
                .http
                .post(url)
                .header("apikey", &self.api_key)
                .bearer_auth(&token)
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_success() => {
                    let err = read_error(response).await;
                    warn!(target: "auth.identity", error = %err, "server rejected logout");
                }
                Err(err) => {
                    warn!(target: "auth.identity", error = %err, "logout request failed");
                }
                Ok(_) => {}
            }
        }
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut url = self.endpoint("auth/v1/recover")?;
        if let Some(target) = redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", target);
        }
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&RecoverRequest { email })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, StoreError> {
        let refresh_token = match self.current_session() {
            Some(session) => session.refresh_token.ok_or(StoreError::NoRefreshToken)?,
            None => return Err(StoreError::NotSignedIn),
        };
        let token = self
            .post_token_grant(
                "refresh_token",
                &RefreshGrant {
                    refresh_token: &refresh_token,
                },
            )
            .await?;
        let mut session = self.session_from_token(token)?;
        // Providers may rotate or withhold the refresh token; keep the old
        // one when none comes back.
        if session.refresh_token.is_none() {
            session.refresh_token = Some(refresh_token);
        }
        self.store_session(Some(session.clone()))?;
        self.emit(SessionChange::TokenRefreshed);
        debug!(target: "auth.identity", expires_at = session.expires_at, "session refreshed");
        Ok(session)
    }

    fn changes(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

fn load_snapshot(
    storage: &dyn StorageArea,
    storage_key: &str,
) -> Result<Option<Session>, StoreError> {
    let Some(payload) = storage.get(storage_key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&payload) {
        Ok(session) => Ok(Some(session)),
        Err(err) => {
            // A corrupt snapshot is dropped rather than wedging the client.
            warn!(target: "auth.identity", error = %err, "discarding unreadable session snapshot");
            Ok(None)
        }
    }
}

async fn read_error(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|err| err.error_description.or(err.msg).or(err.error))
        .unwrap_or(body);
    StoreError::Api { status, message }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    user: Option<WireUser>,
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
