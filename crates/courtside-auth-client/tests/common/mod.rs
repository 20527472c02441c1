#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::future::FutureExt;
use tokio::sync::{Notify, broadcast, watch};
use url::Url;
use wiremock::MockServer;

use courtside_auth_client::{
    AuthState, AuthUser, CredentialStore, Session, SessionChange, StoreError, ValidationStatus,
    now_epoch_seconds,
};

const STUB_EVENT_CAPACITY: usize = 16;

pub async fn try_start_mock() -> Option<MockServer> {
    let fut = MockServer::start();
    let fut = std::panic::AssertUnwindSafe(fut);
    fut.catch_unwind().await.ok()
}

/// Route keeper traces to the test output when `RUST_LOG` asks for them.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn api_error(status: u16, message: &str) -> StoreError {
    StoreError::Api {
        status,
        message: message.to_owned(),
    }
}

pub fn session_expiring_at(expires_at: u64) -> Session {
    Session::new("access-abc", Some("refresh-abc".to_owned()), expires_at, "user-1")
}

pub fn test_user() -> AuthUser {
    AuthUser {
        id: "user-1".to_owned(),
        email: Some("captain@courtside.test".to_owned()),
    }
}

/// Block until the keeper commits a state with the wanted status.
pub async fn wait_for_status(
    rx: &mut watch::Receiver<AuthState>,
    status: ValidationStatus,
) -> AuthState {
    let state = tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|state| state.status == status),
    )
    .await
    .expect("timed out waiting for status")
    .expect("state channel closed");
    state.clone()
}

/// Stub operation a scripted failure or gate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubOp {
    Session,
    User,
    Refresh,
    SignIn,
    SignUp,
    OAuth,
    SignOut,
    Reset,
}

#[derive(Default)]
struct Scripts {
    session: VecDeque<StoreError>,
    user: VecDeque<StoreError>,
    refresh: VecDeque<StoreError>,
    sign_in: VecDeque<StoreError>,
    sign_up: VecDeque<StoreError>,
    oauth: VecDeque<StoreError>,
    sign_out: VecDeque<StoreError>,
    reset: VecDeque<StoreError>,
}

impl Scripts {
    fn queue(&mut self, op: StubOp) -> &mut VecDeque<StoreError> {
        match op {
            StubOp::Session => &mut self.session,
            StubOp::User => &mut self.user,
            StubOp::Refresh => &mut self.refresh,
            StubOp::SignIn => &mut self.sign_in,
            StubOp::SignUp => &mut self.sign_up,
            StubOp::OAuth => &mut self.oauth,
            StubOp::SignOut => &mut self.sign_out,
            StubOp::Reset => &mut self.reset,
        }
    }
}

/// Scripted in-memory credential store.
///
/// Each operation consumes at most one scripted failure, waits on at most
/// one gate, and bumps its call counter, so tests can both choreograph
/// timing and assert how often the keeper reached for the store.
pub struct StubStore {
    session: Mutex<Option<Session>>,
    user: Mutex<Option<AuthUser>>,
    staged_sign_in: Mutex<Option<(Session, AuthUser)>>,
    scripts: Mutex<Scripts>,
    gates: Mutex<HashMap<StubOp, Arc<Notify>>>,
    pub session_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    events: broadcast::Sender<SessionChange>,
}

impl StubStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(STUB_EVENT_CAPACITY);
        Arc::new(Self {
            session: Mutex::new(None),
            user: Mutex::new(None),
            staged_sign_in: Mutex::new(None),
            scripts: Mutex::new(Scripts::default()),
            gates: Mutex::new(HashMap::new()),
            session_calls: AtomicUsize::new(0),
            user_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            events,
        })
    }

    pub fn with_credentials(session: Session, user: AuthUser) -> Arc<Self> {
        let store = Self::new();
        store.set_session(Some(session));
        store.set_user(Some(user));
        store
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().expect("session lock") = session;
    }

    pub fn set_user(&self, user: Option<AuthUser>) {
        *self.user.lock().expect("user lock") = user;
    }

    /// Credentials the next `sign_in_with_password` or `sign_up` installs.
    pub fn stage_sign_in(&self, session: Session, user: AuthUser) {
        *self.staged_sign_in.lock().expect("stage lock") = Some((session, user));
    }

    /// Fail the next call to `op` with `error`.
    pub fn script_failure(&self, op: StubOp, error: StoreError) {
        self.scripts.lock().expect("scripts lock").queue(op).push_back(error);
    }

    /// Make the next call to `op` wait until the returned handle is notified.
    pub fn gate(&self, op: StubOp) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().expect("gates lock").insert(op, gate.clone());
        gate
    }

    pub fn emit(&self, change: SessionChange) {
        let _ = self.events.send(change);
    }

    fn scripted(&self, op: StubOp) -> Option<StoreError> {
        self.scripts.lock().expect("scripts lock").queue(op).pop_front()
    }

    async fn wait_gate(&self, op: StubOp) {
        let gate = self.gates.lock().expect("gates lock").remove(&op);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl CredentialStore for StubStore {
    async fn session(&self) -> Result<Option<Session>, StoreError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(StubOp::Session).await;
        if let Some(error) = self.scripted(StubOp::Session) {
            return Err(error);
        }
        Ok(self.session.lock().expect("session lock").clone())
    }

    async fn user(&self) -> Result<Option<AuthUser>, StoreError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(StubOp::User).await;
        if let Some(error) = self.scripted(StubOp::User) {
            return Err(error);
        }
        Ok(self.user.lock().expect("user lock").clone())
    }

    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _metadata: Option<serde_json::Value>,
    ) -> Result<Option<Session>, StoreError> {
        self.wait_gate(StubOp::SignUp).await;
        if let Some(error) = self.scripted(StubOp::SignUp) {
            return Err(error);
        }
        match self.staged_sign_in.lock().expect("stage lock").take() {
            Some((session, user)) => {
                self.set_session(Some(session.clone()));
                self.set_user(Some(user));
                self.emit(SessionChange::SignedIn);
                Ok(Some(session))
            }
            // Unstaged sign-ups behave like confirmation-gated providers.
            None => Ok(None),
        }
    }

    async fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Session, StoreError> {
        self.wait_gate(StubOp::SignIn).await;
        if let Some(error) = self.scripted(StubOp::SignIn) {
            return Err(error);
        }
        let (session, user) = self
            .staged_sign_in
            .lock()
            .expect("stage lock")
            .take()
            .expect("no staged sign-in credentials");
        self.set_session(Some(session.clone()));
        self.set_user(Some(user));
        self.emit(SessionChange::SignedIn);
        Ok(session)
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<Url, StoreError> {
        self.wait_gate(StubOp::OAuth).await;
        if let Some(error) = self.scripted(StubOp::OAuth) {
            return Err(error);
        }
        let mut url =
            Url::parse("https://auth.courtside.test/auth/v1/authorize").expect("authorize url");
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
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(StubOp::SignOut).await;
        if let Some(error) = self.scripted(StubOp::SignOut) {
            return Err(error);
        }
        self.set_session(None);
        self.set_user(None);
        self.emit(SessionChange::SignedOut);
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        _email: &str,
        _redirect_to: Option<&str>,
    ) -> Result<(), StoreError> {
        self.wait_gate(StubOp::Reset).await;
        if let Some(error) = self.scripted(StubOp::Reset) {
            return Err(error);
        }
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, StoreError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(StubOp::Refresh).await;
        if let Some(error) = self.scripted(StubOp::Refresh) {
            return Err(error);
        }
        let mut guard = self.session.lock().expect("session lock");
        let Some(current) = guard.clone() else {
            return Err(StoreError::NotSignedIn);
        };
        let rotated = Session::new(
            format!("{}-rotated", current.access_token),
            current.refresh_token.clone(),
            now_epoch_seconds() + 3600,
            current.user_id.clone(),
        );
        *guard = Some(rotated.clone());
        drop(guard);
        self.emit(SessionChange::TokenRefreshed);
        Ok(rotated)
    }

    fn changes(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}
