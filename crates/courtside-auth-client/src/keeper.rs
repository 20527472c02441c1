use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
    task::JoinHandle,
    time::{interval, timeout},
};
use tracing::{debug, info, warn};
use url::Url;

use courtside_auth_core::{
    AuthUser, Session, ValidationStatus, ValidationVerdict, is_token_near_expiry,
    now_epoch_seconds,
};

use crate::{
    config::KeeperConfig,
    probe::HealthProbe,
    store::{CredentialStore, SessionChange, StoreError},
    sweeper::CredentialSweeper,
    validator::SessionValidator,
};

/// Authoritative client-side view of the auth session.
///
/// Replaced wholesale on every verdict commit; fields never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
    pub is_valid: bool,
    pub is_loading: bool,
    /// Epoch seconds of the most recent commit.
    pub last_validated: Option<u64>,
    pub status: ValidationStatus,
}

impl AuthState {
    /// Shape held between mount and the first completed validation pass.
    pub fn initial() -> Self {
        Self {
            user: None,
            session: None,
            is_valid: false,
            is_loading: true,
            last_validated: None,
            status: ValidationStatus::Initial,
        }
    }

    fn from_verdict(verdict: &ValidationVerdict, now: u64) -> Self {
        Self {
            user: verdict.user.clone(),
            session: verdict.session.clone(),
            is_valid: verdict.is_valid,
            is_loading: false,
            last_validated: Some(now),
            status: verdict.status,
        }
    }

    fn wants_monitoring(&self) -> bool {
        self.is_valid && self.session.is_some()
    }
}

/// Owns the auth state and keeps it current.
///
/// One validation pipeline feeds one [`watch`] channel: every pass claims a
/// monotonic pass number before its first suspension point, and the commit
/// step drops verdicts that lost the race to a newer pass. While the state
/// is valid, two background loops re-validate on a fixed cadence and refresh
/// the token as it nears expiry; both are torn down in the same step that
/// commits an invalid state, and on shutdown. Store events trigger a
/// debounced re-validation instead of being applied directly.
///
/// `mount` must be called from within a Tokio runtime.
pub struct SessionKeeper {
    inner: Arc<KeeperInner>,
}

impl SessionKeeper {
    pub fn mount(
        store: Arc<dyn CredentialStore>,
        probe: Option<HealthProbe>,
        sweeper: CredentialSweeper,
        config: KeeperConfig,
    ) -> Self {
        let validator = SessionValidator::new(store.clone(), probe);
        let (state, _) = watch::channel(AuthState::initial());
        let inner = Arc::new(KeeperInner {
            store,
            validator,
            sweeper,
            config,
            state,
            pass_seq: AtomicU64::new(0),
            committed_pass: Mutex::new(0),
            tasks: Mutex::new(Tasks::default()),
        });

        let events = inner.store.changes();
        {
            let mut tasks = inner.tasks.lock().expect("task lock poisoned");
            tasks.listener = Some(spawn_change_listener(
                Arc::downgrade(&inner),
                events,
                inner.config.debounce,
            ));
            let weak = Arc::downgrade(&inner);
            tasks.bootstrap = Some(tokio::spawn(async move {
                let Some(keeper) = weak.upgrade() else { return };
                validate_and_commit(&keeper).await;
            }));
        }
        info!(target: "auth.keeper", "mounted");
        Self { inner }
    }

    /// Run a validation pass, commit the verdict, and return it.
    pub async fn validate_auth(&self) -> ValidationVerdict {
        validate_and_commit(&self.inner).await
    }

    /// Refresh the session and re-validate. Returns the resulting validity;
    /// on refresh failure the state is left untouched and `false` comes back.
    pub async fn refresh_session(&self) -> bool {
        refresh_and_commit(&self.inner).await
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ValidationVerdict, StoreError> {
        self.inner.set_loading(true);
        match self.inner.store.sign_in_with_password(email, password).await {
            Ok(_) => {
                let verdict = validate_and_commit(&self.inner).await;
                self.inner.set_loading(false);
                Ok(verdict)
            }
            Err(err) => {
                self.inner.set_loading(false);
                Err(err)
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<ValidationVerdict, StoreError> {
        self.inner.set_loading(true);
        match self.inner.store.sign_up(email, password, metadata).await {
            Ok(_) => {
                let verdict = validate_and_commit(&self.inner).await;
                self.inner.set_loading(false);
                Ok(verdict)
            }
            Err(err) => {
                self.inner.set_loading(false);
                Err(err)
            }
        }
    }

    /// Build the provider authorize URL. The caller performs the redirect;
    /// the session lands later via the store's event stream.
    pub async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<Url, StoreError> {
        self.inner.set_loading(true);
        match self
            .inner
            .store
            .sign_in_with_oauth(provider, redirect_to)
            .await
        {
            Ok(url) => {
                validate_and_commit(&self.inner).await;
                self.inner.set_loading(false);
                Ok(url)
            }
            Err(err) => {
                self.inner.set_loading(false);
                Err(err)
            }
        }
    }

    /// Sign out, reset the state to its signed-out shape, and sweep
    /// credentials. The signed-out commit claims the newest pass number, so
    /// an in-flight validation can never resurrect the session.
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        self.inner.set_loading(true);
        match self.inner.store.sign_out().await {
            Ok(()) => {
                let pass = self.inner.next_pass();
                if self.inner.commit(pass, &ValidationVerdict::signed_out()) {
                    sync_monitors(&self.inner);
                }
                self.inner.sweeper.sweep();
                self.inner.set_loading(false);
                info!(target: "auth.keeper", "signed out");
                Ok(())
            }
            Err(err) => {
                self.inner.set_loading(false);
                Err(err)
            }
        }
    }

    pub async fn reset_password(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.set_loading(true);
        match self
            .inner
            .store
            .reset_password_for_email(email, redirect_to)
            .await
        {
            Ok(()) => {
                validate_and_commit(&self.inner).await;
                self.inner.set_loading(false);
                Ok(())
            }
            Err(err) => {
                self.inner.set_loading(false);
                Err(err)
            }
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Watch the state for changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Abort every background task. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        self.inner.teardown();
        info!(target: "auth.keeper", "unmounted");
    }
}

impl Drop for SessionKeeper {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

struct KeeperInner {
    store: Arc<dyn CredentialStore>,
    validator: SessionValidator,
    sweeper: CredentialSweeper,
    config: KeeperConfig,
    state: watch::Sender<AuthState>,
    pass_seq: AtomicU64,
    committed_pass: Mutex<u64>,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    bootstrap: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
    health: Option<JoinHandle<()>>,
    refresh: Option<JoinHandle<()>>,
}

impl KeeperInner {
    fn next_pass(&self) -> u64 {
        self.pass_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Commit the verdict produced by `pass`, unless a newer pass already
    /// committed. The sweep indicated by a verdict runs inside the commit,
    /// before the state becomes visible.
    fn commit(&self, pass: u64, verdict: &ValidationVerdict) -> bool {
        let mut committed = self.committed_pass.lock().expect("commit lock poisoned");
        if pass < *committed {
            debug!(
                target: "auth.keeper",
                pass,
                committed = *committed,
                status = verdict.status.as_str(),
                "dropping stale verdict",
            );
            return false;
        }
        *committed = pass;

        if verdict.should_clear_cookies {
            info!(
                target: "auth.keeper",
                reason = verdict.reason.as_deref().unwrap_or("-"),
                "clearing credentials",
            );
            self.sweeper.sweep();
        }

        let next = AuthState::from_verdict(verdict, now_epoch_seconds());
        debug!(
            target: "auth.keeper",
            pass,
            status = next.status.as_str(),
            valid = next.is_valid,
            "state committed",
        );
        self.state.send_replace(next);
        true
    }

    fn set_loading(&self, value: bool) {
        self.state.send_if_modified(|state| {
            if state.is_loading == value {
                return false;
            }
            state.is_loading = value;
            true
        });
    }

    fn teardown(&self) {
        let mut tasks = self.tasks.lock().expect("task lock poisoned");
        abort_monitors(&mut tasks);
        if let Some(handle) = tasks.bootstrap.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.listener.take() {
            handle.abort();
        }
    }
}

async fn validate_and_commit(inner: &Arc<KeeperInner>) -> ValidationVerdict {
    let pass = inner.next_pass();
    let verdict = inner.validator.validate().await;
    if inner.commit(pass, &verdict) {
        sync_monitors(inner);
    }
    verdict
}

async fn refresh_and_commit(inner: &Arc<KeeperInner>) -> bool {
    match inner.store.refresh_session().await {
        Ok(_) => validate_and_commit(inner).await.is_valid,
        Err(err) => {
            warn!(target: "auth.keeper", error = %err, "session refresh failed");
            false
        }
    }
}

/// Start or stop the monitor loops to match the committed state. Runs
/// synchronously after every commit, so loops never outlive the validity
/// they watch.
fn sync_monitors(inner: &Arc<KeeperInner>) {
    let wants = inner.state.borrow().wants_monitoring();
    let mut tasks = inner.tasks.lock().expect("task lock poisoned");
    if wants {
        if tasks.health.is_none() {
            debug!(target: "auth.keeper", "starting monitor loops");
            tasks.health = Some(spawn_health_loop(
                Arc::downgrade(inner),
                inner.config.health_interval,
            ));
            tasks.refresh = Some(spawn_refresh_loop(
                Arc::downgrade(inner),
                inner.config.refresh_interval,
            ));
        }
    } else if tasks.health.is_some() || tasks.refresh.is_some() {
        debug!(target: "auth.keeper", "stopping monitor loops");
        abort_monitors(&mut tasks);
    }
}

fn abort_monitors(tasks: &mut Tasks) {
    if let Some(handle) = tasks.health.take() {
        handle.abort();
    }
    if let Some(handle) = tasks.refresh.take() {
        handle.abort();
    }
}

fn spawn_health_loop(inner: Weak<KeeperInner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // The first tick completes immediately; the commit that started
        // this loop was itself a validation, so skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(keeper) = inner.upgrade() else { return };
            debug!(target: "auth.keeper", "health tick");
            validate_and_commit(&keeper).await;
        }
    })
}

fn spawn_refresh_loop(inner: Weak<KeeperInner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(keeper) = inner.upgrade() else { return };
            let near_expiry = {
                let state = keeper.state.borrow();
                match (&state.session, state.is_valid) {
                    (Some(session), true) => is_token_near_expiry(session, now_epoch_seconds()),
                    _ => false,
                }
            };
            if !near_expiry {
                continue;
            }
            debug!(target: "auth.keeper", "session near expiry, refreshing");
            if !refresh_and_commit(&keeper).await {
                warn!(target: "auth.keeper", "scheduled refresh failed");
            }
        }
    })
}

fn spawn_change_listener(
    inner: Weak<KeeperInner>,
    mut events: broadcast::Receiver<SessionChange>,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut last = match events.recv().await {
                Ok(event) => Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "auth.keeper", skipped, "event stream lagged");
                    None
                }
                Err(RecvError::Closed) => return,
            };

            // Trailing-edge debounce: absorb the burst until it goes quiet,
            // then validate once.
            loop {
                match timeout(debounce, events.recv()).await {
                    Ok(Ok(event)) => last = Some(event),
                    Ok(Err(RecvError::Lagged(_))) => last = None,
                    Ok(Err(RecvError::Closed)) => break,
                    Err(_) => break,
                }
            }

            let Some(keeper) = inner.upgrade() else { return };
            // The keeper's own sign-out already committed its state; skip
            // the echo instead of re-validating it into `no_session`.
            if last == Some(SessionChange::SignedOut)
                && keeper.state.borrow().status == ValidationStatus::SignedOut
            {
                continue;
            }
            debug!(target: "auth.keeper", event = ?last, "store event, re-validating");
            validate_and_commit(&keeper).await;
        }
    })
}
