//! Client-side session validation and health monitoring for Courtside.
//!
//! [`SessionKeeper`] owns the authoritative [`AuthState`] and keeps it
//! current: a [`SessionValidator`] turns the credential store's answers and
//! the health endpoint's report into a single [`ValidationVerdict`] per
//! pass, and the keeper commits whole verdicts, never partial updates.
//! [`IdentityClient`] is the production [`CredentialStore`]; tests swap in
//! their own.

pub mod config;
pub mod identity;
pub mod keeper;
pub mod probe;
pub mod storage;
pub mod store;
pub mod sweeper;
pub mod validator;

pub use config::{ConfigError, IdentityConfig, KeeperConfig};
pub use courtside_auth_core::{
    AuthUser, HealthAction, HealthReport, RecoveryAction, Session, ValidationStatus,
    ValidationVerdict, is_token_near_expiry, now_epoch_seconds,
};
pub use identity::IdentityClient;
pub use keeper::{AuthState, SessionKeeper};
pub use probe::{HealthProbe, ProbeError};
pub use storage::{FileStorage, MemoryStorage, StorageArea, StorageError};
pub use store::{CredentialStore, SessionChange, StoreError, StoreErrorClass};
pub use sweeper::{AUTH_COOKIE_NAMES, CredentialSweeper};
pub use validator::SessionValidator;
