//! Courtside auth core primitives shared by the client keeper and services.

pub mod health;
pub mod session;
pub mod verdict;

pub use health::{HealthAction, HealthReport};
pub use session::{AuthUser, NEAR_EXPIRY_WINDOW_SECS, Session, is_token_near_expiry, now_epoch_seconds};
pub use verdict::{RecoveryAction, ValidationStatus, ValidationVerdict};
