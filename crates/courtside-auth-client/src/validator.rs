use std::sync::Arc;

use tracing::{debug, warn};

use courtside_auth_core::{HealthReport, Session, ValidationVerdict, now_epoch_seconds};

use crate::{
    probe::{HealthProbe, ProbeError},
    store::{CredentialStore, StoreError, StoreErrorClass},
};

/// Decides whether the locally-held credential is usable.
///
/// Checks run in order and short-circuit: store errors are classified first,
/// then absence, then local expiry, and only a locally-valid session is sent
/// to the health endpoint. Every branch yields a verdict; validation itself
/// never fails. An unreachable health endpoint downgrades to the local-only
/// result instead of invalidating a session the server might still accept.
pub struct SessionValidator {
    store: Arc<dyn CredentialStore>,
    probe: Option<HealthProbe>,
}

impl SessionValidator {
    pub fn new(store: Arc<dyn CredentialStore>, probe: Option<HealthProbe>) -> Self {
        Self { store, probe }
    }

    pub async fn validate(&self) -> ValidationVerdict {
        let session = match self.store.session().await {
            Ok(value) => value,
            Err(err) => return verdict_for_store_error(&err),
        };

        let Some(session) = session else {
            debug!(target: "auth.validator", "no stored session");
            return ValidationVerdict::no_session();
        };

        if session.is_expired(now_epoch_seconds()) {
            debug!(
                target: "auth.validator",
                expires_at = session.expires_at,
                "session expired locally",
            );
            return ValidationVerdict::expired(session);
        }

        let user = match self.store.user().await {
            Ok(Some(user)) => user,
            // The session vanished between the two lookups (concurrent
            // sign-out); report absence rather than inventing an error.
            Ok(None) => return ValidationVerdict::no_session(),
            Err(err) => return verdict_for_store_error(&err).with_session(session),
        };

        match self.probe_session(&session).await {
            ProbeOutcome::Passed => {
                debug!(target: "auth.validator", user_id = user.id.as_str(), "session healthy");
                ValidationVerdict::healthy(session, user)
            }
            ProbeOutcome::Rejected(verdict) => verdict,
        }
    }

    async fn probe_session(&self, session: &Session) -> ProbeOutcome {
        let Some(probe) = &self.probe else {
            return ProbeOutcome::Passed;
        };
        match probe.check(&session.access_token).await {
            Ok(_) => ProbeOutcome::Passed,
            Err(ProbeError::Rejected { status, report }) => {
                warn!(
                    target: "auth.validator",
                    status,
                    report = report.status.as_str(),
                    "health endpoint rejected session",
                );
                ProbeOutcome::Rejected(verdict_for_health_report(status, report, session))
            }
            // Timeouts and transport failures degrade to the local result;
            // the health check augments validation but never gates it.
            Err(err) => {
                warn!(target: "auth.validator", error = %err, "health endpoint unreachable");
                ProbeOutcome::Passed
            }
        }
    }
}

enum ProbeOutcome {
    Passed,
    Rejected(ValidationVerdict),
}

fn verdict_for_store_error(error: &StoreError) -> ValidationVerdict {
    match StoreErrorClass::of(error) {
        StoreErrorClass::JwtInvalid => {
            warn!(target: "auth.validator", error = %error, "store rejected credential");
            ValidationVerdict::invalid_token(error.to_string())
        }
        StoreErrorClass::Transient => {
            warn!(target: "auth.validator", error = %error, "store lookup failed");
            ValidationVerdict::validation_failed(error.to_string(), false)
        }
    }
}

fn verdict_for_health_report(
    status: u16,
    report: HealthReport,
    session: &Session,
) -> ValidationVerdict {
    let reason = report
        .message
        .clone()
        .unwrap_or_else(|| format!("health endpoint returned {status}"));
    if report.requires_reauth() {
        return ValidationVerdict::invalid_token(reason);
    }
    ValidationVerdict::validation_failed(reason, report.suggests_retry_or_reauth())
        .with_session(session.clone())
}
