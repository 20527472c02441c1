use std::{env, sync::Arc, time::Duration};

use reqwest::{Client, cookie::Jar, header};
use tracing::debug;
use url::Url;

use courtside_auth_core::HealthReport;

use crate::config::{ConfigError, DEFAULT_PROBE_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The endpoint answered and judged the session unusable.
    #[error("health endpoint returned {status}")]
    Rejected { status: u16, report: HealthReport },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the session health endpoint.
///
/// Every request carries the bearer token and the shared cookie jar, and is
/// capped by a short timeout so a hung check cannot stall a validation pass.
#[derive(Clone)]
pub struct HealthProbe {
    http: Client,
    endpoint: Url,
}

impl HealthProbe {
    pub fn new(endpoint: Url) -> Result<Self, ProbeError> {
        Self::with_settings(endpoint, DEFAULT_PROBE_TIMEOUT, None)
    }

    pub fn with_settings(
        endpoint: Url,
        timeout: Duration,
        jar: Option<Arc<Jar>>,
    ) -> Result<Self, ProbeError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(jar) = jar {
            builder = builder.cookie_provider(jar);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint,
        })
    }

    /// Read the endpoint URL from `COURTSIDE_HEALTH_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("COURTSIDE_HEALTH_URL")
            .map_err(|_| ConfigError::MissingEnv("COURTSIDE_HEALTH_URL"))?;
        let endpoint = Url::parse(&raw)
            .map_err(|_| ConfigError::InvalidConfig(format!("invalid health url `{raw}`")))?;
        Self::new(endpoint).map_err(|err| ConfigError::InvalidConfig(err.to_string()))
    }

    /// Ask the health endpoint to judge the supplied bearer token.
    pub async fn check(&self, access_token: &str) -> Result<HealthReport, ProbeError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let report = response.json::<HealthReport>().await?;
            debug!(target: "auth.probe", status = report.status.as_str(), "health check passed");
            return Ok(report);
        }

        let body = response.text().await.unwrap_or_default();
        let report = serde_json::from_str::<HealthReport>(&body).unwrap_or_else(|_| HealthReport {
            status: status.to_string(),
            message: if body.is_empty() { None } else { Some(body) },
            action: None,
        });
        Err(ProbeError::Rejected {
            status: status.as_u16(),
            report,
        })
    }
}
