//! Trusted time.
//!
//! Attestation timestamps come from an authenticated time service, never
//! from the host's wall clock: the host is outside the trust boundary and
//! could skew freshness checks at will.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::HostError;

#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Current time as unsigned unix seconds.
    async fn unix_now(&self) -> Result<u64, HostError>;
}

#[derive(Debug, Deserialize)]
struct TimeServiceResponse {
    /// Midpoint of the service's signed time interval, unix seconds.
    midpoint: u64,
    #[serde(default)]
    radius: u64,
}

/// Client for a roughtime-class HTTP gateway.
pub struct AuthenticatedTimeClient {
    client: reqwest::Client,
    url: String,
}

impl AuthenticatedTimeClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl TimeSource for AuthenticatedTimeClient {
    async fn unix_now(&self) -> Result<u64, HostError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| HostError::TrustedTime(e.to_string()))?;
        if !response.status().is_success() {
            return Err(HostError::TrustedTime(format!(
                "time service returned status {}",
                response.status().as_u16()
            )));
        }
        let time: TimeServiceResponse = response
            .json()
            .await
            .map_err(|e| HostError::TrustedTime(e.to_string()))?;
        debug!(midpoint = time.midpoint, radius = time.radius, "trusted time acquired");
        Ok(time.midpoint)
    }
}

/// Pinned time for tests.
#[cfg(test)]
pub struct FixedTime(pub u64);

#[cfg(test)]
#[async_trait]
impl TimeSource for FixedTime {
    async fn unix_now(&self) -> Result<u64, HostError> {
        Ok(self.0)
    }
}
