//! HTTP client for the integration gateway.
//!
//! Every action is a POST to
//! `{base_url}/connections/{provider}/actions/{action}/run` authenticated
//! with the connection's bearer token.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::response::{parse_ack, parse_failure, parse_mutation, parse_records};
use crate::traits::ProviderActions;
use crate::types::{EntityKind, ExternalRecord, ProviderKind};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.integration.app";
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Configuration for a gateway connection.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Provider this connection talks to.
    pub provider: ProviderKind,
    /// Gateway base URL.
    pub base_url: String,
    /// Bearer token for this connection.
    pub access_token: String,
    /// Per-call timeout. Expiry surfaces as a network error.
    pub call_timeout: Duration,
}

impl GatewayConfig {
    /// Create a configuration with default base URL and timeout.
    #[must_use]
    pub fn new(provider: ProviderKind, access_token: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: access_token.into(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    /// Override the gateway base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Gateway-backed implementation of [`ProviderActions`].
pub struct GatewayClient {
    config: GatewayConfig,
    client: Client,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("provider", &self.config.provider)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl GatewayClient {
    /// Create a new client.
    pub fn new(config: GatewayConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.call_timeout)
            .connect_timeout(config.call_timeout)
            .build()
            .map_err(|e| ProviderError::network_with_source("failed to build HTTP client", e))?;

        Ok(Self { config, client })
    }

    fn action_url(&self, action: &str) -> String {
        format!(
            "{}/connections/{}/actions/{}/run",
            self.config.base_url,
            self.config.provider.as_str(),
            action
        )
    }

    /// POST a payload to an action and return (status, parsed body).
    async fn run_action(&self, action: &str, payload: &Value) -> ProviderResult<(u16, Value)> {
        let url = self.action_url(action);
        debug!(action = %action, "Running gateway action");

        let request = self
            .client
            .post(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.access_token),
            )
            .json(payload)
            .send();

        let response = tokio::time::timeout(self.config.call_timeout, request)
            .await
            .map_err(|_| {
                ProviderError::network(format!(
                    "action {action} timed out after {:?}",
                    self.config.call_timeout
                ))
            })?
            .map_err(|e| {
                ProviderError::network_with_source(format!("action {action} failed"), e)
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(action = %action, status = %status, "Gateway rejected credentials");
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::network_with_source("failed to read response body", e))?;

        Ok((status.as_u16(), body))
    }
}

#[async_trait]
impl ProviderActions for GatewayClient {
    fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    #[instrument(skip(self, payload), fields(provider = %self.config.provider))]
    async fn create(&self, kind: EntityKind, payload: &Value) -> ProviderResult<String> {
        let (status, body) = self.run_action(kind.create_action(), payload).await?;
        parse_mutation(status, &body)
    }

    #[instrument(skip(self, payload), fields(provider = %self.config.provider))]
    async fn update(
        &self,
        kind: EntityKind,
        external_id: &str,
        payload: &Value,
    ) -> ProviderResult<()> {
        // The update action takes the record id inside the payload.
        let mut payload = payload.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("id".to_string(), Value::String(external_id.to_string()));
        }
        let (status, body) = self.run_action(kind.update_action(), &payload).await?;
        parse_ack(status, &body)
    }

    #[instrument(skip(self), fields(provider = %self.config.provider))]
    async fn delete(&self, kind: EntityKind, external_id: &str) -> ProviderResult<()> {
        let payload = serde_json::json!({ "id": external_id });
        let (status, body) = self.run_action(kind.delete_action(), &payload).await?;
        parse_ack(status, &body)
    }

    #[instrument(skip(self), fields(provider = %self.config.provider))]
    async fn fetch_all(&self, kind: EntityKind) -> ProviderResult<Vec<ExternalRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        // Follow the gateway's cursor until the set is complete. Drift
        // detection requires the full set, so a failed page fails the fetch.
        loop {
            let payload = match &cursor {
                Some(c) => serde_json::json!({ "cursor": c }),
                None => serde_json::json!({}),
            };
            let (status, body) = self.run_action(kind.fetch_action(), &payload).await?;
            if status != 200 {
                return Err(parse_failure(status, &body));
            }

            records.extend(parse_records(&body)?);

            cursor = body
                .get("output")
                .and_then(|o| o.get("cursor"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_url() {
        let client = GatewayClient::new(
            GatewayConfig::new(ProviderKind::Salesforce, "tok").with_base_url("https://gw.test"),
        )
        .unwrap();

        assert_eq!(
            client.action_url(EntityKind::Contact.create_action()),
            "https://gw.test/connections/salesforce/actions/create-contact/run"
        );
        assert_eq!(
            client.action_url(EntityKind::Account.fetch_action()),
            "https://gw.test/connections/salesforce/actions/get-all-accounts/run"
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::new(ProviderKind::Hubspot, "tok");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            config.call_timeout,
            Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)
        );
    }
}
