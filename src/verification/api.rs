//! Delegates the deliverability question to a remote HTTP verification service.

use super::Probe;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::CandidateEmail;
use crate::utils::smtp::{IndeterminateReason, ProbeOutcome};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

/// Body returned by the verification service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiVerdict {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) fn outcome_from_api(status: StatusCode, verdict: Option<ApiVerdict>) -> ProbeOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return ProbeOutcome::indeterminate(
            IndeterminateReason::Network,
            format!("Verification API unavailable: HTTP {}", status),
        );
    }
    if !status.is_success() {
        return ProbeOutcome::indeterminate(
            IndeterminateReason::Ambiguous,
            format!("Verification API refused request: HTTP {}", status),
        );
    }
    let Some(verdict) = verdict else {
        return ProbeOutcome::indeterminate(
            IndeterminateReason::Ambiguous,
            "Verification API returned an unreadable body",
        );
    };

    let detail = verdict.reason.clone().unwrap_or_default();
    match verdict.status.to_ascii_lowercase().as_str() {
        "valid" | "deliverable" => ProbeOutcome::accepted(format!("API: valid {}", detail)),
        "catch_all" | "accept_all" => ProbeOutcome::Accepted {
            catch_all: true,
            message: format!("API: catch-all {}", detail),
        },
        "invalid" | "undeliverable" => {
            ProbeOutcome::rejected(None, format!("API: invalid {}", detail))
        }
        other => ProbeOutcome::indeterminate(
            IndeterminateReason::Ambiguous,
            format!("API: {} {}", other, detail),
        ),
    }
}

/// Probe backed by a JSON verification API (`GET {endpoint}?email=...`).
pub struct ApiProbe {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl ApiProbe {
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = config
            .api_endpoint
            .as_deref()
            .ok_or_else(|| AppError::Config("api_endpoint is required for the api backend".to_string()))?;
        let endpoint = Url::parse(endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(target: "verify_task", "{} is not set; calling verification API without a key", config.api_key_env);
        }

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub(crate) fn request_url(&self, email: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("email", email);
        url
    }
}

#[async_trait]
impl Probe for ApiProbe {
    fn name(&self) -> &'static str {
        "api"
    }

    fn needs_mail_hosts(&self) -> bool {
        false
    }

    async fn probe(&self, _domain: &str, _host: &str, candidate: &CandidateEmail) -> ProbeOutcome {
        let mut request = self.client.get(self.request_url(&candidate.address));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "verify_task", "Verification API call for <{}> failed: {}", candidate, e);
                let reason = if e.is_timeout() {
                    IndeterminateReason::Timeout
                } else {
                    IndeterminateReason::Network
                };
                return ProbeOutcome::indeterminate(reason, e.to_string());
            }
        };

        let status = response.status();
        let verdict = if status.is_success() {
            response.json::<ApiVerdict>().await.ok()
        } else {
            None
        };
        outcome_from_api(status, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(status: &str) -> Option<ApiVerdict> {
        Some(ApiVerdict {
            status: status.to_string(),
            reason: None,
        })
    }

    #[test]
    fn maps_service_statuses() {
        assert!(outcome_from_api(StatusCode::OK, verdict("valid")).is_accepted());
        assert!(matches!(
            outcome_from_api(StatusCode::OK, verdict("catch_all")),
            ProbeOutcome::Accepted { catch_all: true, .. }
        ));
        assert!(matches!(
            outcome_from_api(StatusCode::OK, verdict("invalid")),
            ProbeOutcome::Rejected { .. }
        ));
        assert!(matches!(
            outcome_from_api(StatusCode::OK, verdict("unknown")),
            ProbeOutcome::Indeterminate { reason: IndeterminateReason::Ambiguous, .. }
        ));
    }

    #[test]
    fn throttling_and_outages_are_retryable() {
        assert!(outcome_from_api(StatusCode::TOO_MANY_REQUESTS, None).should_retry());
        assert!(outcome_from_api(StatusCode::BAD_GATEWAY, None).should_retry());
        assert!(!outcome_from_api(StatusCode::UNAUTHORIZED, None).should_retry());
        assert!(!outcome_from_api(StatusCode::OK, None).should_retry());
    }

    #[test]
    fn request_url_carries_the_address() {
        let config = Config {
            api_endpoint: Some("https://verify.example/v1/check?format=json".to_string()),
            ..Config::default()
        };
        let probe = ApiProbe::from_config(&config).unwrap();
        assert_eq!(
            probe.request_url("jane.doe@acme.com").as_str(),
            "https://verify.example/v1/check?format=json&email=jane.doe%40acme.com"
        );
    }
}
