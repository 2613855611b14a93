//! Drives a probe across a domain's mail hosts with bounded retries.

use super::retry::{RetryMachine, RetryPolicy, RetryState};
use super::Probe;
use crate::core::config::Config;
use crate::core::models::{CandidateEmail, VerificationResult};
use crate::utils::dns::MxResolver;
use crate::utils::smtp::{IndeterminateReason, ProbeOutcome};
use chrono::Utc;
use std::sync::Arc;

/// Result of resolving a domain's mail hosts for a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailHosts {
    Hosts(Vec<String>),
    /// Authoritative answer: the domain accepts no mail.
    NoMailInfrastructure,
    /// Resolution kept failing transiently.
    Unresolvable(String),
}

struct HostAttempt {
    outcome: ProbeOutcome,
    exhausted: bool,
}

/// Verifies candidates against mail hosts in priority order.
#[derive(Clone)]
pub struct Verifier {
    probe: Arc<dyn Probe>,
    policy: RetryPolicy,
}

impl Verifier {
    pub fn new(probe: Arc<dyn Probe>, policy: RetryPolicy) -> Self {
        Self { probe, policy }
    }

    pub fn from_config(probe: Arc<dyn Probe>, config: &Config) -> Self {
        Self::new(
            probe,
            RetryPolicy::new(config.max_verification_attempts, config.retry_base_delay),
        )
    }

    pub fn probe(&self) -> &Arc<dyn Probe> {
        &self.probe
    }

    /// Resolves mail hosts, retrying transient resolver failures under the same policy.
    pub async fn resolve_hosts(&self, resolver: &MxResolver, domain: &str) -> MailHosts {
        let mut machine = RetryMachine::new(self.policy);
        let mut last_error = String::new();
        loop {
            match machine.state() {
                RetryState::Attempting { attempt } => match resolver.resolve(domain).await {
                    Ok(hosts) if hosts.is_empty() => return MailHosts::NoMailInfrastructure,
                    Ok(hosts) => return MailHosts::Hosts(hosts),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(target: "verify_task", "MX resolution attempt {} for {} failed: {}", attempt, domain, e);
                        last_error = e.to_string();
                        machine.fail();
                    }
                    Err(e) => {
                        tracing::error!(target: "verify_task", "MX resolution for {} failed permanently: {}", domain, e);
                        return MailHosts::Unresolvable(e.to_string());
                    }
                },
                RetryState::Backoff { delay, .. } => {
                    tokio::time::sleep(delay).await;
                    machine.resume();
                }
                RetryState::Retrying { .. } => {
                    machine.begin();
                }
                RetryState::GivenUp { attempts } => {
                    tracing::warn!(target: "verify_task", "Giving up resolving {} after {} attempts", domain, attempts);
                    return MailHosts::Unresolvable(last_error);
                }
            }
        }
    }

    async fn verify_on_host(&self, domain: &str, host: &str, candidate: &CandidateEmail) -> HostAttempt {
        let mut machine = RetryMachine::new(self.policy);
        let mut last = ProbeOutcome::indeterminate(IndeterminateReason::Ambiguous, "probe did not run");
        loop {
            match machine.state() {
                RetryState::Attempting { attempt } => {
                    tracing::debug!(target: "verify_task",
                        "Attempt {}/{} to verify <{}> via {}",
                        attempt, self.policy.max_attempts, candidate, host
                    );
                    last = self.probe.probe(domain, host, candidate).await;
                    if !last.should_retry() {
                        return HostAttempt {
                            outcome: last,
                            exhausted: false,
                        };
                    }
                    tracing::warn!(target: "verify_task",
                        "Check for <{}> on {} inconclusive on attempt {}: {}",
                        candidate, host, attempt, last.message()
                    );
                    machine.fail();
                }
                RetryState::Backoff { delay, .. } => {
                    tracing::debug!(target: "verify_task", "Sleeping {:?} before next attempt for <{}>", delay, candidate);
                    tokio::time::sleep(delay).await;
                    machine.resume();
                }
                RetryState::Retrying { .. } => {
                    machine.begin();
                }
                RetryState::GivenUp { attempts } => {
                    tracing::warn!(target: "verify_task", "Exhausted {} attempts for <{}> on {}", attempts, candidate, host);
                    return HostAttempt {
                        outcome: last,
                        exhausted: true,
                    };
                }
            }
        }
    }

    /// Verifies one candidate, trying `hosts` in order and stopping at the first acceptance.
    ///
    /// Anything short of a positive reply yields `accepted = false`, which
    /// means "could not confirm", never "does not exist".
    pub async fn verify(&self, domain: &str, hosts: &[String], candidate: &CandidateEmail) -> VerificationResult {
        let api_target = [self.probe.name().to_string()];
        let targets: &[String] = if self.probe.needs_mail_hosts() {
            hosts
        } else {
            &api_target
        };

        let mut exhausted_retries = false;
        let mut message = if targets.is_empty() {
            "No mail hosts to probe".to_string()
        } else {
            String::new()
        };

        for host in targets {
            let attempt = self.verify_on_host(domain, host, candidate).await;
            exhausted_retries |= attempt.exhausted;
            match attempt.outcome {
                ProbeOutcome::Accepted {
                    catch_all,
                    message: accepted_message,
                } => {
                    tracing::info!(target: "verify_task", "<{}> accepted by {} (catch-all: {})", candidate, host, catch_all);
                    return VerificationResult {
                        candidate: candidate.clone(),
                        accepted: true,
                        exhausted_retries,
                        catch_all,
                        accepted_by: Some(host.clone()),
                        message: accepted_message,
                        checked_at: Utc::now(),
                    };
                }
                other => {
                    tracing::debug!(target: "verify_task", "<{}> not confirmed by {}: {}", candidate, host, other.message());
                    message = other.message().to_string();
                }
            }
        }

        VerificationResult {
            candidate: candidate.clone(),
            accepted: false,
            exhausted_retries,
            catch_all: false,
            accepted_by: None,
            message,
            checked_at: Utc::now(),
        }
    }
}
