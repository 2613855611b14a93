//! Deliverability verification: probe strategies, retry policy, and the verifier.

pub mod api;
pub mod retry;
pub mod verifier;

pub use api::ApiProbe;
pub use retry::{RetryMachine, RetryPolicy, RetryState};
pub use verifier::{MailHosts, Verifier};

use crate::core::config::{Config, ProbeBackend};
use crate::core::error::Result;
use crate::core::models::CandidateEmail;
use crate::utils::smtp::{ConnectionPool, LettreConnector, ProbeOutcome, SmtpProbe};
use async_trait::async_trait;
use std::sync::Arc;

/// One way of asking "would this address receive mail".
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the probe talks to the domain's own mail exchangers.
    fn needs_mail_hosts(&self) -> bool {
        true
    }

    /// Checks `candidate` against `host`. Hosts are ignored by probes that
    /// do not need mail exchangers.
    async fn probe(&self, domain: &str, host: &str, candidate: &CandidateEmail) -> ProbeOutcome;

    /// Called when a run on `domain` starts. Each call is matched by exactly one
    /// `finish_domain` or `abandon_domain`.
    fn begin_domain(&self, _domain: &str) {}

    /// Gracefully releases per-domain resources once the last run on the domain completes.
    async fn finish_domain(&self, _domain: &str) {}

    /// Drops per-domain resources without awaiting; used when a run is abandoned.
    fn abandon_domain(&self, _domain: &str) {}
}

#[async_trait]
impl Probe for SmtpProbe {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn probe(&self, domain: &str, host: &str, candidate: &CandidateEmail) -> ProbeOutcome {
        self.check(domain, host, &candidate.address).await
    }

    fn begin_domain(&self, domain: &str) {
        self.pool().begin_domain(domain);
    }

    async fn finish_domain(&self, domain: &str) {
        self.pool().close_domain(domain).await;
    }

    fn abandon_domain(&self, domain: &str) {
        self.pool().discard_domain(domain);
    }
}

/// Builds the probe selected by `probe_backend`.
pub fn build_probe(config: &Config) -> Result<Arc<dyn Probe>> {
    match config.probe_backend {
        ProbeBackend::Smtp => {
            let pool = Arc::new(ConnectionPool::new(
                Arc::new(LettreConnector::from_config(config)),
                config.max_sessions_per_host,
            ));
            Ok(Arc::new(SmtpProbe::new(
                pool,
                &config.smtp_sender_email,
                config.detect_catch_all,
            )?))
        }
        ProbeBackend::Api => Ok(Arc::new(ApiProbe::from_config(config)?)),
    }
}
