//! Single RCPT TO deliverability check against one mail host, over pooled sessions.

use super::pool::ConnectionPool;
use super::result::{IndeterminateReason, ProbeOutcome};
use super::session::{RecipientReply, SmtpReply};
use crate::core::error::{AppError, Result};
use lettre::Address;
use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;

/// 5xx replies carrying these phrases are policy blocks aimed at us, not verdicts on the mailbox.
const POLICY_PHRASES: &[&str] = &[
    "blocked",
    "blacklist",
    "blocklist",
    "spamhaus",
    "spam",
    "policy",
    "reputation",
    "denied",
    "not allowed",
    "access denied",
    "relay",
    "5.7.",
];

/// Classifies the RCPT TO reply without regard to catch-all status.
pub(crate) fn classify_recipient_reply(reply: &SmtpReply) -> ProbeOutcome {
    if reply.is_positive() {
        return ProbeOutcome::accepted(format!("SMTP Verification OK: {}", reply));
    }
    if reply.is_transient() {
        return ProbeOutcome::indeterminate(
            IndeterminateReason::Greylisted,
            format!("SMTP Temp Failure/Greylisted? (4xx): {}", reply),
        );
    }
    if reply.is_permanent() {
        let lower = reply.message.to_lowercase();
        if POLICY_PHRASES.iter().any(|p| lower.contains(p)) {
            return ProbeOutcome::indeterminate(
                IndeterminateReason::Ambiguous,
                format!("SMTP Rejected (Policy): {}", reply),
            );
        }
        return ProbeOutcome::rejected(
            Some(reply.code),
            format!("SMTP Rejected (User Likely Unknown): {}", reply),
        );
    }
    ProbeOutcome::indeterminate(
        IndeterminateReason::Ambiguous,
        format!("SMTP Unexpected Code: {}", reply),
    )
}

fn outcome_from_error(err: &AppError) -> ProbeOutcome {
    match err {
        AppError::ProtocolDisconnect(msg) => {
            ProbeOutcome::indeterminate(IndeterminateReason::Disconnected, msg.clone())
        }
        AppError::Timeout(_) => ProbeOutcome::indeterminate(IndeterminateReason::Timeout, err.to_string()),
        e if e.is_transient() => {
            ProbeOutcome::indeterminate(IndeterminateReason::Network, e.to_string())
        }
        e => ProbeOutcome::indeterminate(IndeterminateReason::Ambiguous, e.to_string()),
    }
}

/// Asks mail hosts whether they would accept a recipient, without sending a message.
pub struct SmtpProbe {
    pool: Arc<ConnectionPool>,
    sender: Address,
    detect_catch_all: bool,
}

impl SmtpProbe {
    pub fn new(pool: Arc<ConnectionPool>, sender_email: &str, detect_catch_all: bool) -> Result<Self> {
        let sender = Address::from_str(sender_email)
            .map_err(|e| AppError::Config(format!("Invalid sender email in config: {}", e)))?;
        Ok(Self {
            pool,
            sender,
            detect_catch_all,
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    fn random_recipient(domain: &str) -> Option<Address> {
        let mut rng = rand::thread_rng();
        let local = format!(
            "no-reply-does-not-exist-{}-{:x}",
            rng.gen_range(10000..99999),
            rng.gen::<u32>()
        );
        Address::from_str(&format!("{}@{}", local, domain)).ok()
    }

    /// Runs one check of `recipient` against `host`, a mail exchanger for `domain`.
    pub async fn check(&self, domain: &str, host: &str, recipient: &str) -> ProbeOutcome {
        let recipient_address = match Address::from_str(recipient) {
            Ok(addr) => addr,
            Err(e) => {
                return ProbeOutcome::indeterminate(
                    IndeterminateReason::Ambiguous,
                    format!("Invalid recipient '{}': {}", recipient, e),
                )
            }
        };

        let mut pooled = match self.pool.acquire(domain, host).await {
            Ok(pooled) => pooled,
            Err(e) => {
                tracing::warn!(target: "smtp_task", "Could not open session to {} for <{}>: {}", host, recipient, e);
                return outcome_from_error(&e);
            }
        };

        let reply = pooled
            .session()
            .check_recipient(&self.sender, &recipient_address)
            .await;

        let outcome = match reply {
            Err(e) => {
                tracing::warn!(target: "smtp_task", "Session to {} failed while checking <{}>: {}", host, recipient, e);
                let outcome = outcome_from_error(&e);
                match outcome {
                    ProbeOutcome::Indeterminate { reason, .. } if !reason.breaks_session() => {
                        self.pool.release(pooled).await
                    }
                    _ => self.pool.invalidate(pooled).await,
                }
                return outcome;
            }
            Ok(RecipientReply::SenderRefused(reply)) if reply.is_transient() => {
                ProbeOutcome::indeterminate(
                    IndeterminateReason::Greylisted,
                    format!("MAIL FROM deferred: {}", reply),
                )
            }
            Ok(RecipientReply::SenderRefused(reply)) => ProbeOutcome::indeterminate(
                IndeterminateReason::Ambiguous,
                format!("MAIL FROM rejected: {}", reply),
            ),
            Ok(RecipientReply::Recipient(reply)) => classify_recipient_reply(&reply),
        };

        let outcome = match outcome {
            ProbeOutcome::Accepted { message, .. } if self.detect_catch_all => {
                let catch_all = self.probe_catch_all(domain, host, &mut pooled).await;
                ProbeOutcome::Accepted { catch_all, message }
            }
            other => other,
        };

        self.pool.release(pooled).await;
        outcome
    }

    /// Sends RCPT TO for a random address on the same session. Acceptance means catch-all.
    async fn probe_catch_all(
        &self,
        domain: &str,
        host: &str,
        pooled: &mut super::pool::PooledSession,
    ) -> bool {
        let Some(random) = Self::random_recipient(domain) else {
            return false;
        };
        tracing::debug!(target: "smtp_task", "Performing catch-all check with RCPT TO:<{}> on {}", random, host);
        match pooled.session().check_recipient(&self.sender, &random).await {
            Ok(RecipientReply::Recipient(reply)) if reply.is_positive() => {
                tracing::warn!(target: "smtp_task",
                    "Domain {} (MX: {}) appears to be a catch-all (accepted random user {})",
                    domain, host, random
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(target: "smtp_task", "Error during catch-all check on {} (ignoring): {}", host, e);
                false
            }
        }
    }
}
