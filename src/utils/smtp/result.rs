// src/utils/smtp/result.rs
//! Defines the result type for a single deliverability probe.

/// Why a probe could not give a yes/no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndeterminateReason {
    /// Connect or read timed out.
    Timeout,
    /// The host could not be reached.
    Network,
    /// The host dropped the session mid-conversation.
    Disconnected,
    /// 4xx reply, typically greylisting or rate limiting.
    Greylisted,
    /// The host answered but refuses to confirm either way (policy blocks, VRFY-style refusals).
    Ambiguous,
}

impl IndeterminateReason {
    /// Suggests if retrying might yield a different result.
    pub fn should_retry(self) -> bool {
        !matches!(self, IndeterminateReason::Ambiguous)
    }

    /// The pooled session must not be reused after this failure.
    pub fn breaks_session(self) -> bool {
        matches!(
            self,
            IndeterminateReason::Timeout | IndeterminateReason::Disconnected
        )
    }
}

/// Represents the outcome of one recipient check against one mail host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The host positively accepted the recipient.
    Accepted {
        /// The host also accepted a random, surely non-existent recipient.
        catch_all: bool,
        message: String,
    },
    /// The host refused the recipient.
    Rejected { code: Option<u16>, message: String },
    /// No conclusion. Never proof that the address does not exist.
    Indeterminate {
        reason: IndeterminateReason,
        message: String,
    },
}

impl ProbeOutcome {
    pub fn accepted(message: impl Into<String>) -> Self {
        ProbeOutcome::Accepted {
            catch_all: false,
            message: message.into(),
        }
    }

    pub fn rejected(code: Option<u16>, message: impl Into<String>) -> Self {
        ProbeOutcome::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn indeterminate(reason: IndeterminateReason, message: impl Into<String>) -> Self {
        ProbeOutcome::Indeterminate {
            reason,
            message: message.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ProbeOutcome::Accepted { .. })
    }

    /// Transient failures are retried with backoff; clean answers are not.
    pub fn should_retry(&self) -> bool {
        match self {
            ProbeOutcome::Indeterminate { reason, .. } => reason.should_retry(),
            _ => false,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProbeOutcome::Accepted { message, .. }
            | ProbeOutcome::Rejected { message, .. }
            | ProbeOutcome::Indeterminate { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_indeterminates_retry() {
        assert!(!ProbeOutcome::accepted("250 ok").should_retry());
        assert!(!ProbeOutcome::rejected(Some(550), "user unknown").should_retry());
        assert!(ProbeOutcome::indeterminate(IndeterminateReason::Greylisted, "451").should_retry());
        assert!(ProbeOutcome::indeterminate(IndeterminateReason::Disconnected, "eof").should_retry());
        assert!(!ProbeOutcome::indeterminate(IndeterminateReason::Ambiguous, "252").should_retry());
    }

    #[test]
    fn broken_sessions() {
        assert!(IndeterminateReason::Disconnected.breaks_session());
        assert!(IndeterminateReason::Timeout.breaks_session());
        assert!(!IndeterminateReason::Greylisted.breaks_session());
    }
}
