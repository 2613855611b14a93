//! Core data types shared by generation, ranking, verification and discovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which naming template produced a candidate address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternRule {
    FirstDotLast,
    FirstLast,
    InitialLast,
    First,
    Last,
    InitialDotLast,
    FirstUnderscoreLast,
    FirstHyphenLast,
    InitialUnderscoreLast,
    InitialHyphenLast,
    Initials,
    FirstDotInitial,
    FirstInitial,
    FirstUnderscoreInitial,
    FirstHyphenInitial,
    LastDotFirst,
    LastFirst,
    LastUnderscoreFirst,
    LastHyphenFirst,
    MailFirstDotLast,
    MailFirstLast,
    MailFirst,
    MailFirstUnderscoreLast,
    MailFirstDotInitial,
    MailInitialUnderscoreLast,
    MailInitials,
}

impl PatternRule {
    /// True for templates that target the `mail.` subdomain.
    pub fn uses_mail_subdomain(self) -> bool {
        matches!(
            self,
            PatternRule::MailFirstDotLast
                | PatternRule::MailFirstLast
                | PatternRule::MailFirst
                | PatternRule::MailFirstUnderscoreLast
                | PatternRule::MailFirstDotInitial
                | PatternRule::MailInitialUnderscoreLast
                | PatternRule::MailInitials
        )
    }
}

/// A person whose address is being looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub full_name: String,
}

impl Person {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

/// A guessed `local@domain` address together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateEmail {
    pub address: String,
    pub rule: PatternRule,
}

impl fmt::Display for CandidateEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// A candidate annotated with the ranker's prior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: CandidateEmail,
    pub probability: f64,
}

/// Definitive outcome of verifying one candidate against one domain's mail hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub candidate: CandidateEmail,
    /// A mail host answered the recipient check positively.
    pub accepted: bool,
    /// At least one host was abandoned after using up every retry.
    pub exhausted_retries: bool,
    /// The accepting host also accepted a random address.
    pub catch_all: bool,
    /// Host that accepted, if any.
    pub accepted_by: Option<String>,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// Final answer for one person/domain pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    pub email: Option<String>,
    pub verified: bool,
}

impl DiscoveryOutcome {
    pub fn unverified(email: Option<String>) -> Self {
        Self {
            email,
            verified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mail_rules_target_the_subdomain() {
        assert!(PatternRule::MailFirstDotLast.uses_mail_subdomain());
        assert!(PatternRule::MailInitials.uses_mail_subdomain());
        assert!(!PatternRule::FirstDotLast.uses_mail_subdomain());
    }

    #[test]
    fn rule_serializes_as_snake_case() {
        let json = serde_json::to_string(&PatternRule::InitialDotLast).unwrap();
        assert_eq!(json, "\"initial_dot_last\"");
    }
}
