//! Email discovery and verification for lead generation.
//!
//! Given a person's name and a company domain, generates candidate
//! addresses, orders them with an optional learned ranker, and confirms
//! deliverability with a protocol-level probe that never sends a message.

pub mod core;
pub mod discovery;
pub mod pipeline;
pub mod ranking;
pub mod utils;
pub mod verification;

pub use crate::core::config::{Config, ConfigBuilder, ProbeBackend};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    CandidateEmail, DiscoveryOutcome, PatternRule, Person, ScoredCandidate, VerificationResult,
};
pub use crate::discovery::EmailFinder;
pub use crate::ranking::{Ranker, Scorer};
pub use crate::utils::domain::normalize_domain;
pub use crate::utils::patterns::generate_candidates;
pub use crate::verification::{Probe, Verifier};
