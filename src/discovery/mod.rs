//! Finds the most plausible, ideally verified, address for a person at a domain.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::{CandidateEmail, DiscoveryOutcome, Person, ScoredCandidate};
use crate::ranking::Ranker;
use crate::utils::dns::MxResolver;
use crate::utils::domain::normalize_domain;
use crate::utils::patterns::generate_candidates;
use crate::verification::{build_probe, MailHosts, Probe, Verifier};
use std::sync::Arc;

/// Steps of a single discovery run.
#[derive(Debug)]
enum DiscoveryState {
    Generate,
    ScoreOrStaticOrder(Vec<CandidateEmail>),
    VerifyLoop {
        ranked: Vec<ScoredCandidate>,
        hosts: Vec<String>,
    },
    Done(DiscoveryOutcome),
}

/// Releases the probe's per-domain resources when a run ends, however it ends.
struct RunScope<'a> {
    probe: &'a dyn Probe,
    domain: &'a str,
    finished: bool,
}

impl<'a> RunScope<'a> {
    fn new(probe: &'a dyn Probe, domain: &'a str) -> Self {
        probe.begin_domain(domain);
        Self {
            probe,
            domain,
            finished: false,
        }
    }

    async fn finish(mut self) {
        self.finished = true;
        self.probe.finish_domain(self.domain).await;
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(target: "discovery_task", "Run for {} abandoned; discarding sessions", self.domain);
            self.probe.abandon_domain(self.domain);
        }
    }
}

/// Entry point combining generation, ranking and verification.
///
/// Holds only shared collaborators, so one finder can serve many concurrent
/// person/domain runs.
#[derive(Clone)]
pub struct EmailFinder {
    resolver: Arc<MxResolver>,
    verifier: Verifier,
    ranker: Ranker,
    catch_all_counts_as_verified: bool,
}

impl EmailFinder {
    pub fn new(
        resolver: Arc<MxResolver>,
        verifier: Verifier,
        ranker: Ranker,
        catch_all_counts_as_verified: bool,
    ) -> Self {
        Self {
            resolver,
            verifier,
            ranker,
            catch_all_counts_as_verified,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = Arc::new(MxResolver::from_config(config)?);
        let probe = build_probe(config)?;
        let ranker = Ranker::from_config(config);
        tracing::info!(target: "discovery_task",
            "Using {} probe backend with {} ranking",
            probe.name(), if ranker.is_learned() { "learned" } else { "static" }
        );
        Ok(Self::new(
            resolver,
            Verifier::from_config(probe, config),
            ranker,
            config.catch_all_counts_as_verified,
        ))
    }

    /// Runs `GENERATE -> SCORE_OR_STATIC_ORDER -> VERIFY_LOOP -> DONE`.
    ///
    /// Only input errors (`InvalidName`, `DomainExtraction`) are returned;
    /// everything that goes wrong during verification ends as `verified: false`.
    pub async fn find_email(&self, person: &Person, domain_or_url: &str) -> Result<DiscoveryOutcome> {
        let full_name = person.full_name.as_str();
        let domain = normalize_domain(domain_or_url)?;
        let probe = self.verifier.probe().clone();
        let scope = RunScope::new(probe.as_ref(), &domain);

        let mut state = DiscoveryState::Generate;
        loop {
            state = match state {
                DiscoveryState::Generate => {
                    let candidates = generate_candidates(full_name, &domain)?;
                    tracing::debug!(target: "discovery_task",
                        "Generated {} candidates for '{}' at {}", candidates.len(), full_name, domain
                    );
                    DiscoveryState::ScoreOrStaticOrder(candidates)
                }
                DiscoveryState::ScoreOrStaticOrder(candidates) => {
                    let ranked = self.ranker.rank(candidates);
                    let top = ranked.first().map(|s| s.candidate.address.clone());

                    if !probe.needs_mail_hosts() {
                        DiscoveryState::VerifyLoop {
                            ranked,
                            hosts: Vec::new(),
                        }
                    } else {
                        match self.verifier.resolve_hosts(&self.resolver, &domain).await {
                            MailHosts::Hosts(hosts) => DiscoveryState::VerifyLoop { ranked, hosts },
                            MailHosts::NoMailInfrastructure => {
                                let reason = AppError::NoMailInfrastructure(domain.clone());
                                tracing::warn!(target: "discovery_task", "{}; reporting unverified", reason);
                                DiscoveryState::Done(DiscoveryOutcome::unverified(top))
                            }
                            MailHosts::Unresolvable(reason) => {
                                tracing::warn!(target: "discovery_task", "Could not resolve mail hosts for {}: {}", domain, reason);
                                DiscoveryState::Done(DiscoveryOutcome::unverified(top))
                            }
                        }
                    }
                }
                DiscoveryState::VerifyLoop { ranked, hosts } => {
                    DiscoveryState::Done(self.verify_ranked(&domain, &hosts, &ranked).await)
                }
                DiscoveryState::Done(outcome) => {
                    scope.finish().await;
                    tracing::info!(target: "discovery_task",
                        "'{}' at {}: {} (verified: {})",
                        full_name, domain, outcome.email.as_deref().unwrap_or("<none>"), outcome.verified
                    );
                    return Ok(outcome);
                }
            };
        }
    }

    /// Tries candidates in ranked order, stopping at the first acceptance.
    async fn verify_ranked(&self, domain: &str, hosts: &[String], ranked: &[ScoredCandidate]) -> DiscoveryOutcome {
        let top = ranked.first().map(|s| s.candidate.address.clone());

        for scored in ranked {
            let result = self.verifier.verify(domain, hosts, &scored.candidate).await;
            if !result.accepted {
                continue;
            }
            if result.catch_all {
                tracing::info!(target: "discovery_task",
                    "{} accepts every recipient; reporting top-ranked candidate", domain
                );
                return DiscoveryOutcome {
                    email: top,
                    verified: self.catch_all_counts_as_verified,
                };
            }
            return DiscoveryOutcome {
                email: Some(result.candidate.address),
                verified: true,
            };
        }

        tracing::info!(target: "discovery_task", "No candidate confirmed for {}", domain);
        DiscoveryOutcome::unverified(top)
    }
}
