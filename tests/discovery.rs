use async_trait::async_trait;
use lead_sleuth_core::utils::dns::{MailExchanger, MxLookup, MxResolver};
use lead_sleuth_core::utils::smtp::{IndeterminateReason, ProbeOutcome};
use lead_sleuth_core::verification::RetryPolicy;
use lead_sleuth_core::{
    AppError, CandidateEmail, EmailFinder, PatternRule, Person, Probe, Ranker, Result, Scorer,
    Verifier,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Directory {
    mx: HashMap<String, Vec<MailExchanger>>,
}

#[async_trait]
impl MxLookup for Directory {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailExchanger>> {
        Ok(self.mx.get(domain).cloned().unwrap_or_default())
    }
}

/// Primary host greylists everything; the backup knows the real mailboxes.
struct Mailboxes {
    known: Vec<String>,
    log: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Probe for Mailboxes {
    fn name(&self) -> &'static str {
        "mailboxes"
    }

    async fn probe(&self, _domain: &str, host: &str, candidate: &CandidateEmail) -> ProbeOutcome {
        self.log.lock().push((host.to_string(), candidate.address.clone()));
        if host.starts_with("primary") {
            return ProbeOutcome::indeterminate(IndeterminateReason::Greylisted, "451 try later");
        }
        if self.known.contains(&candidate.address) {
            ProbeOutcome::accepted("250 2.1.5 ok")
        } else {
            ProbeOutcome::rejected(Some(550), "5.1.1 user unknown")
        }
    }
}

/// Prefers initial+last addresses.
struct InitialLastFirst;

impl Scorer for InitialLastFirst {
    fn score(&self, candidate: &str) -> f64 {
        if candidate.starts_with("jdoe@") {
            0.9
        } else {
            0.2
        }
    }

    fn version(&self) -> &str {
        "test"
    }
}

fn resolver() -> Arc<MxResolver> {
    let mut mx = HashMap::new();
    mx.insert(
        "acme.co.uk".to_string(),
        vec![
            MailExchanger {
                host: "backup.acme.co.uk".to_string(),
                preference: 20,
            },
            MailExchanger {
                host: "primary.acme.co.uk".to_string(),
                preference: 10,
            },
        ],
    );
    Arc::new(MxResolver::new(Arc::new(Directory { mx }), Duration::from_secs(60)))
}

fn mailboxes(known: &[&str]) -> Arc<Mailboxes> {
    Arc::new(Mailboxes {
        known: known.iter().map(|s| s.to_string()).collect(),
        log: Mutex::new(Vec::new()),
    })
}

fn finder(probe: Arc<Mailboxes>, ranker: Ranker) -> EmailFinder {
    EmailFinder::new(
        resolver(),
        Verifier::new(probe, RetryPolicy::new(3, Duration::from_millis(1))),
        ranker,
        false,
    )
}

#[tokio::test]
async fn falls_through_greylisting_to_the_backup_host() {
    let probe = mailboxes(&["jane.doe@acme.co.uk"]);
    let outcome = finder(probe.clone(), Ranker::static_order())
        .find_email(&Person::new("Jane  Doe"), "https://careers.acme.co.uk/openings")
        .await
        .unwrap();

    assert_eq!(outcome.email.as_deref(), Some("jane.doe@acme.co.uk"));
    assert!(outcome.verified);

    let log = probe.log.lock().clone();
    let primary_attempts = log.iter().filter(|(h, _)| h == "primary.acme.co.uk").count();
    assert_eq!(primary_attempts, 3);
    assert_eq!(log[0].0, "primary.acme.co.uk");
    assert_eq!(log.last().map(|(h, _)| h.as_str()), Some("backup.acme.co.uk"));
}

#[tokio::test]
async fn learned_ranking_changes_probe_order() {
    let probe = mailboxes(&["jdoe@acme.co.uk", "jane.doe@acme.co.uk"]);
    let ranker = Ranker::with_scorer(Arc::new(InitialLastFirst), None);
    let outcome = finder(probe.clone(), ranker)
        .find_email(&Person::new("Jane Doe"), "acme.co.uk")
        .await
        .unwrap();

    assert_eq!(outcome.email.as_deref(), Some("jdoe@acme.co.uk"));
    assert!(outcome.verified);
    assert!(probe.log.lock().iter().all(|(_, a)| a == "jdoe@acme.co.uk"));
}

#[tokio::test]
async fn unknown_mailbox_is_unverified_not_an_error() {
    let probe = mailboxes(&[]);
    let outcome = finder(probe, Ranker::static_order())
        .find_email(&Person::new("Jane Doe"), "acme.co.uk")
        .await
        .unwrap();
    assert_eq!(outcome.email.as_deref(), Some("jane.doe@acme.co.uk"));
    assert!(!outcome.verified);
}

#[tokio::test]
async fn single_token_names_are_rejected() {
    let err = finder(mailboxes(&[]), Ranker::static_order())
        .find_email(&Person::new("Madonna"), "acme.co.uk")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidName(_)));
}

#[test]
fn generator_scenario() {
    let candidates = lead_sleuth_core::generate_candidates("Jane Doe", "acme.com").unwrap();
    for expected in ["jdoe@acme.com", "jane@acme.com", "doe@acme.com", "jane.doe@acme.com"] {
        assert_eq!(candidates.iter().filter(|c| c.address == expected).count(), 1);
    }
    assert_eq!(candidates[0].rule, PatternRule::FirstDotLast);
}
