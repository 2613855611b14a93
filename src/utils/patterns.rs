//! Candidate email generation from a person's name and a company domain.

use crate::core::error::{AppError, Result};
use crate::core::models::{CandidateEmail, PatternRule};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static LOCAL_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").unwrap());

/// Lower-cases a name token and folds it to ASCII alphanumerics.
///
/// Accents are removed by canonical decomposition. Letters with no
/// decomposition get their usual transliteration.
fn fold_token(token: &str) -> String {
    let mut folded = String::with_capacity(token.len());
    for c in token.to_lowercase().nfkd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ß' => folded.push_str("ss"),
            'æ' => folded.push_str("ae"),
            'œ' => folded.push_str("oe"),
            'þ' => folded.push_str("th"),
            'ø' => folded.push('o'),
            'đ' | 'ð' => folded.push('d'),
            'ł' => folded.push('l'),
            'ı' => folded.push('i'),
            c => folded.push(c),
        }
    }
    NON_ALNUM.replace_all(&folded, "").into_owned()
}

/// First and last name tokens, folded to lower-case ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub first: String,
    pub last: String,
}

impl NameParts {
    /// Splits a full name on whitespace. Middle names are ignored.
    pub fn parse(full_name: &str) -> Result<Self> {
        let tokens: Vec<String> = full_name
            .split_whitespace()
            .map(fold_token)
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.len() < 2 {
            tracing::debug!(target: "discovery_task", "Name '{}' does not have enough parts to generate patterns", full_name);
            return Err(AppError::InvalidName(full_name.to_string()));
        }

        Ok(Self {
            first: tokens[0].clone(),
            last: tokens[tokens.len() - 1].clone(),
        })
    }

    fn first_initial(&self) -> &str {
        &self.first[..1]
    }

    fn last_initial(&self) -> &str {
        &self.last[..1]
    }
}

/// Templates in static plausibility order, most common conventions first.
fn local_parts(n: &NameParts) -> Vec<(PatternRule, String)> {
    let (f, l) = (n.first.as_str(), n.last.as_str());
    let (fi, li) = (n.first_initial(), n.last_initial());
    use PatternRule::*;
    vec![
        (FirstDotLast, format!("{f}.{l}")),
        (FirstLast, format!("{f}{l}")),
        (InitialLast, format!("{fi}{l}")),
        (First, f.to_string()),
        (Last, l.to_string()),
        (InitialDotLast, format!("{fi}.{l}")),
        (FirstUnderscoreLast, format!("{f}_{l}")),
        (FirstHyphenLast, format!("{f}-{l}")),
        (InitialUnderscoreLast, format!("{fi}_{l}")),
        (InitialHyphenLast, format!("{fi}-{l}")),
        (Initials, format!("{fi}{li}")),
        (FirstDotInitial, format!("{f}.{li}")),
        (FirstInitial, format!("{f}{li}")),
        (FirstUnderscoreInitial, format!("{f}_{li}")),
        (FirstHyphenInitial, format!("{f}-{li}")),
        (LastDotFirst, format!("{l}.{f}")),
        (LastFirst, format!("{l}{f}")),
        (LastUnderscoreFirst, format!("{l}_{f}")),
        (LastHyphenFirst, format!("{l}-{f}")),
        (MailFirstDotLast, format!("{f}.{l}")),
        (MailFirstLast, format!("{f}{l}")),
        (MailFirst, f.to_string()),
        (MailFirstUnderscoreLast, format!("{f}_{l}")),
        (MailFirstDotInitial, format!("{f}.{li}")),
        (MailInitialUnderscoreLast, format!("{fi}_{l}")),
        (MailInitials, format!("{fi}{li}")),
    ]
}

/// Generates the ordered, duplicate-free candidate list for `full_name` at `domain`.
///
/// `domain` is expected to be normalized already. The order is the static
/// prior used when no ranking model is available. Names with fewer than two
/// usable tokens fail with [`AppError::InvalidName`].
pub fn generate_candidates(full_name: &str, domain: &str) -> Result<Vec<CandidateEmail>> {
    let parts = NameParts::parse(full_name)?;
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for (rule, local) in local_parts(&parts) {
        debug_assert!(LOCAL_PART.is_match(&local), "bad local part {local}");
        if !LOCAL_PART.is_match(&local) {
            continue;
        }
        let address = if rule.uses_mail_subdomain() {
            format!("{}@mail.{}", local, domain)
        } else {
            format!("{}@{}", local, domain)
        };
        if seen.insert(address.clone()) {
            candidates.push(CandidateEmail { address, rule });
        }
    }

    Ok(candidates)
}
