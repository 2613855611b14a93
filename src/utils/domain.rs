//! Reduces company URLs and hosts to their registrable domain.

use crate::core::error::{AppError, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use url::{Host, Url};

/// Public suffixes spanning two labels. Anything else is treated as a single-label TLD.
static MULTI_LABEL_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "co.uk", "org.uk", "ac.uk", "gov.uk", "ltd.uk", "plc.uk", "me.uk", "net.uk", "sch.uk",
        "com.au", "net.au", "org.au", "edu.au", "gov.au", "asn.au", "id.au",
        "co.nz", "org.nz", "net.nz", "ac.nz", "govt.nz",
        "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
        "co.in", "net.in", "org.in", "firm.in", "gen.in", "ind.in", "ac.in", "gov.in",
        "com.br", "net.br", "org.br", "gov.br",
        "com.cn", "net.cn", "org.cn", "gov.cn",
        "com.mx", "org.mx", "gob.mx",
        "co.za", "org.za", "gov.za",
        "com.sg", "edu.sg", "gov.sg",
        "com.hk", "org.hk", "edu.hk",
        "co.kr", "or.kr", "ac.kr",
        "com.tr", "org.tr", "gen.tr",
        "com.ar", "com.co", "com.pk", "com.my", "com.ph", "com.vn", "com.tw", "com.sa",
        "com.eg", "com.ng", "com.ua", "co.il", "co.id", "co.th", "co.ke",
    ]
    .into_iter()
    .collect()
});

fn parse_host(input: &str) -> Result<String> {
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{}", input)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| AppError::DomainExtraction(format!("'{}' is not a valid URL: {}", input, e)))?;
    match url.host() {
        Some(Host::Domain(host)) => Ok(host.to_string()),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Err(AppError::DomainExtraction(format!(
            "'{}' is an IP address, not a domain",
            input
        ))),
        None => Err(AppError::DomainExtraction(format!(
            "'{}' has no host component",
            input
        ))),
    }
}

/// Normalizes a URL or host name to its lower-case registrable domain.
///
/// `https://sub.example.co.uk/path` becomes `example.co.uk`. Applying the
/// function to its own output returns the output unchanged.
pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction("empty input".to_string()));
    }

    let host = parse_host(&trimmed.to_lowercase())?;
    let host = host.trim_end_matches('.');

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(AppError::DomainExtraction(format!(
            "'{}' is not a multi-label domain",
            input
        )));
    }

    let n = labels.len();
    let tail = format!("{}.{}", labels[n - 2], labels[n - 1]);
    let keep = if MULTI_LABEL_SUFFIXES.contains(tail.as_str()) {
        3
    } else {
        2
    };
    if n < keep {
        return Err(AppError::DomainExtraction(format!(
            "'{}' is a public suffix, not a registrable domain",
            input
        )));
    }

    let registrable = labels[n - keep..].join(".");
    tracing::trace!(target: "discovery_task", "Normalized '{}' to registrable domain '{}'", input, registrable);
    Ok(registrable)
}
