//! Tracing subscriber setup for the binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Dependencies that are chatty at `info` and below.
const QUIET_CRATES: &[&str] = &["hyper", "reqwest", "rustls", "trust_dns_proto", "trust_dns_resolver", "lettre"];

/// Default directive: `level` for our own `*_task` targets, `warn` for noisy dependencies.
fn default_directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_CRATES.iter().map(|c| format!("{}=warn", c)));
    directives.join(",")
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_level` when set.
pub fn init(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    if let Err(e) = result {
        eprintln!("Logger already initialised: {}", e);
    }
}
