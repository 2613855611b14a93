//! Defines the core runtime `Config` struct, its defaults, and related utilities.
//! Submodules handle loading, building, and validation.

pub(crate) mod builder;
pub(crate) mod file;
pub(crate) mod loading;
pub(crate) mod validation;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;
pub use loading::load_config_file;
pub use validation::validate_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::AppError;

/// Which strategy answers "would this host accept mail for this address".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Direct RCPT TO probing against the domain's mail exchangers.
    Smtp,
    /// Delegation to a remote HTTP verification service.
    Api,
}

impl FromStr for ProbeBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(ProbeBackend::Smtp),
            "api" => Ok(ProbeBackend::Api),
            other => Err(AppError::Config(format!(
                "Unknown probe backend '{}' (expected 'smtp' or 'api')",
                other
            ))),
        }
    }
}

/// Runtime configuration settings used by the lead-sleuth core logic.
#[derive(Debug, Clone)]
pub struct Config {
    pub request_timeout: Duration,
    pub user_agent: String,

    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,
    pub mx_cache_ttl: Duration,

    pub smtp_timeout: Duration,
    pub smtp_read_timeout: Duration,
    pub smtp_port: u16,
    pub smtp_sender_email: String,
    pub helo_name: String,
    pub max_verification_attempts: u32,
    pub retry_base_delay: Duration,
    pub max_sessions_per_host: usize,
    pub detect_catch_all: bool,
    pub catch_all_counts_as_verified: bool,

    pub probe_backend: ProbeBackend,
    pub api_endpoint: Option<String>,
    pub api_key_env: String,

    pub model_path: Option<PathBuf>,
    pub min_model_score: Option<f64>,

    pub max_concurrency: usize,

    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "8.8.4.4".to_string(),
            "1.1.1.1".to_string(),
            "1.0.0.1".to_string(),
        ];

        Config {
            request_timeout: Duration::from_secs(10),
            user_agent: format!("lead-sleuth-core/{}", env!("CARGO_PKG_VERSION")),
            dns_timeout: Duration::from_secs(5),
            dns_servers,
            mx_cache_ttl: Duration::from_secs(600),
            smtp_timeout: Duration::from_secs(10),
            smtp_read_timeout: Duration::from_secs(10),
            smtp_port: 25,
            smtp_sender_email: "test@example.com".to_string(),
            helo_name: "example.com".to_string(),
            max_verification_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            max_sessions_per_host: 2,
            detect_catch_all: true,
            catch_all_counts_as_verified: false,
            probe_backend: ProbeBackend::Smtp,
            api_endpoint: None,
            api_key_env: "LEAD_SLEUTH_API_KEY".to_string(),
            model_path: None,
            min_model_score: None,
            max_concurrency: std::thread::available_parallelism()
                .map_or(1, |n| n.get())
                .max(1),
            loaded_config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_retry_policy() {
        let config = Config::default();
        assert_eq!(config.max_verification_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(5));
        assert_eq!(config.smtp_port, 25);
        assert_eq!(config.probe_backend, ProbeBackend::Smtp);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn probe_backend_parses_case_insensitively() {
        assert_eq!("SMTP".parse::<ProbeBackend>().unwrap(), ProbeBackend::Smtp);
        assert_eq!(" api ".parse::<ProbeBackend>().unwrap(), ProbeBackend::Api);
        assert!("carrier-pigeon".parse::<ProbeBackend>().is_err());
    }
}
