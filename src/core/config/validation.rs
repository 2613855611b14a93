//! Sanity checks applied to a fully layered [`Config`].

use super::{Config, ProbeBackend};
use crate::core::error::{AppError, Result};
use lettre::Address;
use std::str::FromStr;

pub fn validate_config(config: &Config) -> Result<()> {
    if config.max_verification_attempts == 0 {
        return Err(AppError::Config(
            "max_verification_attempts must be at least 1".to_string(),
        ));
    }
    if config.smtp_timeout.is_zero() || config.smtp_read_timeout.is_zero() {
        return Err(AppError::Config("SMTP timeouts must be non-zero".to_string()));
    }
    if config.dns_timeout.is_zero() {
        return Err(AppError::Config("dns_timeout must be non-zero".to_string()));
    }
    if config.max_sessions_per_host == 0 {
        return Err(AppError::Config(
            "max_sessions_per_host must be at least 1".to_string(),
        ));
    }
    if config.max_concurrency == 0 {
        return Err(AppError::Config(
            "max_concurrency must be at least 1".to_string(),
        ));
    }
    Address::from_str(&config.smtp_sender_email).map_err(|e| {
        AppError::Config(format!(
            "Invalid sender email '{}': {}",
            config.smtp_sender_email, e
        ))
    })?;
    if config.helo_name.trim().is_empty() {
        return Err(AppError::Config("helo_name must not be empty".to_string()));
    }
    if let Some(score) = config.min_model_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(AppError::Config(format!(
                "min_model_score must be within [0, 1], got {}",
                score
            )));
        }
    }
    if config.probe_backend == ProbeBackend::Api {
        match config.api_endpoint.as_deref() {
            Some(endpoint) => {
                url::Url::parse(endpoint)?;
            }
            None => {
                return Err(AppError::Config(
                    "The 'api' probe backend requires api_endpoint".to_string(),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rejects_bad_sender() {
        let config = Config {
            smtp_sender_email: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_read_timeout() {
        let config = Config {
            smtp_read_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn api_backend_needs_endpoint() {
        let mut config = Config {
            probe_backend: ProbeBackend::Api,
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());

        config.api_endpoint = Some("https://verify.example/v1".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn min_score_must_be_a_probability() {
        let config = Config {
            min_model_score: Some(1.5),
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
