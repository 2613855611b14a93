//! Layers built-in defaults, the config file, and explicit overrides into a [`Config`].

use super::file::ConfigFile;
use super::validation::validate_config;
use super::{Config, ProbeBackend};
use crate::core::error::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Builder producing a validated [`Config`].
///
/// Precedence, lowest to highest: defaults, config file, setter overrides.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    file: Option<ConfigFile>,
    file_path: Option<String>,
    sender_email: Option<String>,
    smtp_port: Option<u16>,
    max_attempts: Option<u32>,
    retry_base_delay: Option<Duration>,
    backend: Option<ProbeBackend>,
    api_endpoint: Option<String>,
    model_path: Option<PathBuf>,
    max_concurrency: Option<usize>,
    dns_servers: Option<Vec<String>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: ConfigFile, path: impl Into<String>) -> Self {
        self.file = Some(file);
        self.file_path = Some(path.into());
        self
    }

    pub fn sender_email(mut self, email: impl Into<String>) -> Self {
        self.sender_email = Some(email.into());
        self
    }

    pub fn smtp_port(mut self, port: u16) -> Self {
        self.smtp_port = Some(port);
        self
    }

    pub fn max_verification_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    pub fn probe_backend(mut self, backend: ProbeBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.dns_servers = Some(servers);
        self
    }

    fn apply_file(config: &mut Config, file: &ConfigFile) -> Result<()> {
        let net = &file.network;
        if let Some(secs) = net.request_timeout {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ref ua) = net.user_agent {
            config.user_agent = ua.clone();
        }
        if let Some(n) = net.max_concurrency {
            config.max_concurrency = n;
        }

        let dns = &file.dns;
        if let Some(secs) = dns.dns_timeout {
            config.dns_timeout = Duration::from_secs(secs);
        }
        if let Some(ref servers) = dns.dns_servers {
            config.dns_servers = servers.clone();
        }
        if let Some(secs) = dns.mx_cache_ttl {
            config.mx_cache_ttl = Duration::from_secs(secs);
        }

        let smtp = &file.smtp;
        if let Some(secs) = smtp.smtp_timeout {
            config.smtp_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = smtp.smtp_read_timeout {
            config.smtp_read_timeout = Duration::from_secs(secs);
        }
        if let Some(port) = smtp.smtp_port {
            config.smtp_port = port;
        }
        if let Some(ref sender) = smtp.smtp_sender_email {
            config.smtp_sender_email = sender.clone();
        }
        if let Some(ref helo) = smtp.helo_name {
            config.helo_name = helo.clone();
        }
        if let Some(n) = smtp.max_sessions_per_host {
            config.max_sessions_per_host = n;
        }

        let verification = &file.verification;
        if let Some(ref backend) = verification.backend {
            config.probe_backend = backend.parse()?;
        }
        if let Some(attempts) = verification.max_verification_attempts {
            config.max_verification_attempts = attempts;
        }
        if let Some(ms) = verification.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = verification.detect_catch_all {
            config.detect_catch_all = flag;
        }
        if let Some(flag) = verification.catch_all_counts_as_verified {
            config.catch_all_counts_as_verified = flag;
        }
        if let Some(ref endpoint) = verification.api_endpoint {
            config.api_endpoint = Some(endpoint.clone());
        }
        if let Some(ref env) = verification.api_key_env {
            config.api_key_env = env.clone();
        }

        let ranking = &file.ranking;
        if let Some(ref path) = ranking.model_path {
            config.model_path = Some(PathBuf::from(path));
        }
        if let Some(score) = ranking.min_model_score {
            config.min_model_score = Some(score);
        }
        Ok(())
    }

    /// Builds and validates the final configuration.
    pub fn build(self) -> Result<Config> {
        let mut config = Config::default();

        if let Some(ref file) = self.file {
            Self::apply_file(&mut config, file)?;
            config.loaded_config_path = self.file_path.clone();
        }

        if let Some(sender) = self.sender_email {
            config.smtp_sender_email = sender;
        }
        if let Some(port) = self.smtp_port {
            config.smtp_port = port;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_verification_attempts = attempts;
        }
        if let Some(delay) = self.retry_base_delay {
            config.retry_base_delay = delay;
        }
        if let Some(backend) = self.backend {
            config.probe_backend = backend;
        }
        if let Some(endpoint) = self.api_endpoint {
            config.api_endpoint = Some(endpoint);
        }
        if let Some(path) = self.model_path {
            config.model_path = Some(path);
        }
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }
        if let Some(servers) = self.dns_servers {
            config.dns_servers = servers;
        }

        validate_config(&config)?;
        tracing::debug!("Final configuration: {:?}", config);
        Ok(config)
    }
}
