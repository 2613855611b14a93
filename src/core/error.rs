//! Defines the custom error types for the lead-sleuth application.

use std::{io, net::AddrParseError};
use thiserror::Error;
use url::ParseError as UrlParseError;

/// Every failure the discovery engine can report.
#[derive(Error, Debug)]
pub enum AppError {
    /// A config file, flag or layered value is unusable.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// A resolver, HTTP client or session pool could not be built.
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Reading records, writing results or loading a file failed.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Malformed record input or unserializable output.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a TOML configuration file.
    #[error("TOML Error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A company URL or API endpoint did not parse.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// The verification API client failed.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// MX lookup failed inside trust-dns.
    #[error("DNS Resolution Error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// lettre refused or broke the SMTP conversation.
    #[error("SMTP Error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// A configured DNS server is not an IP address.
    #[error("Address Parsing Error: {0}")]
    AddrParse(#[from] AddrParseError),

    /// The person's name has fewer than two usable tokens.
    #[error("Invalid Name: '{0}' needs at least a first and a last name")]
    InvalidName(String),

    /// Failed to extract a registrable domain from the provided URL or host.
    #[error("Failed to extract domain from URL: {0}")]
    DomainExtraction(String),

    /// The domain advertises no mail-routing hosts.
    #[error("No mail infrastructure for domain: {0}")]
    NoMailInfrastructure(String),

    /// Resolution or probe failed for a reason worth retrying (refused connection, server failure).
    #[error("Transient Network Failure: {0}")]
    TransientNetworkFailure(String),

    /// A connect, DNS query or SMTP reply did not arrive in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The mail host dropped the session in the middle of a conversation.
    #[error("SMTP Protocol Disconnect: {0}")]
    ProtocolDisconnect(String),

    /// The ranking model artifact is missing or malformed.
    #[error("Model Error: {0}")]
    Model(String),
}

impl AppError {
    /// True for failures the verifier should retry with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::TransientNetworkFailure(_)
            | AppError::Timeout(_)
            | AppError::ProtocolDisconnect(_) => true,
            AppError::Io(_) => true,
            AppError::Dns(e) => !crate::utils::dns::is_authoritative_absence(e),
            AppError::Request(e) => e.is_timeout() || e.is_connect(),
            AppError::Smtp(e) => e.is_transient() || e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
