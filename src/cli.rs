//! Command-line arguments for the `lead-sleuth` binary.

use clap::Parser;
use lead_sleuth_core::core::config::{load_config_file, ConfigBuilder, ProbeBackend};
use lead_sleuth_core::{Config, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Finds and verifies outreach email addresses for named contacts.
#[derive(Parser, Debug)]
#[command(name = "lead-sleuth", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Input file of contact records (JSON array or JSON Lines).
    #[arg(short, long, default_value = "contacts.json", conflicts_with_all = ["name", "domain"])]
    pub input: PathBuf,

    /// Output file; processed records are appended as JSON lines.
    #[arg(short, long, default_value = "results.jsonl")]
    pub output: PathBuf,

    /// Full name of a single contact (requires --domain).
    #[arg(long, requires = "domain")]
    pub name: Option<String>,

    /// Company domain or URL of a single contact (requires --name).
    #[arg(long, requires = "name")]
    pub domain: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short, long, env = "LEAD_SLEUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verification backend: smtp or api.
    #[arg(long)]
    pub backend: Option<ProbeBackend>,

    /// Endpoint of the verification API (api backend).
    #[arg(long)]
    pub api_endpoint: Option<String>,

    /// Ranking model artifact (JSON).
    #[arg(long, env = "LEAD_SLEUTH_MODEL")]
    pub model: Option<PathBuf>,

    /// Envelope sender used for SMTP probes.
    #[arg(long)]
    pub sender: Option<String>,

    /// SMTP port to probe.
    #[arg(long)]
    pub smtp_port: Option<u16>,

    /// DNS servers to query, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub dns_servers: Option<Vec<String>>,

    /// Attempts per mail host before giving up.
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Base backoff between attempts, in milliseconds.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Records processed concurrently.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Hide the progress bar.
    #[arg(long)]
    pub no_progress: bool,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format: text or json.
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Single-contact mode when both --name and --domain are given.
    pub fn single_contact(&self) -> Option<(&str, &str)> {
        Some((self.name.as_deref()?, self.domain.as_deref()?))
    }

    /// Layers defaults, the config file, then flags.
    pub fn build_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();
        if let Some((file, path)) = load_config_file(self.config.as_deref())? {
            tracing::info!("Loaded configuration from {}", path.display());
            builder = builder.with_file(file, path.display().to_string());
        }

        if let Some(backend) = self.backend {
            builder = builder.probe_backend(backend);
        }
        if let Some(ref endpoint) = self.api_endpoint {
            builder = builder.api_endpoint(endpoint.clone());
        }
        if let Some(ref model) = self.model {
            builder = builder.model_path(model.clone());
        }
        if let Some(ref sender) = self.sender {
            builder = builder.sender_email(sender.clone());
        }
        if let Some(port) = self.smtp_port {
            builder = builder.smtp_port(port);
        }
        if let Some(ref servers) = self.dns_servers {
            builder = builder.dns_servers(servers.clone());
        }
        if let Some(attempts) = self.attempts {
            builder = builder.max_verification_attempts(attempts);
        }
        if let Some(ms) = self.retry_delay_ms {
            builder = builder.retry_base_delay(Duration::from_millis(ms));
        }
        if let Some(n) = self.concurrency {
            builder = builder.max_concurrency(n);
        }
        builder.build()
    }
}
