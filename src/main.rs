mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, LogFormat};
use lead_sleuth_core::core::logger;
use lead_sleuth_core::pipeline::{process_records, read_records, RecordWriter};
use lead_sleuth_core::{EmailFinder, Person};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(&cli.log_level, cli.log_format == LogFormat::Json);

    let config = cli.build_config().context("Invalid configuration")?;
    let finder = EmailFinder::from_config(&config).context("Failed to initialise email finder")?;

    if let Some((name, domain)) = cli.single_contact() {
        let person = Person::new(name);
        let outcome = tokio::select! {
            outcome = finder.find_email(&person, domain) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted; abandoning lookup");
                return Ok(());
            }
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let records = read_records(&cli.input)
        .with_context(|| format!("Failed to read records from {}", cli.input.display()))?;
    let mut writer = RecordWriter::open(&cli.output)
        .await
        .with_context(|| format!("Failed to open {}", cli.output.display()))?;

    tokio::select! {
        summary = process_records(&finder, records, &mut writer, config.max_concurrency, !cli.no_progress) => {
            let summary = summary?;
            tracing::info!(
                "Finished: {}/{} records with an email ({} verified)",
                summary.found, summary.processed, summary.verified
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; in-flight lookups abandoned, completed records already written");
        }
    }

    Ok(())
}
