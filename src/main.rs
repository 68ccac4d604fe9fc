use anyhow::Context;
use clap::Parser;
use postcode_etl::core::controller::NO_VALID_POSTCODES;
use postcode_etl::core::{ConfigProvider, StatusSink, Storage};
use postcode_etl::utils::{logger, validation::Validate};
use postcode_etl::{
    BatchEnricher, CliConfig, Controller, EnrichError, HttpLookupClient, LocalStorage,
    RetryPolicy, RunOutcome, Settings,
};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Shows the status line on stderr so stdout stays clean for the preview.
struct TerminalStatus;

impl StatusSink for TerminalStatus {
    fn emit(&self, message: &str) {
        eprintln!("⏳ {}", message);
    }
}

async fn read_input(cli: &CliConfig) -> anyhow::Result<String> {
    if let Some(codes) = &cli.codes {
        return Ok(codes.clone());
    }

    if let Some(path) = &cli.input {
        let bytes = LocalStorage::new(".".to_string())
            .read_file(path)
            .await
            .with_context(|| format!("failed to read postcodes from {}", path))?;
        return String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", path));
    }

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read postcodes from stdin")?;
    Ok(raw)
}

fn build_controller(config: &impl ConfigProvider) -> Controller<HttpLookupClient> {
    let client = HttpLookupClient::new(config.api_endpoint());
    tracing::info!("🌐 Lookup endpoint: {}", client.endpoint());
    let enricher = BatchEnricher::new(client)
        .with_batch_size(config.batch_size())
        .with_policy(RetryPolicy::linear(
            config.max_attempts(),
            Duration::from_millis(config.backoff_ms()),
        ))
        .with_batch_pause(Duration::from_millis(config.batch_pause_ms()));

    Controller::new(enricher, Arc::new(TerminalStatus)).with_preview_rows(config.preview_rows())
}

fn fail(e: &EnrichError) -> ! {
    tracing::error!("❌ {}", e);
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting postcode-etl");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 合併設定並驗證
    let settings = match Settings::resolve(&cli) {
        Ok(settings) => settings,
        Err(e) => fail(&e),
    };
    if let Err(e) = settings.validate() {
        fail(&e);
    }
    tracing::debug!("Effective settings: {:?}", settings);

    let raw = match read_input(&cli).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(3);
        }
    };

    let mut controller = build_controller(&settings);

    match controller.run(&raw).await {
        RunOutcome::NothingToDo => {
            println!("{}", NO_VALID_POSTCODES);
        }
        RunOutcome::Failed => {
            eprintln!("❌ {}", controller.state().status);
            std::process::exit(2);
        }
        RunOutcome::Completed { rows, .. } => {
            if !cli.no_preview {
                if let Some(view) = &controller.state().view {
                    println!("{}", view);
                }
            }

            let storage = LocalStorage::new(settings.output_path().to_string());
            match controller.download(&storage).await {
                Ok(Some(location)) => {
                    println!("✅ Enriched {} postcodes", rows);
                    println!("📁 CSV saved to: {}", location);
                }
                Ok(None) => {}
                Err(e) => fail(&e),
            }
        }
    }

    Ok(())
}
