use anyhow::{Context, Result};
use clap::Parser;
use imgconverter::cli::Cli;
use imgconverter::config::AppConfig;
use imgconverter::encoder::ImageCodec;
use imgconverter::queue::{ConversionSettings, Controller, ExecutionPool};
use imgconverter::report::{self, BatchSummary};
use imgconverter::utils::init_logging;
use imgconverter::{input, output};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_guard = init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let paths = input::collect_paths(&cli.inputs, cli.recursive);
    let files = input::read_inputs(&paths);
    if files.is_empty() {
        anyhow::bail!("No readable input files");
    }

    info!(
        "Converting {} files to {} at quality {}",
        files.len(),
        config.conversion.format,
        config.conversion.quality
    );

    let codec = ImageCodec::new(config.conversion.format);
    let pool = ExecutionPool::new(config.performance.pool_size(), Arc::new(codec));
    let mut controller = Controller::new(pool, ConversionSettings::from(&config));

    let printer = (!cli.json).then(|| {
        let mut changes = controller.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => println!("{}", report::status_line(&change)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let registration = controller.register(files);
    if let Some(message) = registration.rejection_message() {
        eprintln!("{}", message);
    }

    controller.submit_all();
    controller.run_until_complete().await;

    for round in 1..=cli.retries {
        let retried = controller.retry_failed();
        if retried == 0 {
            break;
        }
        info!("Retry round {}: {} files", round, retried);
        controller.submit_all();
        controller.run_until_complete().await;
    }

    let out_dir = PathBuf::from(&config.output.directory);
    let written = output::write_exports(&out_dir, &controller.exports())
        .with_context(|| format!("Failed to write output to {}", out_dir.display()))?;

    let summary = BatchSummary::from_controller(&controller);
    controller.teardown();
    drop(controller);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_summary(&summary);
        println!("Output: {} files in {}", written.len(), out_dir.display());
    }

    if summary.failed > 0 {
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}
