// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use mmod_pipeline::config::load_and_validate_config;
use mmod_pipeline::driver::{BatchReport, Driver, UnitOutcome};
use mmod_pipeline::observability::init_tracing;

fn usage(program: &str) -> String {
    format!(
        "Usage: {} <train|detect> <run.yaml>\nExample: {} train configs/train-store.yaml",
        program, program
    )
}

fn program_name(args: &[String]) -> &str {
    args.first().map(String::as_str).unwrap_or("mmod-pipeline")
}

fn print_batch(batch: &BatchReport) {
    println!("📊 Training summary ({:.2?})", batch.duration);
    for result in &batch.results {
        match &result.outcome {
            UnitOutcome::Trained { report, templates } => println!(
                "  ✅ {}: {} templates from {} passes ({} skipped)",
                result.unit, templates, report.passes, report.skipped
            ),
            UnitOutcome::NoObservations { .. } => {
                println!("  ⚪ {}: no observations, empty model written", result.unit)
            }
            UnitOutcome::Failed(e) => println!("  ❌ {}: {}", result.unit, e),
        }
    }
    println!(
        "  trained {}, empty {}, failed {}",
        batch.trained(),
        batch.empty(),
        batch.failed()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let args: Vec<String> = env::args().collect();
    let program = program_name(&args);
    let (mode, config_file) = match args.as_slice() {
        [_, mode, config_file] => (mode.as_str(), config_file.as_str()),
        _ => bail!(usage(program)),
    };

    let config = load_and_validate_config(config_file)
        .with_context(|| format!("loading {}", config_file))?;
    let driver = Driver::from_config(&config);

    match mode {
        "train" => {
            let batch = driver.train(config.train_section()?).await?;
            print_batch(&batch);
            if batch.failed() > 0 {
                std::process::exit(2);
            }
        }
        "detect" => {
            let token = CancellationToken::new();
            let on_signal = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let report = driver.detect(config.detect_section()?, &token).await?;
            println!(
                "🔎 {} run: {} passes, {} skipped, {} flushed ({:.2?})",
                report.mode, report.passes, report.skipped, report.flushed, report.duration
            );
        }
        other => bail!("unknown mode '{}'\n{}", other, usage(program)),
    }

    Ok(())
}
