//! Process command - extract the main fields from a single invoice.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invex_core::{OutputRecord, Pipeline, RecordWriter};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Invoice file path or HTTP(S) URL
    #[arg(required = true)]
    input: String,

    /// Output directory (default: output.output_dir from config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the record to stdout instead of writing a file
    #[arg(long)]
    stdout: bool,

    /// Override the retry budget
    #[arg(long)]
    max_retries: Option<u32>,

    /// Do not attach the document image to extraction prompts
    #[arg(long)]
    no_image: bool,

    /// Show confidence, retries and token usage
    #[arg(long)]
    show_confidence: bool,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    // Load configuration
    let mut config = load_config(config_path)?;
    if let Some(max_retries) = args.max_retries {
        config.workflow.max_retries = max_retries;
    }
    if args.no_image {
        config.workflow.attach_image = false;
    }

    let pipeline = Pipeline::connect(&config).context("Failed to set up gateways")?;

    info!("Processing document: {}", args.input);

    // Create progress spinner
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Extracting {}", args.input));

    let state = pipeline.process(&args.input).await;
    let record = OutputRecord::from_state(&state);

    pb.finish_and_clear();

    // Write output
    if args.stdout {
        let output = if config.output.pretty {
            serde_json::to_string_pretty(&record)?
        } else {
            serde_json::to_string(&record)?
        };
        println!("{}", output);
    } else {
        let output_dir = args.output_dir.unwrap_or(config.output.output_dir);
        let writer = RecordWriter::new(output_dir).with_pretty(config.output.pretty);
        let path = writer.write(&args.input, &record)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            path.display()
        );
    }

    if let Some(error) = &record.error {
        eprintln!("{} {}", style("✗").red(), error);
    }

    // Show summary
    if args.show_confidence && !record.is_error() {
        println!();
        if let Some(confidence) = record.confidence {
            println!("{} Confidence: {}", style("ℹ").blue(), confidence.as_str());
        }
        if let Some(reason) = &record.reason {
            println!("{} Reason: {}", style("ℹ").blue(), reason);
        }
        println!("{} Retries: {}", style("ℹ").blue(), state.retry_count);
        println!(
            "{} Tokens: {} in / {} out",
            style("ℹ").blue(),
            state.token_usage.input_tokens,
            state.token_usage.output_tokens
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}
