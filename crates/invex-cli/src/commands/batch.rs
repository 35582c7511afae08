//! Batch processing command for many invoices.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use console::style;
use futures_util::StreamExt;
use futures_util::stream;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use invex_core::document::output_name;
use invex_core::{FieldValue, OutputRecord, Pipeline, RecordWriter, TokenUsage};

use super::load_config;

/// File extensions picked up from directories and glob patterns.
const DOCUMENT_EXTENSIONS: [&str; 9] = [
    "pdf", "png", "jpg", "jpeg", "tiff", "tif", "bmp", "webp", "gif",
];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input directories or glob patterns
    inputs: Vec<String>,

    /// File listing document URLs, one per line ('#' starts a comment)
    #[arg(long)]
    urls: Option<PathBuf>,

    /// Output directory (default: output.output_dir from config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed concurrently
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Override the retry budget
    #[arg(long)]
    max_retries: Option<u32>,

    /// Do not attach document images to extraction prompts
    #[arg(long)]
    no_image: bool,
}

/// Outcome of one document.
struct DocumentResult {
    reference: String,
    record: OutputRecord,
    retries: u32,
    token_usage: TokenUsage,
    processing_time_ms: u64,
    processed_at: DateTime<Utc>,
}

impl DocumentResult {
    fn status(&self) -> &'static str {
        match self.record.confidence {
            _ if self.record.is_error() => "error",
            Some(confidence) if confidence.is_accepted() => "success",
            _ => "low_confidence",
        }
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    // Load configuration
    let mut config = load_config(config_path)?;
    if let Some(max_retries) = args.max_retries {
        config.workflow.max_retries = max_retries;
    }
    if args.no_image {
        config.workflow.attach_image = false;
    }

    let references = collect_references(&args.inputs, args.urls.as_deref())?;
    if references.is_empty() {
        anyhow::bail!("No documents found to process");
    }

    println!(
        "{} Found {} documents to process",
        style("ℹ").blue(),
        references.len()
    );

    for (first, second) in output_collisions(&references) {
        warn!("{} and {} share an output file, the later record wins", first, second);
        println!(
            "{} {} and {} write to the same output file",
            style("⚠").yellow(),
            first,
            second
        );
    }

    let pipeline = Pipeline::connect(&config).context("Failed to set up gateways")?;
    let output_dir = args.output_dir.unwrap_or(config.output.output_dir);
    let writer = RecordWriter::new(&output_dir).with_pretty(config.output.pretty);

    // Set up progress bar
    let pb = ProgressBar::new(references.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents")
            .unwrap()
            .progress_chars("=>-"),
    );

    let jobs = args.jobs.max(1);
    let mut results: Vec<DocumentResult> = stream::iter(references)
        .map(|reference| {
            let pipeline = pipeline.clone();
            let writer = writer.clone();
            let pb = pb.clone();
            async move {
                let result = process_document(&pipeline, &writer, reference).await;
                pb.inc(1);
                result
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    pb.finish_with_message("Complete");
    results.sort_by(|a, b| a.reference.cmp(&b.reference));

    // Generate summary if requested
    if args.summary {
        fs::create_dir_all(&output_dir)?;
        let summary_path = output_dir.join("summary.csv");
        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    // Print summary
    let failed: Vec<_> = results.iter().filter(|r| r.record.is_error()).collect();
    let low_confidence = results
        .iter()
        .filter(|r| r.status() == "low_confidence")
        .count();
    let tokens: u64 = results.iter().map(|r| r.token_usage.total()).sum();

    println!();
    println!(
        "{} Processed {} documents in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} verified, {} low confidence, {} failed, {} tokens used",
        style(results.len() - failed.len() - low_confidence).green(),
        style(low_confidence).yellow(),
        style(failed.len()).red(),
        tokens
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed documents:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.reference,
                result.record.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

async fn process_document(
    pipeline: &Pipeline,
    writer: &RecordWriter,
    reference: String,
) -> DocumentResult {
    let started = Instant::now();
    let state = pipeline.process(&reference).await;
    let mut record = OutputRecord::from_state(&state);

    match writer.write(&reference, &record) {
        Ok(path) => debug!("Wrote output to {}", path.display()),
        Err(e) => {
            warn!("Failed to write output for {}: {}", reference, e);
            record.error.get_or_insert_with(|| e.to_string());
        }
    }

    DocumentResult {
        reference,
        record,
        retries: state.retry_count,
        token_usage: state.token_usage,
        processing_time_ms: started.elapsed().as_millis() as u64,
        processed_at: Utc::now(),
    }
}

/// Expand directories, glob patterns and URL list files into document references.
fn collect_references(inputs: &[String], urls: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut references = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_document(p))
                .collect();
            files.sort();
            references.extend(files.iter().map(|p| p.display().to_string()));
        } else {
            let matches = glob(input)
                .with_context(|| format!("Invalid glob pattern: {}", input))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file() && is_document(p));
            references.extend(matches.map(|p| p.display().to_string()));
        }
    }

    if let Some(urls) = urls {
        let content = fs::read_to_string(urls)
            .with_context(|| format!("Cannot read URL list {}", urls.display()))?;
        references.extend(parse_url_list(&content));
    }

    // Overlapping inputs must not process a document twice
    let mut seen = HashSet::new();
    references.retain(|reference| seen.insert(reference.clone()));
    Ok(references)
}

/// Pairs of references whose records map to the same output file.
fn output_collisions(references: &[String]) -> Vec<(String, String)> {
    let mut owners: HashMap<String, &String> = HashMap::new();
    let mut collisions = Vec::new();

    for reference in references {
        let name = output_name(reference);
        match owners.get(&name) {
            Some(first) => collisions.push(((*first).clone(), reference.clone())),
            None => {
                owners.insert(name, reference);
            }
        }
    }

    collisions
}

fn is_document(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    DOCUMENT_EXTENSIONS.contains(&ext.as_str())
}

/// Non-empty lines of a URL list, with `#` comments stripped.
fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn field(value: &Option<FieldValue>) -> &str {
    value.as_ref().map(FieldValue::as_str).unwrap_or("")
}

fn write_summary(path: &Path, results: &[DocumentResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "document",
        "status",
        "supplier",
        "invoice_number",
        "invoice_date",
        "confidence",
        "reason",
        "retries",
        "input_tokens",
        "output_tokens",
        "processing_time_ms",
        "processed_at",
        "error",
    ])?;

    for result in results {
        let record = &result.record;
        let retries = result.retries.to_string();
        let input_tokens = result.token_usage.input_tokens.to_string();
        let output_tokens = result.token_usage.output_tokens.to_string();
        let processing_time_ms = result.processing_time_ms.to_string();
        let processed_at = result.processed_at.to_rfc3339();

        wtr.write_record([
            result.reference.as_str(),
            result.status(),
            field(&record.supplier),
            field(&record.invoice_number),
            field(&record.invoice_date),
            record.confidence.map(|c| c.as_str()).unwrap_or(""),
            record.reason.as_deref().unwrap_or(""),
            retries.as_str(),
            input_tokens.as_str(),
            output_tokens.as_str(),
            processing_time_ms.as_str(),
            processed_at.as_str(),
            record.error.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
