use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use alttext_batch::compiler;
use alttext_batch::config;
use alttext_batch::openai::{BatchService, OpenAiClient};
use alttext_batch::submit;
use alttext_batch::table;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Compile a ZIP of images into caption requests and submit them as a batch job"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// ZIP archive with the images to caption
    #[arg(long)]
    archive: PathBuf,

    /// Tone substituted into the prompt (defaults to captioning.default_tone)
    #[arg(long)]
    tone: Option<String>,

    /// Output JSONL path; a timestamped name under app.batch_dir is used when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Only write the JSONL file, do not upload or create a batch
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let opts = cfg.compile_options(args.tone.as_deref())?;
    let batch_dir = PathBuf::from(&cfg.app.batch_dir);
    let archive = args.archive.clone();
    let output = args.output.clone();

    let started = Instant::now();
    let (jsonl_path, summary) = tokio::task::spawn_blocking(move || {
        compiler::zip_to_jsonl(&archive, output.as_deref(), &batch_dir, &opts)
    })
    .await
    .context("compile task panicked")?
    .with_context(|| format!("failed to compile {}", args.archive.display()))?;
    info!(
        records = summary.records,
        failed = summary.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "zip_to_jsonl finished"
    );
    println!(
        "Exported {} requests to {}",
        summary.records,
        jsonl_path.display()
    );

    if summary.records == 0 {
        warn!("archive contained no usable images; nothing to submit");
        return Ok(());
    }
    if args.dry_run {
        return Ok(());
    }

    let client = OpenAiClient::from_config(&cfg)?;
    submit_and_report(&client, &jsonl_path).await
}

async fn submit_and_report(service: &dyn BatchService, jsonl_path: &Path) -> Result<()> {
    let batch = submit::submit_jsonl(service, jsonl_path).await?;
    println!("Created batch {} ({})", batch.id, batch.status);

    let recent = service.list_batches(10).await?;
    println!("\nSubmitted batches");
    print!("{}", table::render_batches(&recent));
    Ok(())
}
