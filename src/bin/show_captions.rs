use anyhow::{bail, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use alttext_batch::config;
use alttext_batch::openai::{load_finished_captions, OpenAiClient};
use alttext_batch::submit::resolve_output_file;
use alttext_batch::table;

#[derive(Debug, Parser)]
#[command(about = "Print the captions produced by a finished batch")]
#[command(group(ArgGroup::new("source").required(true).args(["file_id", "batch_id"])))]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Batch output file id
    #[arg(long)]
    file_id: Option<String>,

    /// Batch id; its output file is looked up first
    #[arg(long)]
    batch_id: Option<String>,

    /// Print one JSON object per caption instead of a table
    #[arg(long)]
    json: bool,
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
    let client = OpenAiClient::from_config(&cfg)?;

    let file_id = match (args.file_id, args.batch_id) {
        (Some(file_id), _) => file_id,
        (None, Some(batch_id)) => resolve_output_file(&client, &batch_id).await?,
        (None, None) => bail!("one of --file-id or --batch-id is required"),
    };

    let rows = load_finished_captions(&client, &file_id).await?;
    if args.json {
        for row in &rows {
            println!("{}", serde_json::to_string(row)?);
        }
    } else {
        print!("{}", table::render_captions(&rows));
    }
    Ok(())
}
