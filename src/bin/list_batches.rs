use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use alttext_batch::config;
use alttext_batch::openai::OpenAiClient;
use alttext_batch::table;

#[derive(Parser, Debug)]
#[command(about = "List the most recent batch jobs")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Number of batches to show
    #[arg(long, default_value = "10")]
    limit: u32,
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

    let batches = client.list_batches(args.limit).await?;
    print!("{}", table::render_batches(&batches));
    Ok(())
}
