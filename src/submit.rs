use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use crate::openai::model::BatchJob;
use crate::openai::BatchService;

/// Upload a compiled JSONL file and create a batch job that references it.
#[instrument(skip_all, fields(path = %jsonl_path.display()))]
pub async fn submit_jsonl(service: &dyn BatchService, jsonl_path: &Path) -> Result<BatchJob> {
    let started = Instant::now();
    let file = service
        .upload_batch_file(jsonl_path)
        .await
        .context("failed to upload batch input file")?;
    info!(
        file_id = %file.id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "upload_batch_file finished"
    );

    let started = Instant::now();
    let batch = service
        .create_batch(&file.id)
        .await
        .with_context(|| format!("failed to create batch for file {}", file.id))?;
    info!(
        batch_id = %batch.id,
        status = %batch.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "create_batch finished"
    );
    Ok(batch)
}

/// Output file id of a batch, or an error naming its status when it has none yet.
pub async fn resolve_output_file(service: &dyn BatchService, batch_id: &str) -> Result<String> {
    let batch = service.retrieve_batch(batch_id).await?;
    batch.output_file_id.ok_or_else(|| {
        anyhow::anyhow!(
            "batch {} has no output file yet (status: {})",
            batch.id,
            batch.status
        )
    })
}
