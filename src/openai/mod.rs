use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::json;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::model::RESPONSES_ENDPOINT;
use crate::openai::model::{BatchJob, BatchList, CaptionRow, FileObject, ResponseLine};

pub mod model;

const OPENAI_API_BASE: &str = "https://api.openai.com/";
const COMPLETION_WINDOW: &str = "24h";
const CAPTION_POINTER: &str = "/output/0/content/0/text";

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// The subset of the remote batch API used to submit and collect caption jobs.
#[async_trait]
pub trait BatchService: Send + Sync {
    async fn upload_batch_file(&self, jsonl_path: &Path) -> Result<FileObject>;

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchJob>;

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob>;

    async fn list_batches(&self, limit: u32) -> Result<Vec<BatchJob>>;

    async fn file_content(&self, file_id: &str) -> Result<String>;
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let base_url = Url::parse(OPENAI_API_BASE).context("invalid default OpenAI URL")?;
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("alttext-batch/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Build a client from settings; the API key must come from the file or the environment.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let api_key = cfg
            .api_key()
            .ok_or_else(|| anyhow!("no API key: set openai.api_key or OPENAI_API_KEY"))?;
        let base_url = Url::parse(&cfg.openai.base_url)
            .with_context(|| format!("invalid openai.base_url: {}", cfg.openai.base_url))?;
        Self::with_base_url(api_key, base_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid OpenAI base URL for {}", path))
    }

    pub fn build_create_batch_request(&self, input_file_id: &str) -> Result<reqwest::Request> {
        let body = json!({
            "input_file_id": input_file_id,
            "endpoint": RESPONSES_ENDPOINT,
            "completion_window": COMPLETION_WINDOW,
        });
        self.http
            .post(self.endpoint("v1/batches")?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .build()
            .context("failed to build create-batch request")
    }

    pub async fn upload_batch_file(&self, jsonl_path: &Path) -> Result<FileObject> {
        let file_name = jsonl_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid batch file name"))?
            .to_string();
        let content = fs::read(jsonl_path)
            .await
            .with_context(|| format!("failed to read batch file: {}", jsonl_path.display()))?;

        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part(
                "file",
                reqwest::multipart::Part::bytes(content)
                    .file_name(file_name.clone())
                    .mime_str("application/jsonl")?,
            );

        let res = self
            .http
            .post(self.endpoint("v1/files")?)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("failed to upload batch file")?;
        let file: FileObject = check_status(res, "upload batch file")
            .await?
            .json()
            .await
            .context("invalid file upload response")?;
        info!(file_id = %file.id, file_name = %file_name, "uploaded batch input file");
        Ok(file)
    }

    pub async fn create_batch(&self, input_file_id: &str) -> Result<BatchJob> {
        let request = self.build_create_batch_request(input_file_id)?;
        debug!(url = %request.url(), input_file_id, "creating batch");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach OpenAI")?;
        let batch: BatchJob = check_status(res, "create batch")
            .await?
            .json()
            .await
            .context("invalid create batch response")?;
        info!(batch_id = %batch.id, status = %batch.status, "created batch");
        Ok(batch)
    }

    pub async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob> {
        let url = self.endpoint(&format!("v1/batches/{}", batch_id))?;
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to reach OpenAI")?;
        check_status(res, "retrieve batch")
            .await?
            .json()
            .await
            .context("invalid batch response")
    }

    pub async fn list_batches(&self, limit: u32) -> Result<Vec<BatchJob>> {
        let mut url = self.endpoint("v1/batches")?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to reach OpenAI")?;
        let list: BatchList = check_status(res, "list batches")
            .await?
            .json()
            .await
            .context("invalid batch list response")?;
        Ok(list.data)
    }

    pub async fn file_content(&self, file_id: &str) -> Result<String> {
        let url = self.endpoint(&format!("v1/files/{}/content", file_id))?;
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to reach OpenAI")?;
        check_status(res, "download file content")
            .await?
            .text()
            .await
            .context("failed to read file content")
    }
}

async fn check_status(res: Response, action: &str) -> Result<Response> {
    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let body = res.text().await.unwrap_or_default();
        warn!(action, "rate limited by OpenAI: {}", body);
        return Err(anyhow!("received 429 from OpenAI during {}: {}", action, body));
    }
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        warn!(action, %status, "OpenAI API error: {}", body);
        return Err(anyhow!("{} failed {}: {}", action, status, body));
    }
    Ok(res)
}

#[async_trait]
impl BatchService for OpenAiClient {
    async fn upload_batch_file(&self, jsonl_path: &Path) -> Result<FileObject> {
        OpenAiClient::upload_batch_file(self, jsonl_path).await
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchJob> {
        OpenAiClient::create_batch(self, input_file_id).await
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob> {
        OpenAiClient::retrieve_batch(self, batch_id).await
    }

    async fn list_batches(&self, limit: u32) -> Result<Vec<BatchJob>> {
        OpenAiClient::list_batches(self, limit).await
    }

    async fn file_content(&self, file_id: &str) -> Result<String> {
        OpenAiClient::file_content(self, file_id).await
    }
}

/// Parse a batch output file into one caption row per response line.
pub fn parse_captions(file_id: &str, content: &str) -> Result<Vec<CaptionRow>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let record: ResponseLine = serde_json::from_str(line)
                .with_context(|| format!("invalid response record on line {}", idx + 1))?;
            let caption = record
                .response
                .as_ref()
                .filter(|r| r.status_code == 200)
                .and_then(|r| r.body.pointer(CAPTION_POINTER))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "No caption generated for file {} in output_file {}",
                        record.custom_id, file_id
                    )
                });
            Ok(CaptionRow {
                output_file_id: file_id.to_string(),
                input_filename: record.custom_id,
                caption,
            })
        })
        .collect()
}

pub async fn load_finished_captions(
    service: &dyn BatchService,
    file_id: &str,
) -> Result<Vec<CaptionRow>> {
    let content = service.file_content(file_id).await?;
    parse_captions(file_id, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_create_batch_request_sets_headers_and_body() {
        let client = OpenAiClient::new("sk-test".into()).unwrap();
        let request = client.build_create_batch_request("file-123").unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/batches");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer sk-test"
        );
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(body["input_file_id"], "file-123");
        assert_eq!(body["endpoint"], "/v1/responses");
        assert_eq!(body["completion_window"], "24h");
    }

    #[test]
    fn custom_base_url_is_respected() {
        let base = Url::parse("http://localhost:8080/proxy/").unwrap();
        let client = OpenAiClient::with_base_url("k".into(), base).unwrap();
        let request = client.build_create_batch_request("f").unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8080/proxy/v1/batches");
    }

    #[test]
    fn parse_captions_extracts_text_and_falls_back() {
        let content = concat!(
            r#"{"custom_id":"a.jpg","response":{"status_code":200,"body":{"output":[{"content":[{"text":"A red shoe."}]}]}}}"#,
            "\n",
            r#"{"custom_id":"b.png","response":{"status_code":500,"body":{}}}"#,
            "\n\n",
            r#"{"custom_id":"c.jpeg","response":null,"error":{"code":"x"}}"#,
            "\n",
        );
        let rows = parse_captions("file-out", content).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].input_filename, "a.jpg");
        assert_eq!(rows[0].caption, "A red shoe.");
        assert_eq!(rows[0].output_file_id, "file-out");
        assert_eq!(
            rows[1].caption,
            "No caption generated for file b.png in output_file file-out"
        );
        assert_eq!(
            rows[2].caption,
            "No caption generated for file c.jpeg in output_file file-out"
        );
    }

    #[test]
    fn parse_captions_rejects_malformed_lines() {
        let err = parse_captions("f", "{\"custom_id\": \"a\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
