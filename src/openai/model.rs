use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize, Debug, Clone)]
pub struct FileObject {
    pub id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    pub created_at: i64,
}

#[derive(Deserialize, Debug)]
pub struct BatchList {
    pub data: Vec<BatchJob>,
}

/// One line of a batch output file.
#[derive(Deserialize, Debug)]
pub struct ResponseLine {
    pub custom_id: String,
    #[serde(default)]
    pub response: Option<ResponseEnvelope>,
}

#[derive(Deserialize, Debug)]
pub struct ResponseEnvelope {
    pub status_code: u16,
    #[serde(default)]
    pub body: Value,
}

/// A caption correlated back to the archive entry it was generated for.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CaptionRow {
    pub output_file_id: String,
    pub input_filename: String,
    pub caption: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_job_ignores_fields_it_does_not_render() {
        let raw = r#"{
            "id": "batch_abc",
            "object": "batch",
            "endpoint": "/v1/responses",
            "input_file_id": "file-in",
            "error_file_id": null,
            "completion_window": "24h",
            "status": "completed",
            "output_file_id": "file-out",
            "created_at": 1700000000,
            "request_counts": {"total": 2, "completed": 2, "failed": 0}
        }"#;
        let job: BatchJob = serde_json::from_str(raw).unwrap();
        assert_eq!(
            job,
            BatchJob {
                id: "batch_abc".into(),
                status: "completed".into(),
                output_file_id: Some("file-out".into()),
                created_at: 1_700_000_000,
            }
        );

        let file: FileObject =
            serde_json::from_str(r#"{"id":"file-123","object":"file","bytes":42,"filename":"b.jsonl","purpose":"batch"}"#)
                .unwrap();
        assert_eq!(file.id, "file-123");
    }
}
