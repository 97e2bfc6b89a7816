//! Plain-text tables for terminal output.
use chrono::{DateTime, SecondsFormat};

use crate::openai::model::{BatchJob, CaptionRow};

pub fn render_batches(jobs: &[BatchJob]) -> String {
    let rows: Vec<Vec<String>> = jobs
        .iter()
        .map(|job| {
            vec![
                job.id.clone(),
                job.status.clone(),
                job.output_file_id.clone().unwrap_or_default(),
                format_timestamp(job.created_at),
            ]
        })
        .collect();
    render(&["id", "status", "output_file_id", "created_at"], &rows)
}

pub fn render_captions(rows: &[CaptionRow]) -> String {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.output_file_id.clone(),
                r.input_filename.clone(),
                r.caption.clone(),
            ]
        })
        .collect();
    render(&["OUTPUT_FILE_ID", "INPUT_FILENAME", "CAPTION"], &rows)
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_table_has_header_and_padded_rows() {
        let jobs = vec![
            BatchJob {
                id: "batch_1".into(),
                status: "completed".into(),
                output_file_id: Some("file-out".into()),
                created_at: 1_700_000_000,
            },
            BatchJob {
                id: "batch_22".into(),
                status: "validating".into(),
                output_file_id: None,
                created_at: 0,
            },
        ];
        let text = render_batches(&jobs);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("id        status      output_file_id  created_at"));
        assert!(lines[1].starts_with("--------"));
        assert!(lines[2].contains("file-out"));
        assert!(lines[2].ends_with("2023-11-14T22:13:20Z"));
        assert!(lines[3].ends_with("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn captions_table_keeps_caption_last() {
        let rows = vec![CaptionRow {
            output_file_id: "file-out".into(),
            input_filename: "shoes/a.jpg".into(),
            caption: "A red shoe.".into(),
        }];
        let text = render_captions(&rows);
        assert!(text.starts_with("OUTPUT_FILE_ID  INPUT_FILENAME  CAPTION\n"));
        assert!(text.lines().nth(2).unwrap().ends_with("shoes/a.jpg     A red shoe."));
    }

    #[test]
    fn empty_table_is_header_only() {
        assert_eq!(render_captions(&[]).lines().count(), 2);
    }
}
