//! Turns a ZIP archive of images into a newline-delimited batch request file.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fs;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::model::RequestRecord;

const METADATA_DIR: &str = "__MACOSX/";
const SIDECAR_PREFIX: &str = "._";
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Archive-level failures. Nothing is written when one of these is returned.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read archive: {0}")]
    Archive(#[from] ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot serialize request record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid compile options: {0}")]
    Invalid(&'static str),
}

/// Failures isolated to a single archive entry; the entry is skipped.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("cannot open entry: {0}")]
    Open(#[source] ZipError),
    #[error("cannot read entry: {0}")]
    Read(#[source] std::io::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot encode JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub prompt: String,
    pub model: String,
    /// `(max_width, max_height)`
    pub max_size: (u32, u32),
    pub jpeg_quality: u8,
}

impl CompileOptions {
    fn validate(&self) -> Result<(), CompileError> {
        if self.model.trim().is_empty() {
            return Err(CompileError::Invalid("model must be non-empty"));
        }
        if self.max_size.0 == 0 || self.max_size.1 == 0 {
            return Err(CompileError::Invalid("max_size must be > 0 in both dimensions"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CompileError::Invalid("jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileSummary {
    /// Request records emitted.
    pub records: usize,
    /// Eligible entries dropped because of an [`EntryError`].
    pub failed: usize,
}

#[derive(Debug)]
pub struct Compiled {
    pub records: Vec<RequestRecord>,
    pub summary: CompileSummary,
}

/// Whether an archive entry should be treated as an image to caption.
pub fn is_eligible(name: &str) -> bool {
    if name.starts_with(METADATA_DIR) {
        return false;
    }
    let file_name = name.rsplit('/').next().unwrap_or(name);
    if file_name.starts_with(SIDECAR_PREFIX) {
        return false;
    }
    match file_name.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

/// Resize to exactly `max_size` when either dimension exceeds it; aspect ratio is not kept.
pub fn downsample(image: RgbImage, max_size: (u32, u32)) -> RgbImage {
    let (max_w, max_h) = max_size;
    if image.width() > max_w || image.height() > max_h {
        imageops::resize(&image, max_w, max_h, FilterType::Lanczos3)
    } else {
        image
    }
}

pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String, EntryError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .map_err(EntryError::Encode)?;
    Ok(BASE64.encode(&buf))
}

fn process_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    name: &str,
    opts: &CompileOptions,
) -> Result<RequestRecord, EntryError> {
    let mut bytes = Vec::new();
    {
        let mut file = archive.by_index(index).map_err(EntryError::Open)?;
        file.read_to_end(&mut bytes).map_err(EntryError::Read)?;
    }
    let image = image::load_from_memory(&bytes)
        .map_err(EntryError::Decode)?
        .to_rgb8();
    drop(bytes);
    let image = downsample(image, opts.max_size);
    let encoded = encode_jpeg_base64(&image, opts.jpeg_quality)?;
    Ok(RequestRecord::caption_request(
        name,
        &opts.model,
        &opts.prompt,
        &encoded,
    ))
}

/// Build one request record per eligible image, in central-directory order.
pub fn compile_records<R: Read + Seek>(
    reader: R,
    opts: &CompileOptions,
) -> Result<Compiled, CompileError> {
    opts.validate()?;
    let mut archive = ZipArchive::new(reader)?;

    let mut records = Vec::new();
    let mut failed = 0;
    for index in 0..archive.len() {
        let name = match archive.name_for_index(index) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if !is_eligible(&name) {
            debug!(entry = %name, "skipping non-image entry");
            continue;
        }
        match process_entry(&mut archive, index, &name, opts) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(entry = %name, error = %err, "skipping image");
                failed += 1;
            }
        }
    }

    let summary = CompileSummary {
        records: records.len(),
        failed,
    };
    Ok(Compiled { records, summary })
}

/// Write one compact JSON object per line.
pub fn write_jsonl<W: Write>(records: &[RequestRecord], mut out: W) -> Result<(), CompileError> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// `<batch_dir>/<YYYYMMDDTHHMMSSZ>_<8 hex chars><suffix>.jsonl`
pub fn generate_batch_filename(batch_dir: &Path, suffix: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let unique = Uuid::new_v4().simple().to_string();
    batch_dir.join(format!("{}_{}{}.jsonl", timestamp, &unique[..8], suffix))
}

/// Compile the archive at `zip_path` into a JSONL file and return its path.
/// Without `jsonl_path`, a fresh name under `batch_dir` is generated.
pub fn zip_to_jsonl(
    zip_path: &Path,
    jsonl_path: Option<&Path>,
    batch_dir: &Path,
    opts: &CompileOptions,
) -> Result<(PathBuf, CompileSummary), CompileError> {
    let archive = fs::File::open(zip_path)?;
    let compiled = compile_records(archive, opts)?;

    let path = match jsonl_path {
        Some(p) => p.to_path_buf(),
        None => generate_batch_filename(batch_dir, ""),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let out = BufWriter::new(fs::File::create(&path)?);
    write_jsonl(&compiled.records, out)?;

    let summary = compiled.summary;
    info!(
        records = summary.records,
        failed = summary.failed,
        path = %path.display(),
        "exported batch requests"
    );
    Ok((path, summary))
}

/// Compile an in-memory archive into an in-memory JSONL string.
pub fn zip_to_jsonl_stream(
    zip_bytes: &[u8],
    opts: &CompileOptions,
) -> Result<(String, CompileSummary), CompileError> {
    let compiled = compile_records(Cursor::new(zip_bytes), opts)?;
    let mut text = String::new();
    for record in &compiled.records {
        text.push_str(&serde_json::to_string(record)?);
        text.push('\n');
    }
    Ok((text, compiled.summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn eligibility_accepts_images_case_insensitively() {
        assert!(is_eligible("a.jpg"));
        assert!(is_eligible("dir/b.JPEG"));
        assert!(is_eligible("nested/deeper/c.Png"));
    }

    #[test]
    fn eligibility_rejects_metadata_and_other_files() {
        assert!(!is_eligible("__MACOSX/a.jpg"));
        assert!(!is_eligible("__MACOSX/photos/._a.jpg"));
        assert!(!is_eligible("photos/._a.jpg"));
        assert!(!is_eligible("._a.png"));
        assert!(!is_eligible("notes.txt"));
        assert!(!is_eligible("photos/"));
        assert!(!is_eligible("jpg"));
        assert!(!is_eligible("image.gif"));
    }

    #[test]
    fn eligibility_only_checks_metadata_dir_at_root() {
        assert!(is_eligible("photos/__MACOSX/a.jpg"));
    }

    #[test]
    fn downsample_keeps_small_images() {
        let img = RgbImage::from_pixel(40, 30, Rgb([10, 20, 30]));
        let out = downsample(img.clone(), (40, 30));
        assert_eq!(out.dimensions(), (40, 30));
        assert_eq!(out, img);
    }

    #[test]
    fn downsample_forces_exact_max_size() {
        let wide = RgbImage::from_pixel(200, 10, Rgb([0, 0, 0]));
        assert_eq!(downsample(wide, (64, 64)).dimensions(), (64, 64));

        let tall = RgbImage::from_pixel(10, 90, Rgb([0, 0, 0]));
        assert_eq!(downsample(tall, (64, 32)).dimensions(), (64, 32));
    }

    #[test]
    fn encoded_jpeg_decodes_back() {
        let img = RgbImage::from_pixel(16, 8, Rgb([200, 100, 50]));
        let b64 = encode_jpeg_base64(&img, 75).unwrap();
        let bytes = BASE64.decode(b64).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn batch_filename_format() {
        let path = generate_batch_filename(Path::new("batches"), "");
        assert_eq!(path.parent(), Some(Path::new("batches")));
        let name = path.file_name().unwrap().to_str().unwrap();
        // 20240101T000000Z_0123abcd.jsonl
        assert_eq!(name.len(), 16 + 1 + 8 + 6);
        assert!(name.ends_with(".jsonl"));
        let (stamp, rest) = name.split_once('_').unwrap();
        assert_eq!(stamp.len(), 16);
        assert_eq!(&stamp[8..9], "T");
        assert!(stamp.ends_with('Z'));
        assert!(rest[..8].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn invalid_options_rejected_before_reading() {
        let opts = CompileOptions {
            prompt: "p".into(),
            model: "m".into(),
            max_size: (0, 10),
            jpeg_quality: 75,
        };
        let err = compile_records(Cursor::new(Vec::<u8>::new()), &opts).unwrap_err();
        assert!(matches!(err, CompileError::Invalid(_)));
    }
}
