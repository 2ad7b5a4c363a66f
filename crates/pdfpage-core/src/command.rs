//! Self-describing command facade.
//!
//! Callers that cross a serialization boundary (job queues, worker threads,
//! RPC) drive the crate through one JSON command envelope instead of the
//! typed API. File payloads travel as base64; results come back as a
//! [`ProcessResult`] that folds errors into data rather than panicking or
//! bubbling, so the envelope is always serializable.

use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::{number_pages, PageNumberOptions};
use crate::compose::{compose_document, crop_pages, rotate_pages, CropMargins, PageSelection};
use crate::document::{PdfDocument, SourceKind};
use crate::error::PdfPageError;
use crate::overlay::{apply_text_watermark, WatermarkOptions};

/// One editing job, tagged by operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PdfCommand {
    /// Concatenate whole files in the given order.
    Merge { files: Vec<String> },
    /// Copy a subset of pages (0-based) into a new file.
    Extract {
        file: String,
        page_indices: Vec<usize>,
    },
    /// Reorder, duplicate, drop, and rotate pages in one pass.
    Organize {
        file: String,
        page_order: Vec<usize>,
        #[serde(default)]
        rotation_deltas: Option<Vec<i32>>,
    },
    /// Rotate every page by the same delta.
    Rotate { file: String, degrees: i32 },
    /// Shrink every page's visible area by edge margins.
    Crop {
        file: String,
        #[serde(default)]
        margins: CropMargins,
    },
    Watermark {
        file: String,
        text: String,
        #[serde(default)]
        options: WatermarkOptions,
    },
    PageNumbers {
        file: String,
        #[serde(default)]
        options: PageNumberOptions,
    },
}

impl PdfCommand {
    fn name(&self) -> &'static str {
        match self {
            PdfCommand::Merge { .. } => "merge",
            PdfCommand::Extract { .. } => "extract",
            PdfCommand::Organize { .. } => "organize",
            PdfCommand::Rotate { .. } => "rotate",
            PdfCommand::Crop { .. } => "crop",
            PdfCommand::Watermark { .. } => "watermark",
            PdfCommand::PageNumbers { .. } => "page-numbers",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: usize,
    pub processing_time_ms: u128,
}

/// Outcome envelope: either `data` (base64 PDF) or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: bool,
    pub data: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

/// Execute one command. Errors come back inside the result.
pub fn process(command: &PdfCommand) -> ProcessResult {
    let started = Instant::now();
    let name = command.name();
    match run(command) {
        Ok((bytes, input_size, page_count)) => {
            let metrics = ProcessMetrics {
                input_size_bytes: input_size,
                output_size_bytes: bytes.len(),
                page_count,
                processing_time_ms: started.elapsed().as_millis(),
            };
            info!(command = name, pages = page_count, "command processed");
            ProcessResult {
                success: true,
                data: Some(BASE64.encode(bytes)),
                error: None,
                metrics: Some(metrics),
            }
        }
        Err(e) => {
            warn!(command = name, error = %e, "command failed");
            ProcessResult {
                success: false,
                data: None,
                error: Some(e.to_string()),
                metrics: None,
            }
        }
    }
}

/// Parse and execute a JSON command string.
pub fn process_json(json: &str) -> ProcessResult {
    match serde_json::from_str::<PdfCommand>(json) {
        Ok(command) => process(&command),
        Err(e) => ProcessResult {
            success: false,
            data: None,
            error: Some(format!("invalid command: {}", e)),
            metrics: None,
        },
    }
}

fn run(command: &PdfCommand) -> Result<(Vec<u8>, usize, usize), PdfPageError> {
    match command {
        PdfCommand::Merge { files } => {
            let mut input_size = 0;
            let docs = files
                .iter()
                .map(|payload| {
                    let bytes = decode_payload(payload)?;
                    input_size += bytes.len();
                    PdfDocument::load(&bytes, SourceKind::Upload)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let selections: Vec<PageSelection> =
                docs.iter().map(PageSelection::all).collect();
            finish(compose_document(&selections)?, input_size)
        }
        PdfCommand::Extract { file, page_indices } => {
            let (doc, input_size) = load_payload(file)?;
            finish(
                compose_document(&[PageSelection::pages(&doc, page_indices.clone())])?,
                input_size,
            )
        }
        PdfCommand::Organize {
            file,
            page_order,
            rotation_deltas,
        } => {
            let (doc, input_size) = load_payload(file)?;
            let mut selection = PageSelection::pages(&doc, page_order.clone());
            if let Some(deltas) = rotation_deltas {
                selection = selection.with_rotations(deltas.clone());
            }
            finish(compose_document(&[selection])?, input_size)
        }
        PdfCommand::Rotate { file, degrees } => {
            let (doc, input_size) = load_payload(file)?;
            finish(rotate_pages(&doc, *degrees)?, input_size)
        }
        PdfCommand::Crop { file, margins } => {
            let (doc, input_size) = load_payload(file)?;
            finish(crop_pages(&doc, margins)?, input_size)
        }
        PdfCommand::Watermark {
            file,
            text,
            options,
        } => {
            let (doc, input_size) = load_payload(file)?;
            finish(apply_text_watermark(&doc, text, options)?, input_size)
        }
        PdfCommand::PageNumbers { file, options } => {
            let (doc, input_size) = load_payload(file)?;
            finish(number_pages(&doc, options)?, input_size)
        }
    }
}

fn finish(doc: PdfDocument, input_size: usize) -> Result<(Vec<u8>, usize, usize), PdfPageError> {
    let page_count = doc.page_count();
    Ok((doc.save()?, input_size, page_count))
}

fn decode_payload(payload: &str) -> Result<Vec<u8>, PdfPageError> {
    BASE64
        .decode(payload)
        .map_err(|e| PdfPageError::Serialization(format!("base64 decode failed: {}", e)))
}

fn load_payload(payload: &str) -> Result<(PdfDocument, usize), PdfPageError> {
    let bytes = decode_payload(payload)?;
    let size = bytes.len();
    Ok((PdfDocument::load(&bytes, SourceKind::Upload)?, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pdf_with_pages;
    use pretty_assertions::assert_eq;

    fn payload(pages: usize) -> String {
        BASE64.encode(pdf_with_pages(pages))
    }

    fn decode_result(result: &ProcessResult) -> PdfDocument {
        let bytes = BASE64.decode(result.data.as_ref().unwrap()).unwrap();
        PdfDocument::load(&bytes, SourceKind::ToolOutput).unwrap()
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: PdfCommand = serde_json::from_str(
            r#"{"type": "extract", "file": "QUJD", "page_indices": [0, 2]}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            PdfCommand::Extract {
                file: "QUJD".to_string(),
                page_indices: vec![0, 2],
            }
        );

        let cmd: PdfCommand = serde_json::from_str(
            r#"{"type": "organize", "file": "QUJD", "page_order": [1, 0]}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            PdfCommand::Organize {
                file: "QUJD".to_string(),
                page_order: vec![1, 0],
                rotation_deltas: None,
            }
        );

        let cmd: PdfCommand = serde_json::from_str(
            r#"{"type": "watermark", "file": "QUJD", "text": "DRAFT"}"#,
        )
        .unwrap();
        match cmd {
            PdfCommand::Watermark { options, .. } => {
                assert_eq!(options, WatermarkOptions::default());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn merge_command_concatenates_files() {
        let result = process(&PdfCommand::Merge {
            files: vec![payload(2), payload(3)],
        });
        assert!(result.success, "{:?}", result.error);

        let doc = decode_result(&result);
        assert_eq!(doc.page_count(), 5);

        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.page_count, 5);
        assert!(metrics.input_size_bytes > 0);
        assert!(metrics.output_size_bytes > 0);
    }

    #[test]
    fn extract_command_copies_selected_pages() {
        let result = process(&PdfCommand::Extract {
            file: payload(4),
            page_indices: vec![0, 3],
        });
        assert!(result.success, "{:?}", result.error);
        assert_eq!(decode_result(&result).page_count(), 2);
    }

    #[test]
    fn rotate_command_round_trips() {
        let result = process(&PdfCommand::Rotate {
            file: payload(2),
            degrees: 90,
        });
        assert!(result.success, "{:?}", result.error);

        let doc = decode_result(&result);
        assert_eq!(doc.page_rotation(0).unwrap(), 90);
        assert_eq!(doc.page_rotation(1).unwrap(), 90);
    }

    #[test]
    fn crop_command_writes_crop_boxes() {
        let cmd: PdfCommand = serde_json::from_str(
            r#"{"type": "crop", "file": "QUJD", "margins": {"top": 10, "left": 20}}"#,
        )
        .unwrap();
        match cmd {
            PdfCommand::Crop { margins, .. } => {
                assert_eq!(margins.top, 10.0);
                assert_eq!(margins.left, 20.0);
                assert_eq!(margins.right, 0.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let result = process(&PdfCommand::Crop {
            file: payload(2),
            margins: CropMargins {
                top: 36.0,
                right: 36.0,
                bottom: 36.0,
                left: 36.0,
            },
        });
        assert!(result.success, "{:?}", result.error);

        let doc = decode_result(&result);
        let page_id = doc.page_id(0).unwrap();
        let dict = doc.inner.get_object(page_id).unwrap().as_dict().unwrap();
        assert!(dict.has(b"CropBox"));
    }

    #[test]
    fn failures_fold_into_the_result() {
        let result = process(&PdfCommand::Extract {
            file: payload(2),
            page_indices: vec![7],
        });
        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().contains("7"));
    }

    #[test]
    fn bad_base64_is_an_error_not_a_panic() {
        let result = process(&PdfCommand::Rotate {
            file: "not base64!!!".to_string(),
            degrees: 90,
        });
        assert!(!result.success);
        assert!(result.error.unwrap().contains("base64"));
    }

    #[test]
    fn process_json_rejects_unknown_commands() {
        let result = process_json(r#"{"type": "shred", "file": "QUJD"}"#);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid command"));
    }
}
