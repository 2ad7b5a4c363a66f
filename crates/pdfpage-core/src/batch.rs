//! Sequenced application of overlay steps across a document.
//!
//! A batch is all-or-nothing: every step is validated and applied against a
//! working copy, and the input document is returned to the caller untouched
//! if any step fails. Steps are applied in ascending page order (stable for
//! steps on the same page) so content streams grow front-to-back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coords::{PdfPoint, PdfRect};
use crate::document::PdfDocument;
use crate::error::PdfPageError;
use crate::images::ImageData;
use crate::overlay::{self, BoundsPolicy, TextStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Progress snapshot passed to the caller after each applied step. Steps are
/// per-page operations, so these read as pages done out of pages total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub pages_done: usize,
    pub pages_total: usize,
    /// Page the just-finished step targeted.
    pub page_index: usize,
}

/// One overlay operation inside a batch.
#[derive(Debug, Clone)]
pub enum BatchStep {
    Text {
        page_index: usize,
        text: String,
        anchor: PdfPoint,
        style: TextStyle,
    },
    Rectangle {
        page_index: usize,
        rect: PdfRect,
        color: String,
        opacity: f64,
    },
    Image {
        page_index: usize,
        image: ImageData,
        rect: PdfRect,
        opacity: f64,
    },
}

impl BatchStep {
    pub fn page_index(&self) -> usize {
        match self {
            BatchStep::Text { page_index, .. }
            | BatchStep::Rectangle { page_index, .. }
            | BatchStep::Image { page_index, .. } => *page_index,
        }
    }
}

/// Runs batches of overlay steps and tracks the lifecycle of the last run.
#[derive(Debug)]
pub struct BatchOrchestrator {
    state: BatchState,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchOrchestrator {
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Apply `steps` to a copy of `doc` and return the stamped document.
    ///
    /// Every step's page index is validated up front, so a batch with a bad
    /// step fails before any work happens. Batches always use the
    /// [`BoundsPolicy::Reject`] policy; clamping is an interactive-session
    /// behavior, not a batch one.
    pub fn run(
        &mut self,
        doc: &PdfDocument,
        steps: &[BatchStep],
        mut on_progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<PdfDocument, PdfPageError> {
        self.state = BatchState::Running;
        match Self::run_inner(doc, steps, &mut on_progress) {
            Ok(out) => {
                self.state = BatchState::Completed;
                info!(steps = steps.len(), "batch completed");
                Ok(out)
            }
            Err(e) => {
                self.state = BatchState::Aborted;
                warn!(error = %e, "batch aborted, input document unchanged");
                Err(e)
            }
        }
    }

    fn run_inner(
        doc: &PdfDocument,
        steps: &[BatchStep],
        on_progress: &mut Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<PdfDocument, PdfPageError> {
        let page_count = doc.page_count();
        for step in steps {
            if step.page_index() >= page_count {
                return Err(PdfPageError::PageIndexOutOfRange {
                    index: step.page_index(),
                    page_count,
                });
            }
        }

        // Stable sort keeps same-page steps in submission order.
        let mut ordered: Vec<&BatchStep> = steps.iter().collect();
        ordered.sort_by_key(|step| step.page_index());

        let mut current = doc.clone_document();
        for (done, step) in ordered.iter().enumerate() {
            debug!(page = step.page_index(), "applying batch step");
            current = match step {
                BatchStep::Text {
                    page_index,
                    text,
                    anchor,
                    style,
                } => overlay::apply_text(
                    &current,
                    *page_index,
                    text,
                    *anchor,
                    style,
                    BoundsPolicy::Reject,
                )?,
                BatchStep::Rectangle {
                    page_index,
                    rect,
                    color,
                    opacity,
                } => overlay::apply_rectangle(
                    &current,
                    *page_index,
                    *rect,
                    color,
                    *opacity,
                    BoundsPolicy::Reject,
                )?,
                BatchStep::Image {
                    page_index,
                    image,
                    rect,
                    opacity,
                } => overlay::apply_image(
                    &current,
                    *page_index,
                    image,
                    *rect,
                    *opacity,
                    BoundsPolicy::Reject,
                )?,
            };
            if let Some(report) = on_progress.as_deref_mut() {
                report(BatchProgress {
                    pages_done: done + 1,
                    pages_total: ordered.len(),
                    page_index: step.page_index(),
                });
            }
        }
        Ok(current)
    }
}

/// Where a page number lands on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberFormat {
    /// "3"
    Numeric,
    /// "Page 3"
    PageN,
    /// "3 of 12"
    NOfTotal,
    /// "Page 3 of 12"
    PageNOfTotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageNumberOptions {
    pub position: NumberPosition,
    pub format: NumberFormat,
    /// Number given to the first page.
    pub start_at: usize,
    pub font_size: f64,
    pub color: String,
}

impl Default for PageNumberOptions {
    fn default() -> Self {
        Self {
            position: NumberPosition::BottomCenter,
            format: NumberFormat::Numeric,
            start_at: 1,
            font_size: 12.0,
            color: "#000000".to_string(),
        }
    }
}

const NUMBER_MARGIN: f64 = 20.0;

/// Stamp a page number on every page.
pub fn number_pages(
    doc: &PdfDocument,
    options: &PageNumberOptions,
) -> Result<PdfDocument, PdfPageError> {
    let total = doc.page_count();
    let style = TextStyle {
        font_size: options.font_size,
        color: options.color.clone(),
        ..TextStyle::default()
    };

    let mut current = doc.clone_document();
    for index in 0..total {
        let label = number_label(options.format, options.start_at + index, total);
        let size = current.effective_page_size(index)?;
        let width = style.measure(&label);
        let anchor = number_anchor(options.position, size.width, size.height, width, style.font_size);
        current = overlay::apply_text(
            &current,
            index,
            &label,
            anchor,
            &style,
            BoundsPolicy::Clamp,
        )?;
    }
    Ok(current)
}

fn number_label(format: NumberFormat, n: usize, total: usize) -> String {
    match format {
        NumberFormat::Numeric => n.to_string(),
        NumberFormat::PageN => format!("Page {}", n),
        NumberFormat::NOfTotal => format!("{} of {}", n, total),
        NumberFormat::PageNOfTotal => format!("Page {} of {}", n, total),
    }
}

fn number_anchor(
    position: NumberPosition,
    page_width: f64,
    page_height: f64,
    text_width: f64,
    font_size: f64,
) -> PdfPoint {
    use NumberPosition::*;
    let x = match position {
        TopLeft | BottomLeft => NUMBER_MARGIN,
        TopCenter | BottomCenter => (page_width - text_width) / 2.0,
        TopRight | BottomRight => page_width - NUMBER_MARGIN - text_width,
    };
    // Baseline sits a text height below the top margin, or on the bottom one.
    let y = match position {
        TopLeft | TopCenter | TopRight => page_height - NUMBER_MARGIN - font_size,
        BottomLeft | BottomCenter | BottomRight => NUMBER_MARGIN,
    };
    PdfPoint { x, y }
}
