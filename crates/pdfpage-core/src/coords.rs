//! Display-space / PDF-space coordinate mapping.
//!
//! Display space is what an interactive viewer works in: pixels, top-left
//! origin, y growing downward, scaled by a zoom factor. PDF space is points
//! with a bottom-left origin and y growing upward. The rendered raster
//! already reflects the page's intrinsic rotation (rotation happens before
//! rasterization), so no rotation matrix is involved here; the context just
//! has to carry the *effective* page box, with width and height swapped for
//! 90 and 270 degree pages.

use serde::{Deserialize, Serialize};

use crate::document::PdfDocument;
use crate::error::PdfPageError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// An axis-aligned rectangle in PDF space; `(x, y)` is the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Ephemeral per-page-view transform context.
///
/// `page_width` and `page_height` are the effective page box in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub scale: f64,
    pub page_width: f64,
    pub page_height: f64,
    pub rotation: i32,
}

impl RenderContext {
    pub fn new(
        scale: f64,
        page_width: f64,
        page_height: f64,
        rotation: i32,
    ) -> Result<Self, PdfPageError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(PdfPageError::Operation(format!(
                "render scale must be positive and finite, got {}",
                scale
            )));
        }
        Ok(Self {
            scale,
            page_width,
            page_height,
            rotation: crate::document::normalize_rotation(rotation),
        })
    }

    /// Build a context for one page of a document, feeding the effective
    /// page box so rotated pages map correctly.
    pub fn for_page(
        doc: &PdfDocument,
        page_index: usize,
        scale: f64,
    ) -> Result<Self, PdfPageError> {
        let size = doc.effective_page_size(page_index)?;
        Self::new(scale, size.width, size.height, doc.page_rotation(page_index)?)
    }

    pub fn to_pdf_point(&self, p: DisplayPoint) -> PdfPoint {
        PdfPoint {
            x: p.x / self.scale,
            y: self.page_height - p.y / self.scale,
        }
    }

    pub fn to_display_point(&self, p: PdfPoint) -> DisplayPoint {
        DisplayPoint {
            x: p.x * self.scale,
            y: (self.page_height - p.y) * self.scale,
        }
    }

    /// Map a display rectangle into PDF space.
    ///
    /// The PDF-space origin comes from the rectangle's *bottom* edge:
    /// `y = page_height - (display_y + display_h) / scale`. Deriving it from
    /// the top edge would shift the box down by its own height.
    pub fn to_pdf_rect(&self, r: DisplayRect) -> PdfRect {
        PdfRect {
            x: r.x / self.scale,
            y: self.page_height - (r.y + r.height) / self.scale,
            width: r.width / self.scale,
            height: r.height / self.scale,
        }
    }

    pub fn to_display_rect(&self, r: PdfRect) -> DisplayRect {
        DisplayRect {
            x: r.x * self.scale,
            y: (self.page_height - (r.y + r.height)) * self.scale,
            width: r.width * self.scale,
            height: r.height * self.scale,
        }
    }

    /// Display-space size of the whole page at this context's scale.
    pub fn display_bounds(&self) -> (f64, f64) {
        (self.page_width * self.scale, self.page_height * self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceKind;
    use crate::testutil::pdf_with_rotations;
    use proptest::prelude::*;

    const TOL: f64 = 1e-6;

    fn letter_ctx(scale: f64) -> RenderContext {
        RenderContext::new(scale, 612.0, 792.0, 0).unwrap()
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(RenderContext::new(0.0, 612.0, 792.0, 0).is_err());
        assert!(RenderContext::new(-1.5, 612.0, 792.0, 0).is_err());
        assert!(RenderContext::new(f64::NAN, 612.0, 792.0, 0).is_err());
    }

    #[test]
    fn point_maps_to_bottom_left_origin() {
        let ctx = letter_ctx(2.0);
        // Top-left display corner is the top-left of the page in PDF space.
        let p = ctx.to_pdf_point(DisplayPoint { x: 0.0, y: 0.0 });
        assert!((p.x - 0.0).abs() < TOL);
        assert!((p.y - 792.0).abs() < TOL);

        // Bottom of the display raster is y = 0 in PDF space.
        let p = ctx.to_pdf_point(DisplayPoint { x: 100.0, y: 1584.0 });
        assert!((p.x - 50.0).abs() < TOL);
        assert!(p.y.abs() < TOL);
    }

    #[test]
    fn rect_origin_comes_from_bottom_edge() {
        // Display rect (10, 20, 30, 40) at scale 1.5 on an 800pt-tall page
        // must land at y = 800 - (20 + 40) / 1.5, not y = 800 - 20 / 1.5.
        let ctx = RenderContext::new(1.5, 600.0, 800.0, 0).unwrap();
        let r = ctx.to_pdf_rect(DisplayRect {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        });
        assert!((r.y - (800.0 - 60.0 / 1.5)).abs() < TOL);
        assert!((r.x - 10.0 / 1.5).abs() < TOL);
        assert!((r.width - 20.0).abs() < TOL);
        assert!((r.height - 40.0 / 1.5).abs() < TOL);
    }

    #[test]
    fn for_page_uses_effective_box_of_rotated_page() {
        let bytes = pdf_with_rotations(&[90]);
        let doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        let ctx = RenderContext::for_page(&doc, 0, 1.0).unwrap();
        assert_eq!(ctx.page_width, 792.0);
        assert_eq!(ctx.page_height, 612.0);
        assert_eq!(ctx.rotation, 90);
    }

    proptest! {
        #[test]
        fn point_round_trip(
            scale in 1e-3f64..5.0,
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
        ) {
            let ctx = letter_ctx(scale);
            let (max_x, max_y) = ctx.display_bounds();
            let p = DisplayPoint { x: fx * max_x, y: fy * max_y };
            let back = ctx.to_display_point(ctx.to_pdf_point(p));
            prop_assert!((back.x - p.x).abs() < TOL);
            prop_assert!((back.y - p.y).abs() < TOL);
        }

        #[test]
        fn rect_round_trip(
            scale in 1e-3f64..5.0,
            fx in 0.0f64..0.5,
            fy in 0.0f64..0.5,
            fw in 0.0f64..0.5,
            fh in 0.0f64..0.5,
        ) {
            let ctx = letter_ctx(scale);
            let (max_x, max_y) = ctx.display_bounds();
            let r = DisplayRect {
                x: fx * max_x,
                y: fy * max_y,
                width: fw * max_x,
                height: fh * max_y,
            };
            let back = ctx.to_display_rect(ctx.to_pdf_rect(r));
            prop_assert!((back.x - r.x).abs() < TOL);
            prop_assert!((back.y - r.y).abs() < TOL);
            prop_assert!((back.width - r.width).abs() < TOL);
            prop_assert!((back.height - r.height).abs() < TOL);
        }
    }
}
