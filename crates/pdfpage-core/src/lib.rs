//! Page-level PDF editing built on lopdf.
//!
//! The pieces:
//! - `document`: loading (strict parse with a lenient fallback), inspection,
//!   metadata, and serialization
//! - `coords`: display-space to PDF-space mapping for interactive callers
//! - `compose`: page copy and reassembly (merge, extract, reorder, rotate)
//! - `overlay` / `batch`: appended content-stream stamps, one at a time or as
//!   an all-or-nothing batch
//! - `command`: a JSON command envelope for callers behind a serialization
//!   boundary
//!
//! Every editing operation is pure: it borrows a [`PdfDocument`] and returns
//! a new one.

pub mod batch;
pub mod command;
pub mod compose;
pub mod coords;
pub mod document;
pub mod error;
pub mod fonts;
pub mod images;
pub mod overlay;

pub use batch::{
    number_pages, BatchOrchestrator, BatchProgress, BatchState, BatchStep, NumberFormat,
    NumberPosition, PageNumberOptions,
};
pub use command::{process, process_json, PdfCommand, ProcessMetrics, ProcessResult};
pub use compose::{
    compose_document, crop_pages, rotate_pages, split_to_singles, CropMargins, PageSelection,
};
pub use coords::{DisplayPoint, DisplayRect, PdfPoint, PdfRect, RenderContext};
pub use document::{DocumentInfo, PageSize, PdfDocument, SourceKind};
pub use error::PdfPageError;
pub use images::{ImageData, ImageFormat};
pub use overlay::{
    apply_image, apply_rectangle, apply_text, apply_text_watermark, BoundsPolicy, TextAlignment,
    TextStyle, WatermarkOptions,
};

/// Parse PDF bytes and return the page count without keeping the document.
pub fn get_page_count(bytes: &[u8]) -> Result<usize, PdfPageError> {
    let doc = PdfDocument::load(bytes, SourceKind::Upload)?;
    Ok(doc.page_count())
}

/// Parse a 1-based page range string like "1-3, 5, 8-10" into sorted unique
/// 0-based page indices.
pub fn parse_page_ranges(input: &str) -> Result<Vec<usize>, PdfPageError> {
    use std::collections::BTreeSet;

    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start
                .trim()
                .parse()
                .map_err(|_| PdfPageError::InvalidRange(format!("invalid start: {}", start)))?;
            let end: usize = end
                .trim()
                .parse()
                .map_err(|_| PdfPageError::InvalidRange(format!("invalid end: {}", end)))?;
            if start == 0 || end == 0 {
                return Err(PdfPageError::InvalidRange(
                    "page numbers are 1-based".into(),
                ));
            }
            if start > end {
                return Err(PdfPageError::InvalidRange(format!(
                    "start {} > end {}",
                    start, end
                )));
            }
            for page in start..=end {
                pages.insert(page - 1);
            }
        } else {
            let page: usize = part
                .parse()
                .map_err(|_| PdfPageError::InvalidRange(format!("invalid page: {}", part)))?;
            if page == 0 {
                return Err(PdfPageError::InvalidRange(
                    "page numbers are 1-based".into(),
                ));
            }
            pages.insert(page - 1);
        }
    }

    if pages.is_empty() {
        return Err(PdfPageError::InvalidRange("no pages selected".into()));
    }
    Ok(pages.into_iter().collect())
}

#[cfg(test)]
pub(crate) mod testutil {
    use lopdf::{Dictionary, Object, Stream};

    pub struct TestPage {
        pub width: f64,
        pub height: f64,
        pub rotation: Option<i32>,
    }

    /// Build a well-formed single-tree PDF with one content stream per page.
    pub fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        let font_id = doc.add_object(Object::Dictionary(font));

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let content = format!("BT /F1 11 Tf 72 720 Td (Page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Object::Stream(Stream::new(
                Dictionary::new(),
                content.into_bytes(),
            )));

            let mut fonts = Dictionary::new();
            fonts.set("F1", Object::Reference(font_id));
            let mut resources = Dictionary::new();
            resources.set("Font", Object::Dictionary(fonts));

            let mut dict = Dictionary::new();
            dict.set("Type", Object::Name(b"Page".to_vec()));
            dict.set("Parent", Object::Reference(pages_id));
            dict.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(page.width as f32),
                    Object::Real(page.height as f32),
                ]),
            );
            dict.set("Resources", Object::Dictionary(resources));
            dict.set("Contents", Object::Reference(content_id));
            if let Some(rotation) = page.rotation {
                dict.set("Rotate", Object::Integer(rotation as i64));
            }
            kids.push(Object::Reference(doc.add_object(Object::Dictionary(dict))));
        }

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Count", Object::Integer(kids.len() as i64));
        pages_dict.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// `n` US Letter pages.
    pub fn pdf_with_pages(n: usize) -> Vec<u8> {
        let pages: Vec<TestPage> = (0..n)
            .map(|_| TestPage {
                width: 612.0,
                height: 792.0,
                rotation: None,
            })
            .collect();
        build_pdf(&pages)
    }

    /// US Letter pages with the given /Rotate values.
    pub fn pdf_with_rotations(rotations: &[i32]) -> Vec<u8> {
        let pages: Vec<TestPage> = rotations
            .iter()
            .map(|&rotation| TestPage {
                width: 612.0,
                height: 792.0,
                rotation: Some(rotation),
            })
            .collect();
        build_pdf(&pages)
    }

    /// Unrotated pages with the given (width, height) media boxes.
    pub fn pdf_with_sizes(sizes: &[(f64, f64)]) -> Vec<u8> {
        let pages: Vec<TestPage> = sizes
            .iter()
            .map(|&(width, height)| TestPage {
                width,
                height,
                rotation: None,
            })
            .collect();
        build_pdf(&pages)
    }

    /// A valid 8-bit RGB PNG with a gradient fill.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data: Vec<u8> = (0..width * height)
                .flat_map(|i| [(i % 256) as u8, (i / 2 % 256) as u8, 0x40])
                .collect();
            writer.write_image_data(&data).unwrap();
        }
        out
    }

    /// A structurally valid JPEG header: SOI, a single-component SOF0 frame
    /// carrying the dimensions, then EOI. Enough for marker scanning; not a
    /// decodable image.
    pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let h = (height as u16).to_be_bytes();
        let w = (width as u16).to_be_bytes();
        vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xC0, 0x00, 0x0B, // SOF0, length 11
            0x08, // precision
            h[0], h[1], w[0], w[1], 0x01, // 1 component
            0x01, 0x11, 0x00, // component entry
            0xFF, 0xD9, // EOI
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn page_count_from_bytes() {
        assert_eq!(get_page_count(&testutil::pdf_with_pages(4)).unwrap(), 4);
    }

    #[test]
    fn ranges_parse_to_zero_based_indices() {
        assert_eq!(parse_page_ranges("5").unwrap(), vec![4]);
        assert_eq!(parse_page_ranges("1-3").unwrap(), vec![0, 1, 2]);
        assert_eq!(
            parse_page_ranges("1-3, 5, 8-10").unwrap(),
            vec![0, 1, 2, 4, 7, 8, 9]
        );
    }

    #[test]
    fn ranges_deduplicate_overlaps() {
        assert_eq!(parse_page_ranges("1-3, 2-4").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn bad_ranges_are_rejected() {
        assert!(matches!(
            parse_page_ranges("3-1").unwrap_err(),
            PdfPageError::InvalidRange(_)
        ));
        assert!(matches!(
            parse_page_ranges("a-b").unwrap_err(),
            PdfPageError::InvalidRange(_)
        ));
        assert!(matches!(
            parse_page_ranges("0").unwrap_err(),
            PdfPageError::InvalidRange(_)
        ));
        assert!(matches!(
            parse_page_ranges("").unwrap_err(),
            PdfPageError::InvalidRange(_)
        ));
    }
}
