//! Document loading, inspection, and serialization.
//!
//! Wraps `lopdf::Document` behind a page-index oriented API. Loading tries a
//! strict structural parse first and falls back to a lenient pass that strips
//! the byte-level damage we see most often in the wild (junk before the
//! `%PDF-` header, junk after the final `%%EOF`).

use chrono::Utc;
use lopdf::{Dictionary, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PdfPageError;
use crate::images::{embed_image, ImageData};

/// Where a document's bytes came from. Resolved once at ingestion; operations
/// never re-sniff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Upload,
    CameraScan,
    Generated,
    ToolOutput,
}

/// Intrinsic page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Document-level metadata from the Info dictionary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
}

/// An in-memory PDF document.
///
/// All editing operations in this crate are pure: they borrow a `PdfDocument`
/// and return a new one. Nothing mutates a document in place except the
/// metadata setters, which are a load-time concern.
#[derive(Debug)]
pub struct PdfDocument {
    pub(crate) inner: lopdf::Document,
    source_kind: SourceKind,
}

impl PdfDocument {
    /// Parse a byte buffer into a document.
    ///
    /// Strict parse first; on failure a lenient pass trims leading and
    /// trailing garbage and retries. An `/Encrypt` dictionary in the trailer
    /// is reported as [`PdfPageError::EncryptedDocument`] so callers can
    /// prompt for a password rather than suggest repair.
    pub fn load(bytes: &[u8], source_kind: SourceKind) -> Result<Self, PdfPageError> {
        debug!(len = bytes.len(), ?source_kind, "loading document");

        let inner = match lopdf::Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                let msg = e.to_string();
                if msg.to_lowercase().contains("encrypt") {
                    return Err(PdfPageError::EncryptedDocument);
                }
                Self::load_lenient(bytes, &msg)?
            }
        };

        if inner.trailer.get(b"Encrypt").is_ok() {
            return Err(PdfPageError::EncryptedDocument);
        }

        let doc = Self { inner, source_kind };
        info!(pages = doc.page_count(), "document loaded");
        Ok(doc)
    }

    /// Lenient fallback parse: strip bytes before the `%PDF-` header and
    /// after the last `%%EOF`, then retry.
    fn load_lenient(bytes: &[u8], strict_error: &str) -> Result<lopdf::Document, PdfPageError> {
        let repaired = sanitize_bytes(bytes)
            .ok_or_else(|| PdfPageError::CorruptDocument(strict_error.to_string()))?;

        debug!(
            original = bytes.len(),
            repaired = repaired.len(),
            "strict parse failed, retrying on sanitized bytes"
        );

        lopdf::Document::load_mem(repaired).map_err(|e| {
            let msg = e.to_string();
            if msg.to_lowercase().contains("encrypt") {
                PdfPageError::EncryptedDocument
            } else {
                PdfPageError::CorruptDocument(msg)
            }
        })
    }

    /// Build a document from images, one page per image, each page sized to
    /// its image and the image drawn full-page.
    pub fn from_images(images: &[ImageData]) -> Result<Self, PdfPageError> {
        if images.is_empty() {
            return Err(PdfPageError::Operation("no images supplied".into()));
        }

        let mut doc = lopdf::Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::with_capacity(images.len());

        for image in images {
            let (image_id, width, height) = embed_image(&mut doc, image)?;
            let name = format!("Im{}", image_id.0);

            let content = format!("q\n{} 0 0 {} 0 0 cm\n/{} Do\nQ", width, height, name);
            let content_id = doc.add_object(Object::Stream(lopdf::Stream::new(
                Dictionary::new(),
                content.into_bytes(),
            )));

            let mut xobjects = Dictionary::new();
            xobjects.set(name, Object::Reference(image_id));
            let mut resources = Dictionary::new();
            resources.set("XObject", Object::Dictionary(xobjects));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width as f32),
                    Object::Real(height as f32),
                ]),
            );
            page.set("Resources", Object::Dictionary(resources));
            page.set("Contents", Object::Reference(content_id));
            kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(kids.len() as i64));
        pages.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Ok(Self {
            inner: doc,
            source_kind: SourceKind::Generated,
        })
    }

    /// Deep working copy, keeping the source tag.
    pub fn clone_document(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            source_kind: self.source_kind,
        }
    }

    pub(crate) fn from_inner(inner: lopdf::Document) -> Self {
        Self {
            inner,
            source_kind: SourceKind::ToolOutput,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// Object id of the page at a 0-based index.
    pub(crate) fn page_id(&self, index: usize) -> Result<ObjectId, PdfPageError> {
        let pages = self.inner.get_pages();
        pages
            .get(&(index as u32 + 1))
            .copied()
            .ok_or(PdfPageError::PageIndexOutOfRange {
                index,
                page_count: pages.len(),
            })
    }

    /// Intrinsic page size in points, from the MediaBox (inherited from the
    /// page-tree parent when the page dictionary omits it).
    pub fn page_size(&self, index: usize) -> Result<PageSize, PdfPageError> {
        let page_id = self.page_id(index)?;
        let dict = self.page_dict(page_id)?;
        let media_box = resolve_media_box(&self.inner, dict);
        Ok(PageSize {
            width: media_box[2] - media_box[0],
            height: media_box[3] - media_box[1],
        })
    }

    /// Page rotation, normalized to {0, 90, 180, 270}.
    pub fn page_rotation(&self, index: usize) -> Result<i32, PdfPageError> {
        let page_id = self.page_id(index)?;
        let dict = self.page_dict(page_id)?;
        Ok(resolve_rotation(&self.inner, dict))
    }

    /// Page size after accounting for rotation: width and height swap at
    /// 90 and 270 degrees.
    pub fn effective_page_size(&self, index: usize) -> Result<PageSize, PdfPageError> {
        let size = self.page_size(index)?;
        match self.page_rotation(index)? {
            90 | 270 => Ok(PageSize {
                width: size.height,
                height: size.width,
            }),
            _ => Ok(size),
        }
    }

    fn page_dict(&self, page_id: ObjectId) -> Result<&Dictionary, PdfPageError> {
        self.inner
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| PdfPageError::Operation(format!("invalid page object: {}", e)))
    }

    /// Serialize with the plain object layout.
    pub fn save(&self) -> Result<Vec<u8>, PdfPageError> {
        let mut doc = self.inner.clone();
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| PdfPageError::Serialization(e.to_string()))?;
        Ok(buffer)
    }

    /// Serialize with unreachable objects pruned and streams
    /// Flate-compressed, for smaller output.
    pub fn save_compressed(&self) -> Result<Vec<u8>, PdfPageError> {
        let mut doc = self.inner.clone();
        doc.prune_objects();
        doc.compress();
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| PdfPageError::Serialization(e.to_string()))?;
        Ok(buffer)
    }

    /// Metadata snapshot from the Info dictionary.
    pub fn info(&self) -> DocumentInfo {
        let mut out = DocumentInfo {
            page_count: self.page_count(),
            ..DocumentInfo::default()
        };
        if let Some(dict) = self.info_dict() {
            out.title = info_string(dict, b"Title");
            out.author = info_string(dict, b"Author");
            out.subject = info_string(dict, b"Subject");
            out.creator = info_string(dict, b"Creator");
            out.creation_date = info_string(dict, b"CreationDate");
            out.modification_date = info_string(dict, b"ModDate");
        }
        out
    }

    pub fn set_title(&mut self, title: &str) {
        self.set_info_entry("Title", title);
    }

    pub fn set_author(&mut self, author: &str) {
        self.set_info_entry("Author", author);
    }

    fn info_dict(&self) -> Option<&Dictionary> {
        let info_id = self.inner.trailer.get(b"Info").ok()?.as_reference().ok()?;
        self.inner.get_object(info_id).ok()?.as_dict().ok()
    }

    fn set_info_entry(&mut self, key: &str, value: &str) {
        let info_id = match self
            .inner
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
        {
            Ok(id) => id,
            Err(_) => {
                let id = self.inner.add_object(Object::Dictionary(Dictionary::new()));
                self.inner.trailer.set("Info", Object::Reference(id));
                id
            }
        };
        if let Ok(Object::Dictionary(dict)) = self.inner.get_object_mut(info_id) {
            dict.set(
                key,
                Object::String(value.as_bytes().to_vec(), lopdf::StringFormat::Literal),
            );
            dict.set(
                "ModDate",
                Object::String(pdf_date_now().into_bytes(), lopdf::StringFormat::Literal),
            );
        }
    }
}

/// Current time as a PDF date string (`D:YYYYMMDDHHMMSSZ`).
fn pdf_date_now() -> String {
    format!("D:{}", Utc::now().format("%Y%m%d%H%M%SZ"))
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Trim leading bytes before `%PDF-` and trailing bytes after the last
/// `%%EOF`. Returns `None` when the buffer does not even contain a header.
fn sanitize_bytes(bytes: &[u8]) -> Option<&[u8]> {
    let start = find_subslice(bytes, b"%PDF-")?;
    let tail = &bytes[start..];
    let eof = rfind_subslice(tail, b"%%EOF")?;
    Some(&tail[..eof + b"%%EOF".len()])
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Read an inheritable page attribute, walking up the page-tree Parent chain.
pub(crate) fn inherited_entry(
    doc: &lopdf::Document,
    page_dict: &Dictionary,
    key: &[u8],
) -> Option<Object> {
    let mut dict = page_dict.clone();
    loop {
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_object(parent_id).ok()?.as_dict().ok()?.clone();
    }
}

/// MediaBox as `[x1, y1, x2, y2]`, defaulting to US Letter when absent.
pub(crate) fn resolve_media_box(doc: &lopdf::Document, page_dict: &Dictionary) -> [f64; 4] {
    if let Some(Object::Array(array)) = inherited_entry(doc, page_dict, b"MediaBox") {
        if let Some(parsed) = parse_box_array(&array) {
            return parsed;
        }
    }
    [0.0, 0.0, 612.0, 792.0]
}

fn parse_box_array(array: &[Object]) -> Option<[f64; 4]> {
    if array.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        out[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return None,
        };
    }
    Some(out)
}

/// Intrinsic page rotation with parent inheritance, normalized mod 360.
pub(crate) fn resolve_rotation(doc: &lopdf::Document, page_dict: &Dictionary) -> i32 {
    match inherited_entry(doc, page_dict, b"Rotate") {
        Some(Object::Integer(angle)) => normalize_rotation(angle as i32),
        _ => 0,
    }
}

/// Normalize an angle to {0, 90, 180, 270}.
pub(crate) fn normalize_rotation(angle: i32) -> i32 {
    angle.rem_euclid(360)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pdf_with_pages, png_bytes};

    #[test]
    fn loads_well_formed_document() {
        let bytes = pdf_with_pages(3);
        let doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.source_kind(), SourceKind::Upload);
    }

    #[test]
    fn random_bytes_are_corrupt() {
        let err = PdfDocument::load(b"this is not a pdf at all", SourceKind::Upload).unwrap_err();
        assert!(matches!(err, PdfPageError::CorruptDocument(_)));
    }

    #[test]
    fn lenient_load_recovers_wrapped_bytes() {
        let mut bytes = b"<!-- mail gateway preamble -->\n".to_vec();
        bytes.extend_from_slice(&pdf_with_pages(2));
        bytes.extend_from_slice(&vec![0xAB; 9000]);

        let doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn encrypted_trailer_is_reported_distinctly() {
        let bytes = pdf_with_pages(1);
        let mut inner = lopdf::Document::load_mem(&bytes).unwrap();
        let enc_id = inner.add_object(Object::Dictionary(Dictionary::new()));
        inner.trailer.set("Encrypt", Object::Reference(enc_id));

        assert!(inner.trailer.get(b"Encrypt").is_ok());
        // The load path classifies this trailer as encrypted, not corrupt.
        let doc = PdfDocument {
            inner,
            source_kind: SourceKind::Upload,
        };
        let reserialized = doc.save().unwrap();
        let err = PdfDocument::load(&reserialized, SourceKind::Upload).unwrap_err();
        assert!(matches!(err, PdfPageError::EncryptedDocument));
    }

    #[test]
    fn page_size_reads_media_box() {
        let bytes = pdf_with_pages(1);
        let doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        let size = doc.page_size(0).unwrap();
        assert_eq!(size.width, 612.0);
        assert_eq!(size.height, 792.0);
    }

    #[test]
    fn page_size_out_of_range_fails() {
        let bytes = pdf_with_pages(2);
        let doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        let err = doc.page_size(2).unwrap_err();
        assert!(matches!(
            err,
            PdfPageError::PageIndexOutOfRange {
                index: 2,
                page_count: 2
            }
        ));
    }

    #[test]
    fn effective_size_swaps_for_rotated_pages() {
        let bytes = crate::testutil::pdf_with_rotations(&[90]);
        let doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        let size = doc.effective_page_size(0).unwrap();
        assert_eq!(size.width, 792.0);
        assert_eq!(size.height, 612.0);
    }

    #[test]
    fn normalize_rotation_wraps_and_handles_negatives() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(-450), 270);
    }

    #[test]
    fn metadata_round_trip() {
        let bytes = pdf_with_pages(1);
        let mut doc = PdfDocument::load(&bytes, SourceKind::Upload).unwrap();
        doc.set_title("Quarterly Report");
        doc.set_author("Accounts");

        let saved = doc.save().unwrap();
        let reloaded = PdfDocument::load(&saved, SourceKind::ToolOutput).unwrap();
        let info = reloaded.info();
        assert_eq!(info.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(info.author.as_deref(), Some("Accounts"));
        assert!(info.modification_date.unwrap().starts_with("D:20"));
    }

    #[test]
    fn from_images_builds_one_page_per_image() {
        let png = ImageData::sniff(png_bytes(4, 6)).unwrap();
        let doc = PdfDocument::from_images(&[png]).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.source_kind(), SourceKind::Generated);

        let size = doc.page_size(0).unwrap();
        assert_eq!(size.width, 4.0);
        assert_eq!(size.height, 6.0);

        let saved = doc.save().unwrap();
        assert!(saved.starts_with(b"%PDF-"));
        let reloaded = PdfDocument::load(&saved, SourceKind::ToolOutput).unwrap();
        assert_eq!(reloaded.page_count(), 1);
    }
}
