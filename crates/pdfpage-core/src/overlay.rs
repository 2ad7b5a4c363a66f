//! Overlay stamping: text runs, painted rectangles, and images.
//!
//! Overlays are appended content streams; the existing page content is never
//! rewritten. That makes the rectangle overlay **visual-only**: it paints
//! over content but deletes nothing, so a "redaction" built on it must be
//! flagged as non-secure at the UI layer. Opacity goes through a per-page
//! ExtGState, text through the standard-14 fonts with measured AFM widths.

use lopdf::{Dictionary, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::{PdfPoint, PdfRect};
use crate::document::PdfDocument;
use crate::error::PdfPageError;
use crate::fonts;
use crate::images::{embed_image, ImageData};

/// Horizontal placement of a text run relative to its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// What to do with overlay coordinates that fall outside the page.
///
/// Interactive tools typically clamp so a drag that overshoots the page edge
/// still lands; batch callers reject so bad input surfaces as an error. The
/// choice is always the caller's, never implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsPolicy {
    Clamp,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_size: f64,
    /// Hex color like "#1A2B3C"; unparseable values fall back to black.
    pub color: String,
    /// Requested font family; mapped to a standard-14 font.
    pub font_name: Option<String>,
    pub is_bold: bool,
    pub is_italic: bool,
    pub opacity: f64,
    /// Rotation in degrees about the text's own anchor point, independent of
    /// page rotation.
    pub rotation_degrees: f64,
    pub alignment: TextAlignment,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: "#000000".to_string(),
            font_name: None,
            is_bold: false,
            is_italic: false,
            opacity: 1.0,
            rotation_degrees: 0.0,
            alignment: TextAlignment::Left,
        }
    }
}

impl TextStyle {
    /// The standard-14 BaseFont this style resolves to.
    pub fn resolved_font(&self) -> &'static str {
        fonts::resolve_font(self.font_name.as_deref(), self.is_bold, self.is_italic)
    }

    /// Width of `text` in points when set in this style's font and size.
    pub fn measure(&self, text: &str) -> f64 {
        fonts::text_width(text, self.resolved_font(), self.font_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkOptions {
    pub opacity: f64,
    pub font_size: f64,
    pub rotation_degrees: f64,
    pub color: String,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            opacity: 0.3,
            font_size: 50.0,
            rotation_degrees: -45.0,
            color: "#808080".to_string(),
        }
    }
}

/// Stamp a text run at `anchor` (PDF space) on one page.
pub fn apply_text(
    doc: &PdfDocument,
    page_index: usize,
    text: &str,
    anchor: PdfPoint,
    style: &TextStyle,
    bounds: BoundsPolicy,
) -> Result<PdfDocument, PdfPageError> {
    let page_id = doc.page_id(page_index)?;
    let size = doc.effective_page_size(page_index)?;
    let anchor = check_point(anchor, size.width, size.height, bounds)?;

    let mut inner = doc.inner.clone();
    let font = style.resolved_font();
    let font_name = ensure_font(&mut inner, page_id, font)?;
    let gs_name = ensure_ext_gstate(&mut inner, page_id, style.opacity)?;

    // Alignment shifts the start of the run in *text space*, before the
    // rotation matrix applies, so a centered string stays visually centered
    // when rotated about its anchor.
    let width = style.measure(text);
    let shift = match style.alignment {
        TextAlignment::Left => 0.0,
        TextAlignment::Center => -width / 2.0,
        TextAlignment::Right => -width,
    };

    let (r, g, b) = parse_hex_color(&style.color);
    let theta = style.rotation_degrees.to_radians();
    let (sin, cos) = (theta.sin(), theta.cos());

    let content = format!(
        "q\n/{gs} gs\nBT\n/{f} {size} Tf\n{r} {g} {b} rg\n\
         {cos} {sin} {nsin} {cos} {x} {y} Tm\n{shift} 0 Td\n({text}) Tj\nET\nQ",
        gs = gs_name,
        f = font_name,
        size = num(style.font_size),
        r = num(r as f64),
        g = num(g as f64),
        b = num(b as f64),
        cos = num(cos),
        sin = num(sin),
        nsin = num(-sin),
        x = num(anchor.x),
        y = num(anchor.y),
        shift = num(shift),
        text = escape_pdf_text(text),
    );
    append_content(&mut inner, page_id, content)?;

    debug!(page = page_index, font, "applied text overlay");
    Ok(PdfDocument::from_inner(inner))
}

/// Paint an opaque rectangle over the page content.
///
/// Visual-only by contract: the covered text and image objects remain in the
/// file and are recoverable by anyone with the bytes.
pub fn apply_rectangle(
    doc: &PdfDocument,
    page_index: usize,
    rect: PdfRect,
    color: &str,
    opacity: f64,
    bounds: BoundsPolicy,
) -> Result<PdfDocument, PdfPageError> {
    let page_id = doc.page_id(page_index)?;
    let size = doc.effective_page_size(page_index)?;
    let rect = check_rect(rect, size.width, size.height, bounds)?;

    let mut inner = doc.inner.clone();
    let gs_name = ensure_ext_gstate(&mut inner, page_id, opacity)?;
    let (r, g, b) = parse_hex_color(color);

    let content = format!(
        "q\n/{gs} gs\n{r} {g} {b} rg\n{x} {y} {w} {h} re\nf\nQ",
        gs = gs_name,
        r = num(r as f64),
        g = num(g as f64),
        b = num(b as f64),
        x = num(rect.x),
        y = num(rect.y),
        w = num(rect.width),
        h = num(rect.height),
    );
    append_content(&mut inner, page_id, content)?;

    debug!(page = page_index, "applied rectangle overlay");
    Ok(PdfDocument::from_inner(inner))
}

/// Stamp a PNG or JPEG into `rect` on one page. Used for image watermarks,
/// signatures, and logos.
pub fn apply_image(
    doc: &PdfDocument,
    page_index: usize,
    image: &ImageData,
    rect: PdfRect,
    opacity: f64,
    bounds: BoundsPolicy,
) -> Result<PdfDocument, PdfPageError> {
    let page_id = doc.page_id(page_index)?;
    let size = doc.effective_page_size(page_index)?;
    let rect = check_rect(rect, size.width, size.height, bounds)?;

    let mut inner = doc.inner.clone();
    let (image_id, _, _) = embed_image(&mut inner, image)?;
    let name = format!("Im{}", image_id.0);
    upsert_resource(&mut inner, page_id, b"XObject", name.clone(), image_id)?;
    let gs_name = ensure_ext_gstate(&mut inner, page_id, opacity)?;

    let content = format!(
        "q\n/{gs} gs\n{w} 0 0 {h} {x} {y} cm\n/{name} Do\nQ",
        gs = gs_name,
        w = num(rect.width),
        h = num(rect.height),
        x = num(rect.x),
        y = num(rect.y),
        name = name,
    );
    append_content(&mut inner, page_id, content)?;

    debug!(page = page_index, "applied image overlay");
    Ok(PdfDocument::from_inner(inner))
}

/// Stamp a rotated, centered text watermark on every page.
pub fn apply_text_watermark(
    doc: &PdfDocument,
    text: &str,
    options: &WatermarkOptions,
) -> Result<PdfDocument, PdfPageError> {
    let style = TextStyle {
        font_size: options.font_size,
        color: options.color.clone(),
        opacity: options.opacity,
        rotation_degrees: options.rotation_degrees,
        alignment: TextAlignment::Center,
        ..TextStyle::default()
    };

    let mut current = PdfDocument::from_inner(doc.inner.clone());
    for index in 0..doc.page_count() {
        let size = current.effective_page_size(index)?;
        let anchor = PdfPoint {
            x: size.width / 2.0,
            y: size.height / 2.0,
        };
        current = apply_text(&current, index, text, anchor, &style, BoundsPolicy::Reject)?;
    }
    Ok(current)
}

fn check_point(
    p: PdfPoint,
    width: f64,
    height: f64,
    policy: BoundsPolicy,
) -> Result<PdfPoint, PdfPageError> {
    let inside = (0.0..=width).contains(&p.x) && (0.0..=height).contains(&p.y);
    match policy {
        _ if inside => Ok(p),
        BoundsPolicy::Clamp => Ok(PdfPoint {
            x: p.x.clamp(0.0, width),
            y: p.y.clamp(0.0, height),
        }),
        BoundsPolicy::Reject => Err(PdfPageError::AnnotationOutOfBounds(format!(
            "point ({}, {}) outside {}x{} page box",
            p.x, p.y, width, height
        ))),
    }
}

fn check_rect(
    r: PdfRect,
    width: f64,
    height: f64,
    policy: BoundsPolicy,
) -> Result<PdfRect, PdfPageError> {
    let inside = r.x >= 0.0
        && r.y >= 0.0
        && r.width >= 0.0
        && r.height >= 0.0
        && r.x + r.width <= width
        && r.y + r.height <= height;
    match policy {
        _ if inside => Ok(r),
        BoundsPolicy::Clamp => {
            let x = r.x.clamp(0.0, width);
            let y = r.y.clamp(0.0, height);
            Ok(PdfRect {
                x,
                y,
                width: r.width.max(0.0).min(width - x),
                height: r.height.max(0.0).min(height - y),
            })
        }
        BoundsPolicy::Reject => Err(PdfPageError::AnnotationOutOfBounds(format!(
            "rect ({}, {}, {}, {}) outside {}x{} page box",
            r.x, r.y, r.width, r.height, width, height
        ))),
    }
}

/// Parse "#RRGGBB" (or "RRGGBB") into unit-range RGB; bad input is black.
fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim_start_matches('#');
    if hex.len() >= 6 && hex.is_char_boundary(6) {
        let channel = |range| u8::from_str_radix(&hex[range], 16).unwrap_or(0) as f32 / 255.0;
        (channel(0..2), channel(2..4), channel(4..6))
    } else {
        (0.0, 0.0, 0.0)
    }
}

/// WinAnsi (CP1252) code for a character, if it has one. Latin-1 maps
/// straight through; the 0x80..0x9F window holds the CP1252 specials.
fn winansi_byte(c: char) -> Option<u8> {
    match c as u32 {
        code @ 0x20..=0x7E => Some(code as u8),
        code @ 0xA0..=0xFF => Some(code as u8),
        _ => match c {
            '\u{20AC}' => Some(0x80), // €
            '\u{201A}' => Some(0x82),
            '\u{0192}' => Some(0x83),
            '\u{201E}' => Some(0x84),
            '\u{2026}' => Some(0x85), // …
            '\u{2020}' => Some(0x86),
            '\u{2021}' => Some(0x87),
            '\u{02C6}' => Some(0x88),
            '\u{2030}' => Some(0x89),
            '\u{0160}' => Some(0x8A),
            '\u{2039}' => Some(0x8B),
            '\u{0152}' => Some(0x8C),
            '\u{017D}' => Some(0x8E),
            '\u{2018}' => Some(0x91), // ‘
            '\u{2019}' => Some(0x92), // ’
            '\u{201C}' => Some(0x93), // “
            '\u{201D}' => Some(0x94), // ”
            '\u{2022}' => Some(0x95), // •
            '\u{2013}' => Some(0x96), // –
            '\u{2014}' => Some(0x97), // —
            '\u{02DC}' => Some(0x98),
            '\u{2122}' => Some(0x99), // ™
            '\u{0161}' => Some(0x9A),
            '\u{203A}' => Some(0x9B),
            '\u{0153}' => Some(0x9C),
            '\u{017E}' => Some(0x9E),
            '\u{0178}' => Some(0x9F),
            _ => None,
        },
    }
}

/// Escape text as a PDF literal string in the WinAnsi encoding the stamped
/// fonts declare. Representable non-ASCII characters become octal-escaped
/// WinAnsi bytes; everything else renders as `?`, matching the measurement
/// fallback in `fonts`.
fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => match winansi_byte(c) {
                Some(byte @ 0x20..=0x7E) => out.push(byte as char),
                Some(byte) => out.push_str(&format!("\\{:03o}", byte)),
                None => out.push('?'),
            },
        }
    }
    out
}

/// Content-stream numbers with stable, short formatting.
fn num(v: f64) -> String {
    let rounded = (v * 10000.0).round() / 10000.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

fn page_dict_mut<'a>(
    doc: &'a mut lopdf::Document,
    page_id: ObjectId,
) -> Result<&'a mut Dictionary, PdfPageError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| PdfPageError::Operation(format!("invalid page object: {}", e)))
}

/// Add a Type1 standard font to the page resources. Returns the resource
/// name to reference from content.
fn ensure_font(
    doc: &mut lopdf::Document,
    page_id: ObjectId,
    base_font: &str,
) -> Result<String, PdfPageError> {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    let font_id = doc.add_object(Object::Dictionary(font));
    let name = format!("F{}", font_id.0);
    upsert_resource(doc, page_id, b"Font", name.clone(), font_id)?;
    Ok(name)
}

/// Add an ExtGState carrying fill and stroke alpha to the page resources.
fn ensure_ext_gstate(
    doc: &mut lopdf::Document,
    page_id: ObjectId,
    opacity: f64,
) -> Result<String, PdfPageError> {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut gs = Dictionary::new();
    gs.set("Type", Object::Name(b"ExtGState".to_vec()));
    gs.set("ca", Object::Real(opacity as f32));
    gs.set("CA", Object::Real(opacity as f32));
    let gs_id = doc.add_object(Object::Dictionary(gs));
    let name = format!("GS{}", gs_id.0);
    upsert_resource(doc, page_id, b"ExtGState", name.clone(), gs_id)?;
    Ok(name)
}

/// Register `name -> target` in a category of the page's Resources.
///
/// The resolved Resources dictionary is written back inline on the page, so
/// shared (referenced) resource dictionaries are never mutated for other
/// pages.
fn upsert_resource(
    doc: &mut lopdf::Document,
    page_id: ObjectId,
    category: &[u8],
    name: String,
    target: ObjectId,
) -> Result<(), PdfPageError> {
    let resolve = |doc: &lopdf::Document, obj: &Object| -> Dictionary {
        match obj {
            Object::Dictionary(dict) => dict.clone(),
            Object::Reference(id) => doc
                .get_object(*id)
                .ok()
                .and_then(|o| o.as_dict().ok())
                .cloned()
                .unwrap_or_else(Dictionary::new),
            _ => Dictionary::new(),
        }
    };

    let mut resources = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| PdfPageError::Operation(format!("invalid page object: {}", e)))?;
        match page.get(b"Resources") {
            Ok(obj) => resolve(doc, obj),
            Err(_) => crate::document::inherited_entry(doc, page, b"Resources")
                .map(|obj| resolve(doc, &obj))
                .unwrap_or_else(Dictionary::new),
        }
    };

    let mut cat = match resources.get(category) {
        Ok(obj) => resolve(doc, obj),
        Err(_) => Dictionary::new(),
    };
    cat.set(name, Object::Reference(target));
    resources.set(category, Object::Dictionary(cat));

    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Append a content stream to a page, preserving what is already there.
fn append_content(
    doc: &mut lopdf::Document,
    page_id: ObjectId,
    content: String,
) -> Result<(), PdfPageError> {
    let stream_id = doc.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        content.into_bytes(),
    )));

    let page = page_dict_mut(doc, page_id)?;
    let new_contents = match page.get(b"Contents") {
        Ok(Object::Reference(existing)) => Object::Array(vec![
            Object::Reference(*existing),
            Object::Reference(stream_id),
        ]),
        Ok(Object::Array(existing)) => {
            let mut arr = existing.clone();
            arr.push(Object::Reference(stream_id));
            Object::Array(arr)
        }
        Err(_) => Object::Reference(stream_id),
        Ok(other) => {
            return Err(PdfPageError::Operation(format!(
                "unexpected Contents object: {:?}",
                other.type_name()
            )))
        }
    };
    page.set("Contents", new_contents);
    Ok(())
}
