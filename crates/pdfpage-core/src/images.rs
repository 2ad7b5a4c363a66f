//! Raster image payloads for overlays and image-to-PDF pages.
//!
//! PNG data is decoded and re-packed as a Flate image XObject (alpha moves to
//! an SMask). JPEG data is passed straight through as DCTDecode after a
//! SOF-marker scan for dimensions and component count.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Object, ObjectId, Stream};

use crate::error::PdfPageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// Image bytes with their format resolved once at ingestion.
#[derive(Debug, Clone)]
pub struct ImageData {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl ImageData {
    /// Classify a byte buffer by magic number. This is the only place the
    /// crate inspects image bytes to decide a format.
    pub fn sniff(bytes: Vec<u8>) -> Result<Self, PdfPageError> {
        let format = if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            ImageFormat::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageFormat::Jpeg
        } else {
            return Err(PdfPageError::UnsupportedImage(
                "expected PNG or JPEG magic bytes".into(),
            ));
        };
        Ok(Self { bytes, format })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Pixel dimensions, without a full decode for JPEG.
    pub fn dimensions(&self) -> Result<(u32, u32), PdfPageError> {
        match self.format {
            ImageFormat::Png => {
                let (info, _) = decode_png(&self.bytes)?;
                Ok((info.width, info.height))
            }
            ImageFormat::Jpeg => {
                let sof = scan_jpeg_sof(&self.bytes)?;
                Ok((sof.width, sof.height))
            }
        }
    }
}

struct PngInfo {
    width: u32,
    height: u32,
    color_type: png::ColorType,
}

struct JpegSof {
    width: u32,
    height: u32,
    components: u8,
}

fn decode_png(bytes: &[u8]) -> Result<(PngInfo, Vec<u8>), PdfPageError> {
    let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
    let mut reader = decoder
        .read_info()
        .map_err(|e| PdfPageError::UnsupportedImage(format!("PNG decode failed: {}", e)))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .map_err(|e| PdfPageError::UnsupportedImage(format!("PNG decode failed: {}", e)))?;

    if frame.bit_depth != png::BitDepth::Eight {
        return Err(PdfPageError::UnsupportedImage(format!(
            "unsupported PNG bit depth {:?}",
            frame.bit_depth
        )));
    }

    buf.truncate(frame.buffer_size());
    Ok((
        PngInfo {
            width: frame.width,
            height: frame.height,
            color_type: frame.color_type,
        },
        buf,
    ))
}

/// Walk JPEG markers until a start-of-frame segment.
fn scan_jpeg_sof(bytes: &[u8]) -> Result<JpegSof, PdfPageError> {
    let bad = |msg: &str| PdfPageError::UnsupportedImage(format!("JPEG scan failed: {}", msg));

    let mut pos = 2; // past FFD8
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(bad("marker expected"));
        }
        let marker = bytes[pos + 1];
        // Standalone markers without a length field
        if (0xD0..=0xD9).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker)
            && marker != 0xC4
            && marker != 0xC8
            && marker != 0xCC;
        if is_sof {
            if pos + 9 >= bytes.len() {
                return Err(bad("truncated SOF segment"));
            }
            let height = u16::from_be_bytes([bytes[pos + 5], bytes[pos + 6]]) as u32;
            let width = u16::from_be_bytes([bytes[pos + 7], bytes[pos + 8]]) as u32;
            return Ok(JpegSof {
                width,
                height,
                components: bytes[pos + 9],
            });
        }
        pos += 2 + len;
    }
    Err(bad("no SOF marker found"))
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, PdfPageError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| PdfPageError::Operation(format!("flate compression failed: {}", e)))
}

/// Add an image XObject to the document. Returns the object id and the pixel
/// dimensions so the caller can place it.
pub(crate) fn embed_image(
    doc: &mut lopdf::Document,
    image: &ImageData,
) -> Result<(ObjectId, u32, u32), PdfPageError> {
    match image.format {
        ImageFormat::Png => embed_png(doc, &image.bytes),
        ImageFormat::Jpeg => embed_jpeg(doc, &image.bytes),
    }
}

fn image_dict(width: u32, height: u32, color_space: &[u8], filter: &[u8]) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(filter.to_vec()));
    dict
}

fn embed_png(
    doc: &mut lopdf::Document,
    bytes: &[u8],
) -> Result<(ObjectId, u32, u32), PdfPageError> {
    use png::ColorType::*;

    let (info, data) = decode_png(bytes)?;
    let pixels = (info.width as usize) * (info.height as usize);

    let (color, color_space, alpha) = match info.color_type {
        Rgb => (data, b"DeviceRGB".as_slice(), None),
        Grayscale => (data, b"DeviceGray".as_slice(), None),
        Rgba => {
            let mut color = Vec::with_capacity(pixels * 3);
            let mut alpha = Vec::with_capacity(pixels);
            for px in data.chunks_exact(4) {
                color.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
            (color, b"DeviceRGB".as_slice(), Some(alpha))
        }
        GrayscaleAlpha => {
            let mut color = Vec::with_capacity(pixels);
            let mut alpha = Vec::with_capacity(pixels);
            for px in data.chunks_exact(2) {
                color.push(px[0]);
                alpha.push(px[1]);
            }
            (color, b"DeviceGray".as_slice(), Some(alpha))
        }
        Indexed => {
            return Err(PdfPageError::UnsupportedImage(
                "indexed PNG is not supported".into(),
            ))
        }
    };

    let smask_id = match alpha {
        Some(alpha) => {
            let dict = image_dict(info.width, info.height, b"DeviceGray", b"FlateDecode");
            let stream = Stream::new(dict, flate_compress(&alpha)?);
            Some(doc.add_object(Object::Stream(stream)))
        }
        None => None,
    };

    let mut dict = image_dict(info.width, info.height, color_space, b"FlateDecode");
    if let Some(id) = smask_id {
        dict.set("SMask", Object::Reference(id));
    }
    let stream = Stream::new(dict, flate_compress(&color)?);
    let id = doc.add_object(Object::Stream(stream));
    Ok((id, info.width, info.height))
}

fn embed_jpeg(
    doc: &mut lopdf::Document,
    bytes: &[u8],
) -> Result<(ObjectId, u32, u32), PdfPageError> {
    let sof = scan_jpeg_sof(bytes)?;
    let color_space: &[u8] = match sof.components {
        1 => b"DeviceGray",
        3 => b"DeviceRGB",
        4 => b"DeviceCMYK",
        n => {
            return Err(PdfPageError::UnsupportedImage(format!(
                "JPEG with {} components",
                n
            )))
        }
    };

    let dict = image_dict(sof.width, sof.height, color_space, b"DCTDecode");
    let stream = Stream::new(dict, bytes.to_vec());
    let id = doc.add_object(Object::Stream(stream));
    Ok((id, sof.width, sof.height))
}
