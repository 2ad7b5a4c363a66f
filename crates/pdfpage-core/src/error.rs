use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfPageError {
    /// Neither the strict nor the lenient parse could read the file.
    #[error("Document is corrupt and could not be parsed: {0}")]
    CorruptDocument(String),

    /// The file carries an /Encrypt dictionary. Distinguished from
    /// corruption so callers can prompt for a password instead of
    /// suggesting repair.
    #[error("Document is encrypted")]
    EncryptedDocument,

    #[error("Page index {index} out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { index: usize, page_count: usize },

    #[error("Overlay outside page bounds: {0}")]
    AnnotationOutOfBounds(String),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("Unsupported image data: {0}")]
    UnsupportedImage(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
