//! Upload validation.
//!
//! The upload transport supplies raw bytes, a declared filename, and a
//! declared content type. None of the declared values are trusted on
//! their own: the extension must be in the allow-list, the declared
//! content type must agree with the extension, and the payload bytes must
//! sniff as the format the extension claims. The content type persisted
//! on the record is the one detected from the bytes.

use crate::ingest::error::IngestError;
use image::ImageFormat;

/// Result of successful upload validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUpload {
    /// Lowercase extension without the dot, e.g. "png".
    pub extension: String,
    /// Content type detected from the payload bytes, e.g. "image/png".
    pub detected_content_type: String,
    /// Image format sniffed from the payload bytes.
    pub format: ImageFormat,
}

/// Extract the lowercase extension (without dot) from a filename.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Validate an upload before any I/O happens.
pub fn validate(
    bytes: &[u8],
    declared_filename: &str,
    declared_content_type: &str,
    allowed_extensions: &[String],
) -> Result<ValidUpload, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::EmptyPayload);
    }

    let extension = extension_of(declared_filename)
        .ok_or_else(|| IngestError::UnsupportedExtension(declared_filename.to_string()))?;
    if !allowed_extensions.contains(&extension) {
        return Err(IngestError::UnsupportedExtension(extension));
    }

    // Declared content type and extension must agree.
    let expected = ImageFormat::from_extension(&extension).ok_or_else(|| {
        IngestError::UnsupportedExtension(extension.clone())
    })?;
    if !declared_content_type.eq_ignore_ascii_case(expected.to_mime_type()) {
        return Err(IngestError::ContentTypeMismatch {
            content_type: declared_content_type.to_string(),
            extension,
        });
    }

    // The bytes themselves must be what the extension claims.
    let format = image::guess_format(bytes).map_err(|e| IngestError::PayloadMismatch {
        extension: extension.clone(),
        reason: e.to_string(),
    })?;
    if format != expected {
        return Err(IngestError::PayloadMismatch {
            extension,
            reason: format!("payload sniffs as {}", format.to_mime_type()),
        });
    }

    Ok(ValidUpload {
        extension,
        detected_content_type: format.to_mime_type().to_string(),
        format,
    })
}
