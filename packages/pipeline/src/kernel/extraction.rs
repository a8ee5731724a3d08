//! Plain-text extractor.
//!
//! The default [`BaseTextExtractor`] handles TXT uploads; PDF and DOCX
//! extraction is provided by an external service implementing the same
//! trait. Images are stored but never extracted.

use super::traits::BaseTextExtractor;
use crate::domains::documents::models::FileType;
use crate::error::PipelineError;

pub struct PlainTextExtractor;

impl BaseTextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<String, PipelineError> {
        match file_type {
            FileType::Txt => Ok(String::from_utf8_lossy(bytes).into_owned()),
            FileType::Pdf | FileType::Docx => Err(PipelineError::UnsupportedFileType(file_type)),
            FileType::Png | FileType::Jpg => Err(PipelineError::UnsupportedFileType(file_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_bytes_extract_as_utf8() {
        let text = PlainTextExtractor
            .extract(b"Paragraph one.\n\nParagraph two.", FileType::Txt)
            .unwrap();
        assert_eq!(text, "Paragraph one.\n\nParagraph two.");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let text = PlainTextExtractor
            .extract(&[0x68, 0x69, 0xFF], FileType::Txt)
            .unwrap();
        assert!(text.starts_with("hi"));
    }

    #[test]
    fn images_are_unsupported() {
        let err = PlainTextExtractor.extract(b"...", FileType::Png);
        assert!(matches!(err, Err(PipelineError::UnsupportedFileType(_))));
    }
}
