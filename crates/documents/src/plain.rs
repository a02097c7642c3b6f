use crate::error::{ExtractionError, Result};
use crate::traits::TextExtractor;

/// UTF-8 text and markdown files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md", "markdown", "text"]
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::InvalidEncoding(e.to_string()))?;
        // Normalise Windows line endings and a leading BOM.
        Ok(text.trim_start_matches('\u{feff}').replace("\r\n", "\n"))
    }
}
