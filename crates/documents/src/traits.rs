use std::path::Path;
use tracing::debug;

use crate::docx::DocxExtractor;
use crate::error::{ExtractionError, Result};
use crate::plain::PlainTextExtractor;

/// Converts a binary document into plain text.
pub trait TextExtractor: Send + Sync {
    /// Get the name of the extractor
    fn name(&self) -> &'static str;

    /// Lowercase file extensions this extractor understands
    fn extensions(&self) -> &'static [&'static str];

    fn extract(&self, bytes: &[u8]) -> Result<String>;

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions().iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }
}

/// Pick the extractor for a path by its extension.
pub fn extractor_for(path: &Path) -> Result<Box<dyn TextExtractor>> {
    let candidates: Vec<Box<dyn TextExtractor>> =
        vec![Box::new(DocxExtractor), Box::new(PlainTextExtractor)];

    candidates
        .into_iter()
        .find(|extractor| extractor.supports(path))
        .ok_or_else(|| ExtractionError::Unsupported(path.display().to_string()))
}

/// Read a document from disk and extract its text.
pub async fn extract_path(path: &Path) -> Result<String> {
    let extractor = extractor_for(path)?;
    let bytes = tokio::fs::read(path).await?;

    debug!(
        path = %path.display(),
        extractor = extractor.name(),
        bytes = bytes.len(),
        "Extracting document text"
    );

    extractor.extract(&bytes)
}
