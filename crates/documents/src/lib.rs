//! Document text extraction
//!
//! Turns an uploaded SOW document into plain text for the task parser.

pub mod docx;
pub mod error;
pub mod plain;
pub mod traits;

pub use docx::DocxExtractor;
pub use error::{ExtractionError, Result};
pub use plain::PlainTextExtractor;
pub use traits::{extract_path, extractor_for, TextExtractor};
