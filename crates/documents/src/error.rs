use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported document type: {0}")]
    Unsupported(String),

    #[error("Document is not valid UTF-8 text: {0}")]
    InvalidEncoding(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
