use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("certificate already processed (fingerprint {fingerprint})")]
    DuplicateContent { fingerprint: String },
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("certificate {id} is not in processed status (current: {status})")]
    InvalidStateTransition { id: String, status: String },
    #[error("field extraction unavailable: {0}")]
    ExtractionUnavailable(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("OCR error: {0}")]
    Ocr(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
