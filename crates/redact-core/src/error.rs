use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedactError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Nothing to redact: no redactions have been committed")]
    NothingToRedact,

    #[error("Export failed: {0}")]
    ExportFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Page {0} does not exist in the loaded document")]
    UnknownPage(usize),
}
