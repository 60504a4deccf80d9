use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("could not parse spreadsheet: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("no valid records left after filtering (ValorPago > 0 and ValorComissao present)")]
    ValidationEmpty,
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "SourceUnavailable",
            PipelineError::Parse(_) => "ParseError",
            PipelineError::Schema(_) => "SchemaError",
            PipelineError::ValidationEmpty => "ValidationEmpty",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
