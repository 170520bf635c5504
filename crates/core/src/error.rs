use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("document produced no text chunks: {0}")]
    EmptyDocument(String),

    #[error("missing provider credential: set {0}")]
    MissingCredential(String),

    #[error("embedding request failed: {0}")]
    Embedding(ProviderError),

    #[error("index build failed: {0}")]
    Index(#[from] IndexError),

    #[error("ingestion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ProviderError> for IngestError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::MissingCredential(var) => IngestError::MissingCredential(var),
            other => IngestError::Embedding(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing provider credential: set {0}")]
    MissingCredential(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("malformed response from {backend}: {details}")]
    MalformedResponse { backend: String, details: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("vector dimension {actual} is not {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector contains non-finite values")]
    NonFinite,

    #[error("cannot build an index without chunks")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no document has been processed yet; upload a PDF first")]
    NoDocument,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] ProviderError),
}
