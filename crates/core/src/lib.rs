pub mod chunking;
pub mod completion;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod provider;
pub mod session;
pub mod traits;

pub use chunking::{normalize_whitespace, RecursiveCharacterSplitter, DEFAULT_SEPARATORS};
pub use completion::OpenAiChatCompletion;
pub use embeddings::{HashingEmbedder, OpenAiEmbedder, DEFAULT_HASHING_DIMENSIONS};
pub use engine::ConversationEngine;
pub use error::{ChatError, IndexError, IngestError, ProviderError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use index::InMemoryIndex;
pub use ingest::{digest_file, IngestedDocument, IngestionPipeline};
pub use models::{
    ChatTurn, Chunk, DocumentFingerprint, EngineOptions, IngestionOptions, Prompt,
    RetrievedChunk, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_HISTORY_TURNS,
    DEFAULT_TOP_K,
};
pub use provider::{
    Credentials, ProviderConfig, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, DEFAULT_CREDENTIAL_VAR,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_TEMPERATURE,
};
pub use session::{ChatSession, ConversationHistory, DocumentChat, DocumentSummary, ProcessState};
pub use traits::{Completion, Embedder, TextSplitter, VectorIndex};
