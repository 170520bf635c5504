use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_HISTORY_TURNS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub page: u32,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// One answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Input of a single completion call: system instructions, prior turns and
/// the current user message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub history: Vec<ChatTurn>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_batch_size: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub top_k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            condense_question: true,
        }
    }
}
