use crate::engine::ConversationEngine;
use crate::error::{ChatError, IngestError};
use crate::ingest::IngestionPipeline;
use crate::models::{ChatTurn, EngineOptions, DEFAULT_HISTORY_TURNS};
use crate::traits::{Completion, Embedder};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Prior turns of one conversation. Only the most recent `max_turns` are
/// kept.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Vec<ChatTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TURNS)
    }
}

pub struct ChatSession {
    session_id: Uuid,
    engine: ConversationEngine,
    history: ConversationHistory,
}

impl ChatSession {
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }
}

/// The engine currently answering questions, if any, and its history.
/// Engine and history are always replaced together.
pub struct ProcessState {
    active: Option<ChatSession>,
    max_history_turns: usize,
}

impl ProcessState {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            active: None,
            max_history_turns,
        }
    }

    pub fn active(&self) -> Option<&ChatSession> {
        self.active.as_ref()
    }

    pub fn has_document(&self) -> bool {
        self.active.is_some()
    }

    /// Installs a new engine with an empty history and returns its session id.
    pub fn replace(&mut self, engine: ConversationEngine) -> Uuid {
        let session_id = Uuid::new_v4();
        self.active = Some(ChatSession {
            session_id,
            engine,
            history: ConversationHistory::new(self.max_history_turns),
        });
        session_id
    }

    pub async fn chat(&mut self, question: &str) -> Result<String, ChatError> {
        let session = self.active.as_mut().ok_or(ChatError::NoDocument)?;

        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let answer = session.engine.answer(question, session.history.turns()).await?;
        session.history.push(ChatTurn::new(question, answer.clone()));
        info!(
            session_id = %session.session_id,
            history = session.history.len(),
            "question answered"
        );

        Ok(answer)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub session_id: Uuid,
    pub document_id: String,
    pub title: String,
    pub pages: usize,
    pub chunks: usize,
}

/// Ingestion plus the single live conversation, behind one lock.
///
/// Ingestion runs without holding the lock; only the final swap does, so a
/// failed upload never disturbs the current conversation. A chat turn holds
/// the lock from retrieval until its turn is recorded.
pub struct DocumentChat {
    pipeline: IngestionPipeline,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn Completion>,
    engine_options: EngineOptions,
    state: Mutex<ProcessState>,
}

impl DocumentChat {
    pub fn new(
        pipeline: IngestionPipeline,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn Completion>,
        engine_options: EngineOptions,
        max_history_turns: usize,
    ) -> Self {
        Self {
            pipeline,
            embedder,
            completion,
            engine_options,
            state: Mutex::new(ProcessState::new(max_history_turns)),
        }
    }

    pub async fn load_document(&self, path: &Path) -> Result<DocumentSummary, IngestError> {
        let ingested = self.pipeline.ingest(path).await?;
        let pages = ingested.page_count;
        let chunks = ingested.chunk_count();
        let engine = ConversationEngine::from_ingested(
            ingested,
            Arc::clone(&self.embedder),
            Arc::clone(&self.completion),
            self.engine_options.clone(),
        );
        let document_id = engine.document().document_id.clone();
        let title = engine.document().document_title.clone();

        let session_id = self.state.lock().await.replace(engine);
        info!(%session_id, document = %title, "conversation reset for new document");

        Ok(DocumentSummary {
            session_id,
            document_id,
            title,
            pages,
            chunks,
        })
    }

    pub async fn chat(&self, question: &str) -> Result<String, ChatError> {
        self.state.lock().await.chat(question).await
    }

    pub async fn has_document(&self) -> bool {
        self.state.lock().await.has_document()
    }

    pub async fn history(&self) -> Vec<ChatTurn> {
        self.state
            .lock()
            .await
            .active()
            .map(|session| session.history().turns().to_vec())
            .unwrap_or_default()
    }
}
