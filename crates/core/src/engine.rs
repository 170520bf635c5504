use crate::error::{ChatError, ProviderError};
use crate::ingest::IngestedDocument;
use crate::models::{ChatTurn, DocumentFingerprint, EngineOptions, Prompt, RetrievedChunk};
use crate::traits::{Completion, Embedder, VectorIndex};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

const CONDENSE_INSTRUCTIONS: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language. \
Reply with the standalone question only.";

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context from the uploaded document \
to answer the user's question. If you don't know the answer, just say that you don't know, \
don't try to make up an answer.";

/// Answers questions about one document. Bound to exactly one index for its
/// whole life.
pub struct ConversationEngine {
    document: DocumentFingerprint,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn Completion>,
    options: EngineOptions,
}

impl ConversationEngine {
    pub fn new(
        document: DocumentFingerprint,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn Completion>,
        options: EngineOptions,
    ) -> Self {
        Self {
            document,
            index,
            embedder,
            completion,
            options,
        }
    }

    pub fn from_ingested(
        ingested: IngestedDocument,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn Completion>,
        options: EngineOptions,
    ) -> Self {
        Self::new(
            ingested.fingerprint,
            Arc::new(ingested.index),
            embedder,
            completion,
            options,
        )
    }

    pub fn document(&self) -> &DocumentFingerprint {
        &self.document
    }

    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<String, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let search_question = if self.options.condense_question && !history.is_empty() {
            self.condense(question, history).await?
        } else {
            question.to_string()
        };

        let context = self.retrieve(&search_question).await?;
        debug!(
            document_id = %self.document.document_id,
            retrieved = context.len(),
            history = history.len(),
            "answering question"
        );

        let prompt = Prompt {
            system: answer_instructions(&context),
            history: history.to_vec(),
            user: question.to_string(),
        };

        Ok(self.completion.generate(&prompt).await?)
    }

    async fn condense(&self, question: &str, history: &[ChatTurn]) -> Result<String, ChatError> {
        let mut transcript = String::new();
        for turn in history {
            let _ = writeln!(transcript, "Human: {}\nAssistant: {}", turn.question, turn.answer);
        }

        let prompt = Prompt {
            system: CONDENSE_INSTRUCTIONS.to_string(),
            history: Vec::new(),
            user: format!(
                "Chat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
            ),
        };

        let standalone = self.completion.generate(&prompt).await?;
        let standalone = standalone.trim();
        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(standalone.to_string())
        }
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, ChatError> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            ChatError::Generation(ProviderError::MalformedResponse {
                backend: "embedder".to_string(),
                details: "no vector returned for the query".to_string(),
            })
        })?;

        Ok(self.index.query(&vector, self.options.top_k)?)
    }
}

fn answer_instructions(context: &[RetrievedChunk]) -> String {
    let mut system = String::from(ANSWER_INSTRUCTIONS);
    system.push_str("\n\n");
    for retrieved in context {
        let _ = write!(
            system,
            "[page {}]\n{}\n\n",
            retrieved.chunk.page, retrieved.chunk.text
        );
    }
    system.trim_end().to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::index::InMemoryIndex;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records every prompt and answers with a numbered reply.
    #[derive(Default)]
    pub(crate) struct RecordingCompletion {
        pub prompts: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl Completion for RecordingCompletion {
        async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.clone());
            Ok(format!("reply {}", prompts.len()))
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl Completion for FailingCompletion {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
            Err(ProviderError::BackendResponse {
                backend: "openai".to_string(),
                status: 429,
                details: "rate limited".to_string(),
            })
        }
    }

    pub(crate) fn sample_engine(
        completion: Arc<dyn Completion>,
        options: EngineOptions,
    ) -> ConversationEngine {
        let embedder = HashingEmbedder::default();
        let texts = [
            "The hydraulic pump delivers 40 litres per minute.",
            "Replace the oil filter every 500 operating hours.",
            "The warranty covers manufacturing defects for two years.",
        ];
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                chunk_id: format!("chunk-{index}"),
                document_id: "doc-1".to_string(),
                page: index as u32 + 1,
                chunk_index: index as u64,
                text: text.to_string(),
            })
            .collect::<Vec<_>>();
        let embeddings = texts.iter().map(|text| embedder.embed_one(text)).collect();
        let index = InMemoryIndex::build(chunks, embeddings).unwrap();

        ConversationEngine::new(
            DocumentFingerprint {
                document_id: "doc-1".to_string(),
                document_title: "manual.pdf".to_string(),
                source_path: "uploads/manual.pdf".to_string(),
                checksum: "checksum".to_string(),
                ingested_at: Utc::now(),
            },
            Arc::new(index),
            Arc::new(embedder),
            completion,
            options,
        )
    }

    #[tokio::test]
    async fn first_question_goes_straight_to_retrieval() {
        let completion = Arc::new(RecordingCompletion::default());
        let engine = sample_engine(
            completion.clone(),
            EngineOptions {
                top_k: 1,
                condense_question: true,
            },
        );

        let answer = engine
            .answer("How often should the oil filter be replaced?", &[])
            .await
            .unwrap();

        assert_eq!(answer, "reply 1");
        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].system.contains("500 operating hours"));
        assert!(prompts[0].system.contains("[page 2]"));
        assert!(prompts[0].history.is_empty());
        assert_eq!(prompts[0].user, "How often should the oil filter be replaced?");
    }

    #[tokio::test]
    async fn follow_up_is_condensed_and_carries_history() {
        let completion = Arc::new(RecordingCompletion::default());
        let engine = sample_engine(completion.clone(), EngineOptions::default());
        let history = vec![ChatTurn::new("What does the pump deliver?", "40 litres per minute.")];

        let answer = engine.answer("And the warranty?", &history).await.unwrap();

        assert_eq!(answer, "reply 2");
        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].user.contains("Human: What does the pump deliver?"));
        assert!(prompts[0].user.contains("Follow Up Input: And the warranty?"));
        assert_eq!(prompts[1].history, history);
        assert_eq!(prompts[1].user, "And the warranty?");
    }

    #[tokio::test]
    async fn condensing_can_be_disabled() {
        let completion = Arc::new(RecordingCompletion::default());
        let engine = sample_engine(
            completion.clone(),
            EngineOptions {
                top_k: 2,
                condense_question: false,
            },
        );
        let history = vec![ChatTurn::new("Q1", "A1")];

        engine.answer("Q2", &history).await.unwrap();

        assert_eq!(completion.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let engine = sample_engine(
            Arc::new(RecordingCompletion::default()),
            EngineOptions::default(),
        );
        assert!(matches!(engine.answer("   ", &[]).await, Err(ChatError::EmptyQuestion)));
    }

    #[tokio::test]
    async fn provider_failure_is_a_generation_error() {
        let engine = sample_engine(Arc::new(FailingCompletion), EngineOptions::default());
        let result = engine.answer("What does the pump deliver?", &[]).await;
        assert!(matches!(
            result,
            Err(ChatError::Generation(ProviderError::BackendResponse { status: 429, .. }))
        ));
    }
}
