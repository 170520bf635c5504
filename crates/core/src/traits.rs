use crate::error::{IndexError, ProviderError};
use crate::models::{Prompt, RetrievedChunk};
use async_trait::async_trait;

pub trait TextSplitter: Send + Sync {
    fn split_text(&self, text: &str) -> Vec<String>;
}

pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}
