use crate::error::IndexError;
use crate::models::{Chunk, RetrievedChunk};
use crate::traits::VectorIndex;

/// Brute-force cosine index over the chunks of one document. Built once,
/// never mutated.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
    norm: f32,
}

impl InMemoryIndex {
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimensions = match embeddings.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => {
                return Err(IndexError::DimensionMismatch {
                    expected: 1,
                    actual: 0,
                })
            }
            None => return Err(IndexError::Empty),
        };

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                check_vector(&vector, dimensions)?;
                let norm = l2_norm(&vector);
                Ok(IndexEntry {
                    chunk,
                    vector,
                    norm,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(Self {
            entries,
            dimensions,
        })
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }
}

impl VectorIndex for InMemoryIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        check_vector(vector, self.dimensions)?;
        let query_norm = l2_norm(vector);

        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let denominator = entry.norm * query_norm;
                let score = if denominator > 0.0 {
                    dot(&entry.vector, vector) / denominator
                } else {
                    0.0
                };
                (position, score)
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1).then(left.0.cmp(&right.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| RetrievedChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }
}

fn check_vector(vector: &[f32], expected: usize) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }

    if vector.iter().any(|value| !value.is_finite()) {
        return Err(IndexError::NonFinite);
    }

    Ok(())
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

fn l2_norm(vector: &[f32]) -> f32 {
    dot(vector, vector).sqrt()
}
