use crate::chunking::RecursiveCharacterSplitter;
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::index::InMemoryIndex;
use crate::models::{Chunk, DocumentFingerprint, IngestionOptions};
use crate::provider::Credentials;
use crate::traits::{Embedder, TextSplitter, VectorIndex};
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// A fully embedded document, ready to back a conversation engine.
pub struct IngestedDocument {
    pub fingerprint: DocumentFingerprint,
    pub index: InMemoryIndex,
    pub page_count: usize,
}

impl IngestedDocument {
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }
}

/// Turns a PDF on disk into an [`IngestedDocument`]: extract pages, split
/// them, embed the chunks, build the index. Either the whole pipeline
/// succeeds or nothing is produced.
pub struct IngestionPipeline {
    extractor: Arc<dyn PdfExtractor>,
    splitter: Arc<dyn TextSplitter>,
    embedder: Arc<dyn Embedder>,
    credentials: Credentials,
    options: IngestionOptions,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        splitter: Arc<dyn TextSplitter>,
        embedder: Arc<dyn Embedder>,
        credentials: Credentials,
        options: IngestionOptions,
    ) -> Self {
        Self {
            extractor,
            splitter,
            embedder,
            credentials,
            options,
        }
    }

    /// lopdf extraction and recursive character splitting sized by `options`.
    pub fn with_defaults(
        embedder: Arc<dyn Embedder>,
        credentials: Credentials,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        let splitter = RecursiveCharacterSplitter::from_options(&options)?;
        Ok(Self::new(
            Arc::new(LopdfExtractor),
            Arc::new(splitter),
            embedder,
            credentials,
            options,
        ))
    }

    pub async fn ingest(&self, path: &Path) -> Result<IngestedDocument, IngestError> {
        self.credentials.resolve()?;

        let extractor = Arc::clone(&self.extractor);
        let owned_path = path.to_path_buf();
        let (fingerprint, pages) = tokio::task::spawn_blocking(move || {
            let fingerprint = build_document_fingerprint(&owned_path)?;
            let pages = extractor.extract_pages(&owned_path)?;
            Ok::<_, IngestError>((fingerprint, pages))
        })
        .await??;

        let chunks = self.split_pages(&fingerprint, &pages);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(fingerprint.source_path));
        }
        debug!(document_id = %fingerprint.document_id, chunks = chunks.len(), "document split");

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.options.embedding_batch_size.max(1)) {
            embeddings.extend(self.embedder.embed(batch).await?);
        }

        let index = InMemoryIndex::build(chunks, embeddings)?;
        info!(
            document = %fingerprint.document_title,
            pages = pages.len(),
            chunks = index.len(),
            "document ingested"
        );

        Ok(IngestedDocument {
            fingerprint,
            index,
            page_count: pages.len(),
        })
    }

    fn split_pages(&self, fingerprint: &DocumentFingerprint, pages: &[PageText]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut cursor = 0u64;

        for page in pages {
            for text in self.splitter.split_text(&page.text) {
                chunks.push(Chunk {
                    chunk_id: make_chunk_id(&fingerprint.document_id, page.number, cursor, &text),
                    document_id: fingerprint.document_id.clone(),
                    page: page.number,
                    chunk_index: cursor,
                    text,
                });
                cursor = cursor.saturating_add(1);
            }
        }

        chunks
    }
}

fn build_document_fingerprint(path: &Path) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(DocumentFingerprint {
        document_id: generate_document_id(&checksum, path),
        document_title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        ingested_at: Utc::now(),
    })
}

fn generate_document_id(checksum: &str, path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(checksum.as_bytes());
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct StaticExtractor {
        pages: Vec<PageText>,
    }

    impl PdfExtractor for StaticExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self.pages.clone())
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            HashingEmbedder::default().embed(texts).await
        }
    }

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| PageText {
                number: index as u32 + 1,
                text: text.to_string(),
            })
            .collect()
    }

    fn pipeline(
        pages: Vec<PageText>,
        embedder: Arc<dyn Embedder>,
        credentials: Credentials,
        options: IngestionOptions,
    ) -> IngestionPipeline {
        let splitter = RecursiveCharacterSplitter::from_options(&options).unwrap();
        IngestionPipeline::new(
            Arc::new(StaticExtractor { pages }),
            Arc::new(splitter),
            embedder,
            credentials,
            options,
        )
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn ingestion_builds_an_index_across_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("guide.pdf");
        fs::write(&path, b"%PDF-1.4 placeholder")?;

        let options = IngestionOptions {
            chunk_size: 30,
            chunk_overlap: 5,
            embedding_batch_size: 2,
        };
        let embedder = Arc::new(CountingEmbedder::default());
        let pipeline = pipeline(
            pages(&[
                "Pumps move fluid.\n\nValves control flow.",
                "Filters remove particles from oil.",
            ]),
            embedder.clone(),
            Credentials::fixed("test-key"),
            options,
        );

        let document = pipeline.ingest(&path).await?;

        assert_eq!(document.page_count, 2);
        assert_eq!(document.fingerprint.document_title, "guide.pdf");
        assert_eq!(document.chunk_count(), 4);
        let chunk_pages = document.index.chunks().map(|chunk| chunk.page).collect::<Vec<_>>();
        assert_eq!(chunk_pages, vec![1, 1, 2, 2]);
        let chunk_indexes = document
            .index
            .chunks()
            .map(|chunk| chunk.chunk_index)
            .collect::<Vec<_>>();
        assert_eq!(chunk_indexes, vec![0, 1, 2, 3]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_credential_fails_first() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = pipeline(
            pages(&["text"]),
            Arc::new(HashingEmbedder::default()),
            Credentials::from_env("PDF_CHAT_TEST_INGEST_UNSET_KEY"),
            IngestionOptions::default(),
        );

        let result = pipeline.ingest(&dir.path().join("absent.pdf")).await;
        match result {
            Err(IngestError::MissingCredential(var)) => {
                assert_eq!(var, "PDF_CHAT_TEST_INGEST_UNSET_KEY")
            }
            Err(other) => panic!("expected missing credential, got {other}"),
            Ok(_) => panic!("expected missing credential"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn blank_document_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        fs::write(&path, b"%PDF-1.4 placeholder")?;
        let pipeline = pipeline(
            pages(&["   ", "\n\n"]),
            Arc::new(HashingEmbedder::default()),
            Credentials::fixed("test-key"),
            IngestionOptions::default(),
        );

        let result = pipeline.ingest(&path).await;
        assert!(matches!(result, Err(IngestError::EmptyDocument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_pdf_surfaces_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;
        let pipeline = IngestionPipeline::with_defaults(
            Arc::new(HashingEmbedder::default()),
            Credentials::fixed("test-key"),
            IngestionOptions::default(),
        )?;

        let result = pipeline.ingest(&path).await;
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
