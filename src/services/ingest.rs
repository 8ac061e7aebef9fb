//! Protocol ingestion: upload, extract, parse, persist.
//!
//! Stages run strictly in order. Each persist is its own commit, and an
//! uploaded object is left in place when a later stage fails.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::parse::{parse_protocol, parse_steps, ParseError};
use crate::llm::{LlmError, StructuredGenerator, TextExtractor};
use crate::models::{
    DocumentFormat, ProtocolDocument, ProtocolPreview, UnsupportedExtension,
};
use crate::repository::{DieselError, ProtocolRepository};
use crate::storage::{ObjectStore, StorageError};

/// Stage at which an ingestion failed.
#[derive(Debug, Error)]
pub enum IngestFailure {
    #[error("{0}")]
    Upload(StorageError),
    #[error("Failed to extract text from file: {0}")]
    Extraction(LlmError),
    #[error("Failed to parse protocol: {0}")]
    ParseProtocol(ParseError),
    #[error("Failed to parse protocol steps: {0}")]
    ParseSteps(ParseError),
    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Rejected before any side effect.
    #[error(transparent)]
    UnsupportedExtension(#[from] UnsupportedExtension),
    #[error("Failed to create protocol preview: {0}")]
    Failed(#[from] IngestFailure),
}

impl From<DieselError> for IngestError {
    fn from(e: DieselError) -> Self {
        IngestError::Failed(IngestFailure::Database(e))
    }
}

/// Turns an uploaded file into a stored protocol with steps.
#[derive(Clone)]
pub struct IngestPipeline {
    protocols: ProtocolRepository,
    store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    generator: Arc<dyn StructuredGenerator>,
}

impl IngestPipeline {
    pub fn new(
        protocols: ProtocolRepository,
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn StructuredGenerator>,
    ) -> Self {
        Self {
            protocols,
            store,
            extractor,
            generator,
        }
    }

    /// Ingest one file and return the protocol preview, steps ordered by number.
    pub async fn ingest(
        &self,
        content: &[u8],
        filename: &str,
        extension: &str,
    ) -> Result<ProtocolPreview, IngestError> {
        let format = DocumentFormat::from_extension(extension)?;
        let content_type = format.content_type();
        info!(
            "Ingesting {} ({} bytes, {})",
            filename,
            content.len(),
            content_type
        );

        let object_url = self
            .store
            .put(content, format.extension(), &content_type)
            .await
            .map_err(|e| {
                error!("Upload of {} failed: {}", filename, e);
                IngestFailure::Upload(e)
            })?;
        debug!("Stored {} at {}", filename, object_url);

        let document_id = Uuid::new_v4();
        let protocol_id = Uuid::new_v4();

        let extracted = self
            .extractor
            .extract_text(content, format.extraction_mime_type())
            .await
            .map_err(|e| {
                error!("Text extraction for {} failed: {}", filename, e);
                IngestFailure::Extraction(e)
            })?;
        debug!("Extracted {} characters from {}", extracted.len(), filename);

        let mut document = ProtocolDocument::pending(
            document_id,
            filename.to_string(),
            object_url.clone(),
            content_type,
        );
        document.mark_ingested(extracted);
        let document = self.protocols.upsert_document(&document).await?;
        let text = document.description.as_deref().unwrap_or_default();

        let protocol = parse_protocol(self.generator.as_ref(), text, document_id, protocol_id)
            .await
            .map_err(IngestFailure::ParseProtocol)?;
        let steps = parse_steps(self.generator.as_ref(), text, protocol_id)
            .await
            .map_err(IngestFailure::ParseSteps)?;

        let protocol = self.protocols.upsert_protocol(&protocol).await?;
        let mut stored_steps = Vec::with_capacity(steps.len());
        for step in &steps {
            stored_steps.push(self.protocols.upsert_step(step).await?);
        }

        info!(
            "Ingested protocol '{}' ({}) with {} steps",
            protocol.protocol_name,
            protocol.protocol_id,
            stored_steps.len()
        );
        Ok(ProtocolPreview::new(protocol, stored_steps, object_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IngestionStatus;
    use crate::test_support::{three_step_ai, test_db, MemoryStore, MockAi};
    use std::sync::atomic::Ordering;

    fn pipeline(
        db: &crate::repository::DbContext,
        store: Arc<MemoryStore>,
        ai: Arc<MockAi>,
    ) -> IngestPipeline {
        IngestPipeline::new(db.protocols(), store, ai.clone(), ai)
    }

    #[tokio::test]
    async fn test_ingest_persists_everything_in_step_order() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(three_step_ai());

        let preview = pipeline(&db, store.clone(), ai.clone())
            .ingest(b"%PDF-1.4", "pcr.pdf", "pdf")
            .await
            .unwrap();

        let numbers: Vec<_> = preview.protocol_steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.put_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ai.extract_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ai.generate_calls.load(Ordering::SeqCst), 2);

        let repo = db.protocols();
        let protocol = repo
            .get_protocol(&preview.protocol.protocol_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(protocol.protocol_name, "PCR");

        let document = repo.get_document(&protocol.document_id).await.unwrap().unwrap();
        assert_eq!(document.ingestion_status, IngestionStatus::Ingested);
        assert!(document.ingested_at.is_some());
        assert_eq!(document.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(document.object_url, preview.object_url);
        assert_eq!(document.description.as_deref(), Some(ai.extracted_text.as_str()));

        assert_eq!(
            repo.steps_by_protocol(&protocol.protocol_id).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_mime_type_follows_extension() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(three_step_ai());
        let pipeline = pipeline(&db, store.clone(), ai.clone());

        for format in DocumentFormat::ALL {
            let filename = format!("scan.{}", format.extension());
            let preview = pipeline
                .ingest(b"bytes", &filename, format.extension())
                .await
                .unwrap();
            let document = db
                .protocols()
                .get_document(&preview.protocol.document_id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(document.mime_type, Some(format.content_type()));
        }

        let seen = ai.extraction_mime_types.lock().unwrap().clone();
        assert!(seen.contains(&"image/jpeg".to_string()));
        assert!(!seen.contains(&"image/jpg".to_string()));
    }

    #[tokio::test]
    async fn test_object_key_uses_validated_extension() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(three_step_ai());

        let preview = pipeline(&db, store, ai)
            .ingest(b"%PDF", "scan", "PDF")
            .await
            .unwrap();
        let key = preview.object_url.rsplit('/').next().unwrap();
        let (stem, ext) = key.rsplit_once('.').unwrap();
        assert_eq!(ext, "pdf");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_extension_has_no_side_effects() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(three_step_ai());

        let err = pipeline(&db, store.clone(), ai.clone())
            .ingest(b"hello", "notes.txt", "txt")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedExtension(_)));
        assert_eq!(store.put_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ai.extract_calls.load(Ordering::SeqCst), 0);
        assert!(db.protocols().list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_before_extraction() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::failing());
        let ai = Arc::new(three_step_ai());

        let err = pipeline(&db, store, ai.clone())
            .ingest(b"x", "a.png", "png")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Failed(IngestFailure::Upload(_))));
        assert!(err.to_string().starts_with("Failed to create protocol preview:"));
        assert_eq!(ai.extract_calls.load(Ordering::SeqCst), 0);
        assert!(db.protocols().list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_fatal_and_leaves_object() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::default());
        let mut ai = three_step_ai();
        ai.fail_extract = true;
        let ai = Arc::new(ai);

        let err = pipeline(&db, store.clone(), ai.clone())
            .ingest(b"x", "a.pdf", "pdf")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Failed(IngestFailure::Extraction(_))
        ));
        assert_eq!(ai.generate_calls.load(Ordering::SeqCst), 0);
        assert!(db.protocols().list_documents().await.unwrap().is_empty());
        // No compensating delete.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_step_parse_failure_keeps_document() {
        let (db, _dir) = test_db().await;
        let store = Arc::new(MemoryStore::default());
        let mut ai = three_step_ai();
        ai.steps = serde_json::json!({"not": "an array"});
        let ai = Arc::new(ai);

        let err = pipeline(&db, store, ai)
            .ingest(b"x", "a.pdf", "pdf")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Failed(IngestFailure::ParseSteps(_))
        ));
        assert_eq!(db.protocols().list_documents().await.unwrap().len(), 1);
        assert!(db.protocols().list_protocols().await.unwrap().is_empty());
    }
}
