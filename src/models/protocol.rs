//! Protocol models: the uploaded document, the parsed protocol and its steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Ingestion state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Ingested,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ingested => "ingested",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "ingested" => Some(Self::Ingested),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Raised when an uploaded file's extension is outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid file type '{0}'. Only images (jpg, jpeg, png, gif, bmp, tiff, webp) and PDFs are allowed.")]
pub struct UnsupportedExtension(pub String);

/// File formats accepted for protocol ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Jpg,
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 8] = [
        Self::Pdf,
        Self::Jpg,
        Self::Jpeg,
        Self::Png,
        Self::Gif,
        Self::Bmp,
        Self::Tiff,
        Self::Webp,
    ];

    /// Parse a bare extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Result<Self, UnsupportedExtension> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "jpg" => Ok(Self::Jpg),
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "tiff" => Ok(Self::Tiff),
            "webp" => Ok(Self::Webp),
            _ => Err(UnsupportedExtension(ext.to_string())),
        }
    }

    /// Take the extension after the last dot of a filename.
    ///
    /// A filename without a dot has an empty extension and is rejected.
    pub fn from_filename(filename: &str) -> Result<Self, UnsupportedExtension> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or_default();
        Self::from_extension(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
        }
    }

    /// Content type recorded on the stored object and document row.
    pub fn content_type(&self) -> String {
        match self {
            Self::Pdf => "application/pdf".to_string(),
            other => format!("image/{}", other.extension()),
        }
    }

    /// Content type sent to the text extraction service.
    ///
    /// `image/jpg` is not a registered type, so both JPEG spellings map to `image/jpeg`.
    pub fn extraction_mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpg | Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
        }
    }
}

/// An uploaded protocol file and its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDocument {
    pub document_id: Uuid,
    pub document_name: String,
    /// Full text extracted from the file.
    pub description: Option<String>,
    /// Locator of the raw file in the object store. Never rewritten after creation.
    pub object_url: String,
    pub mime_type: Option<String>,
    pub ingestion_status: IngestionStatus,
    pub ingested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProtocolDocument {
    /// Create a document that is still waiting for text extraction.
    pub fn pending(
        document_id: Uuid,
        document_name: String,
        object_url: String,
        mime_type: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id,
            document_name,
            description: None,
            object_url,
            mime_type: Some(mime_type),
            ingestion_status: IngestionStatus::Pending,
            ingested_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a successful extraction. Only valid from `Pending`.
    pub fn mark_ingested(&mut self, extracted_text: String) -> bool {
        if self.ingestion_status != IngestionStatus::Pending {
            return false;
        }
        let now = Utc::now();
        self.description = Some(extracted_text);
        self.ingestion_status = IngestionStatus::Ingested;
        self.ingested_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Record a failed extraction. Only valid from `Pending`.
    pub fn mark_failed(&mut self) -> bool {
        if self.ingestion_status != IngestionStatus::Pending {
            return false;
        }
        self.ingestion_status = IngestionStatus::Failed;
        self.updated_at = Utc::now();
        true
    }
}

/// A protocol parsed out of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub protocol_id: Uuid,
    pub document_id: Uuid,
    pub protocol_name: String,
    pub description: Option<String>,
    pub created_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single numbered step of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub protocol_step_id: Uuid,
    pub protocol_id: Uuid,
    /// Display ordering key. Not required to be contiguous or unique.
    pub step_number: i32,
    pub step_name: String,
    pub instruction: String,
    pub expected_duration_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Protocol together with its ordered steps and the source file locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolPreview {
    pub protocol: Protocol,
    pub protocol_steps: Vec<ProtocolStep>,
    pub object_url: String,
}

impl ProtocolPreview {
    /// Build a preview, ordering steps by step number, ties by step id.
    ///
    /// Matches the order the repository reads steps back in.
    pub fn new(protocol: Protocol, mut protocol_steps: Vec<ProtocolStep>, object_url: String) -> Self {
        protocol_steps.sort_by_key(|s| (s.step_number, s.protocol_step_id));
        Self {
            protocol,
            protocol_steps,
            object_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(DocumentFormat::Pdf.content_type(), "application/pdf");
        assert_eq!(DocumentFormat::Jpg.content_type(), "image/jpg");
        assert_eq!(DocumentFormat::Tiff.content_type(), "image/tiff");
        assert_eq!(DocumentFormat::Webp.content_type(), "image/webp");
    }

    #[test]
    fn test_extraction_mime_normalizes_jpeg() {
        assert_eq!(DocumentFormat::Jpg.extraction_mime_type(), "image/jpeg");
        assert_eq!(DocumentFormat::Jpeg.extraction_mime_type(), "image/jpeg");
        assert_eq!(DocumentFormat::Png.extraction_mime_type(), "image/png");
    }

    #[test]
    fn test_from_filename() {
        assert_eq!(
            DocumentFormat::from_filename("Western Blot.PDF").unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_filename("scan.v2.jpeg").unwrap(),
            DocumentFormat::Jpeg
        );
        assert!(DocumentFormat::from_filename("notes.txt").is_err());
        assert!(DocumentFormat::from_filename("README").is_err());
    }

    #[test]
    fn test_ingestion_transitions_only_from_pending() {
        let mut doc = ProtocolDocument::pending(
            Uuid::new_v4(),
            "pcr.pdf".to_string(),
            "http://localhost:9000/protocols/a.pdf".to_string(),
            "application/pdf".to_string(),
        );
        assert!(doc.mark_ingested("1. Mix".to_string()));
        assert_eq!(doc.ingestion_status, IngestionStatus::Ingested);
        assert!(doc.ingested_at.is_some());

        assert!(!doc.mark_failed());
        assert_eq!(doc.ingestion_status, IngestionStatus::Ingested);
    }

    #[test]
    fn test_preview_orders_steps() {
        let now = Utc::now();
        let protocol_id = Uuid::new_v4();
        let step = |n: i32| ProtocolStep {
            protocol_step_id: Uuid::new_v4(),
            protocol_id,
            step_number: n,
            step_name: format!("Step {}", n),
            instruction: String::new(),
            expected_duration_minutes: None,
            created_at: now,
            updated_at: now,
        };
        let protocol = Protocol {
            protocol_id,
            document_id: Uuid::new_v4(),
            protocol_name: "PCR".to_string(),
            description: None,
            created_by_user_id: None,
            created_at: now,
            updated_at: now,
        };

        let preview = ProtocolPreview::new(
            protocol.clone(),
            vec![step(3), step(1), step(2)],
            String::new(),
        );
        let numbers: Vec<_> = preview.protocol_steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        // Tied numbers fall back to the step id, whatever the input order.
        let tied = vec![step(2), step(2), step(1), step(2)];
        let mut reversed = tied.clone();
        reversed.reverse();
        let a = ProtocolPreview::new(protocol.clone(), tied, String::new());
        let b = ProtocolPreview::new(protocol, reversed, String::new());
        assert_eq!(a.protocol_steps, b.protocol_steps);
        assert!(a.protocol_steps[1..]
            .windows(2)
            .all(|w| w[0].protocol_step_id < w[1].protocol_step_id));
    }
}
