//! Repository for protocol documents, protocols and protocol steps.
//!
//! Writes are insert-or-replace keyed on the caller-generated id: every
//! mutable column takes the new value, `created_at` keeps the first one.
//! Each write runs in its own transaction and returns the stored row.

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::models::{
    DocumentRecord, NewDocument, NewProtocol, NewProtocolStep, ProtocolRecord,
    ProtocolStepRecord,
};
use super::pool::{DbPool, DieselError};
use super::{
    format_datetime, format_datetime_opt, parse_datetime, parse_datetime_opt, parse_uuid,
    parse_uuid_opt,
};
use crate::models::{IngestionStatus, Protocol, ProtocolDocument, ProtocolStep};
use crate::schema::{protocol_documents, protocol_steps, protocols};
use crate::with_conn;

impl TryFrom<DocumentRecord> for ProtocolDocument {
    type Error = DieselError;

    fn try_from(record: DocumentRecord) -> Result<Self, Self::Error> {
        Ok(ProtocolDocument {
            document_id: parse_uuid(&record.document_id)?,
            document_name: record.document_name,
            description: record.description,
            object_url: record.object_url,
            mime_type: record.mime_type,
            ingestion_status: IngestionStatus::from_str(&record.ingestion_status)
                .unwrap_or(IngestionStatus::Pending),
            ingested_at: parse_datetime_opt(record.ingested_at),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

impl TryFrom<ProtocolRecord> for Protocol {
    type Error = DieselError;

    fn try_from(record: ProtocolRecord) -> Result<Self, Self::Error> {
        Ok(Protocol {
            protocol_id: parse_uuid(&record.protocol_id)?,
            document_id: parse_uuid(&record.document_id)?,
            protocol_name: record.protocol_name,
            description: record.description,
            created_by_user_id: parse_uuid_opt(record.created_by_user_id.as_deref())?,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

impl TryFrom<ProtocolStepRecord> for ProtocolStep {
    type Error = DieselError;

    fn try_from(record: ProtocolStepRecord) -> Result<Self, Self::Error> {
        Ok(ProtocolStep {
            protocol_step_id: parse_uuid(&record.protocol_step_id)?,
            protocol_id: parse_uuid(&record.protocol_id)?,
            step_number: record.step_number,
            step_name: record.step_name,
            instruction: record.instruction,
            expected_duration_minutes: record.expected_duration_minutes,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

fn convert_all<R, T>(records: Vec<R>) -> Result<Vec<T>, DieselError>
where
    T: TryFrom<R, Error = DieselError>,
{
    records.into_iter().map(T::try_from).collect()
}

/// Diesel-backed store for the ingestion tables.
#[derive(Clone)]
pub struct ProtocolRepository {
    pool: DbPool,
}

impl ProtocolRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // Documents

    /// Insert or replace a protocol document.
    pub async fn upsert_document(
        &self,
        doc: &ProtocolDocument,
    ) -> Result<ProtocolDocument, DieselError> {
        let document_id = doc.document_id.to_string();
        let ingested_at = format_datetime_opt(doc.ingested_at.as_ref());
        let created_at = format_datetime(&doc.created_at);
        let updated_at = format_datetime(&doc.updated_at);
        let new = NewDocument {
            document_id: &document_id,
            document_name: &doc.document_name,
            description: doc.description.as_deref(),
            object_url: &doc.object_url,
            mime_type: doc.mime_type.as_deref(),
            ingestion_status: doc.ingestion_status.as_str(),
            ingested_at: ingested_at.as_deref(),
            created_at: &created_at,
            updated_at: &updated_at,
        };

        let record: DocumentRecord = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::insert_into(protocol_documents::table)
                        .values(&new)
                        .on_conflict(protocol_documents::document_id)
                        .do_update()
                        .set((
                            protocol_documents::document_name
                                .eq(excluded(protocol_documents::document_name)),
                            protocol_documents::description
                                .eq(excluded(protocol_documents::description)),
                            protocol_documents::object_url
                                .eq(excluded(protocol_documents::object_url)),
                            protocol_documents::mime_type
                                .eq(excluded(protocol_documents::mime_type)),
                            protocol_documents::ingestion_status
                                .eq(excluded(protocol_documents::ingestion_status)),
                            protocol_documents::ingested_at
                                .eq(excluded(protocol_documents::ingested_at)),
                            protocol_documents::updated_at
                                .eq(excluded(protocol_documents::updated_at)),
                        ))
                        .execute(conn)
                        .await?;

                    protocol_documents::table
                        .find(new.document_id)
                        .select(DocumentRecord::as_select())
                        .first(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;

        ProtocolDocument::try_from(record)
    }

    pub async fn get_document(&self, id: &Uuid) -> Result<Option<ProtocolDocument>, DieselError> {
        let id = id.to_string();
        let record: Option<DocumentRecord> = with_conn!(self.pool, conn => {
            protocol_documents::table
                .find(&id)
                .select(DocumentRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        record.map(ProtocolDocument::try_from).transpose()
    }

    /// All documents, most recent first.
    pub async fn list_documents(&self) -> Result<Vec<ProtocolDocument>, DieselError> {
        let records: Vec<DocumentRecord> = with_conn!(self.pool, conn => {
            protocol_documents::table
                .order(protocol_documents::created_at.desc())
                .select(DocumentRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    /// Delete a document together with its protocols and their steps.
    pub async fn delete_document(&self, id: &Uuid) -> Result<bool, DieselError> {
        let id = id.to_string();
        let rows = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    let owned_protocols = protocols::table
                        .filter(protocols::document_id.eq(&id))
                        .select(protocols::protocol_id);
                    diesel::delete(
                        protocol_steps::table
                            .filter(protocol_steps::protocol_id.eq_any(owned_protocols)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::delete(protocols::table.filter(protocols::document_id.eq(&id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(protocol_documents::table.find(&id))
                        .execute(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;
        Ok(rows > 0)
    }

    // Protocols

    /// Insert or replace a protocol.
    pub async fn upsert_protocol(&self, protocol: &Protocol) -> Result<Protocol, DieselError> {
        let protocol_id = protocol.protocol_id.to_string();
        let document_id = protocol.document_id.to_string();
        let created_by = protocol.created_by_user_id.map(|u| u.to_string());
        let created_at = format_datetime(&protocol.created_at);
        let updated_at = format_datetime(&protocol.updated_at);
        let new = NewProtocol {
            protocol_id: &protocol_id,
            document_id: &document_id,
            protocol_name: &protocol.protocol_name,
            description: protocol.description.as_deref(),
            created_by_user_id: created_by.as_deref(),
            created_at: &created_at,
            updated_at: &updated_at,
        };

        let record: ProtocolRecord = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::insert_into(protocols::table)
                        .values(&new)
                        .on_conflict(protocols::protocol_id)
                        .do_update()
                        .set((
                            protocols::document_id.eq(excluded(protocols::document_id)),
                            protocols::protocol_name.eq(excluded(protocols::protocol_name)),
                            protocols::description.eq(excluded(protocols::description)),
                            protocols::created_by_user_id
                                .eq(excluded(protocols::created_by_user_id)),
                            protocols::updated_at.eq(excluded(protocols::updated_at)),
                        ))
                        .execute(conn)
                        .await?;

                    protocols::table
                        .find(new.protocol_id)
                        .select(ProtocolRecord::as_select())
                        .first(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;

        Protocol::try_from(record)
    }

    pub async fn get_protocol(&self, id: &Uuid) -> Result<Option<Protocol>, DieselError> {
        let id = id.to_string();
        let record: Option<ProtocolRecord> = with_conn!(self.pool, conn => {
            protocols::table
                .find(&id)
                .select(ProtocolRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        record.map(Protocol::try_from).transpose()
    }

    /// All protocols, most recent first.
    pub async fn list_protocols(&self) -> Result<Vec<Protocol>, DieselError> {
        let records: Vec<ProtocolRecord> = with_conn!(self.pool, conn => {
            protocols::table
                .order(protocols::created_at.desc())
                .select(ProtocolRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    /// Protocols parsed from one document, most recent first.
    pub async fn protocols_by_document(
        &self,
        document_id: &Uuid,
    ) -> Result<Vec<Protocol>, DieselError> {
        let document_id = document_id.to_string();
        let records: Vec<ProtocolRecord> = with_conn!(self.pool, conn => {
            protocols::table
                .filter(protocols::document_id.eq(&document_id))
                .order(protocols::created_at.desc())
                .select(ProtocolRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn delete_protocol(&self, id: &Uuid) -> Result<bool, DieselError> {
        let id = id.to_string();
        let rows = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::delete(protocol_steps::table.filter(protocol_steps::protocol_id.eq(&id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(protocols::table.find(&id)).execute(conn).await
                }
                .scope_boxed()
            })
            .await
        })?;
        Ok(rows > 0)
    }

    // Steps

    /// Insert or replace a protocol step.
    pub async fn upsert_step(&self, step: &ProtocolStep) -> Result<ProtocolStep, DieselError> {
        let step_id = step.protocol_step_id.to_string();
        let protocol_id = step.protocol_id.to_string();
        let created_at = format_datetime(&step.created_at);
        let updated_at = format_datetime(&step.updated_at);
        let new = NewProtocolStep {
            protocol_step_id: &step_id,
            protocol_id: &protocol_id,
            step_number: step.step_number,
            step_name: &step.step_name,
            instruction: &step.instruction,
            expected_duration_minutes: step.expected_duration_minutes,
            created_at: &created_at,
            updated_at: &updated_at,
        };

        let record: ProtocolStepRecord = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::insert_into(protocol_steps::table)
                        .values(&new)
                        .on_conflict(protocol_steps::protocol_step_id)
                        .do_update()
                        .set((
                            protocol_steps::protocol_id.eq(excluded(protocol_steps::protocol_id)),
                            protocol_steps::step_number.eq(excluded(protocol_steps::step_number)),
                            protocol_steps::step_name.eq(excluded(protocol_steps::step_name)),
                            protocol_steps::instruction.eq(excluded(protocol_steps::instruction)),
                            protocol_steps::expected_duration_minutes
                                .eq(excluded(protocol_steps::expected_duration_minutes)),
                            protocol_steps::updated_at.eq(excluded(protocol_steps::updated_at)),
                        ))
                        .execute(conn)
                        .await?;

                    protocol_steps::table
                        .find(new.protocol_step_id)
                        .select(ProtocolStepRecord::as_select())
                        .first(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;

        ProtocolStep::try_from(record)
    }

    pub async fn get_step(&self, id: &Uuid) -> Result<Option<ProtocolStep>, DieselError> {
        let id = id.to_string();
        let record: Option<ProtocolStepRecord> = with_conn!(self.pool, conn => {
            protocol_steps::table
                .find(&id)
                .select(ProtocolStepRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        record.map(ProtocolStep::try_from).transpose()
    }

    /// Steps of one protocol in display order: step number, then step id.
    pub async fn steps_by_protocol(
        &self,
        protocol_id: &Uuid,
    ) -> Result<Vec<ProtocolStep>, DieselError> {
        let protocol_id = protocol_id.to_string();
        let records: Vec<ProtocolStepRecord> = with_conn!(self.pool, conn => {
            protocol_steps::table
                .filter(protocol_steps::protocol_id.eq(&protocol_id))
                .order((
                    protocol_steps::step_number.asc(),
                    protocol_steps::protocol_step_id.asc(),
                ))
                .select(ProtocolStepRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn all_steps(&self) -> Result<Vec<ProtocolStep>, DieselError> {
        let records: Vec<ProtocolStepRecord> = with_conn!(self.pool, conn => {
            protocol_steps::table
                .order((
                    protocol_steps::protocol_id.asc(),
                    protocol_steps::step_number.asc(),
                    protocol_steps::protocol_step_id.asc(),
                ))
                .select(ProtocolStepRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn delete_step(&self, id: &Uuid) -> Result<bool, DieselError> {
        let id = id.to_string();
        let rows = with_conn!(self.pool, conn => {
            diesel::delete(protocol_steps::table.find(&id))
                .execute(&mut conn)
                .await
        })?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProtocolPreview;
    use crate::repository::DbContext;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    async fn setup_repo() -> (ProtocolRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_sqlite_path(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx.protocols(), dir)
    }

    fn sample_document() -> ProtocolDocument {
        let mut doc = ProtocolDocument::pending(
            Uuid::new_v4(),
            "western-blot.pdf".to_string(),
            "http://localhost:9000/protocols/abc.pdf".to_string(),
            "application/pdf".to_string(),
        );
        doc.mark_ingested("1. Run gel".to_string());
        doc
    }

    fn sample_protocol(document_id: Uuid) -> Protocol {
        let now = Utc::now();
        Protocol {
            protocol_id: Uuid::new_v4(),
            document_id,
            protocol_name: "Western Blot".to_string(),
            description: Some("Detect proteins".to_string()),
            created_by_user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_step(protocol_id: Uuid, number: i32) -> ProtocolStep {
        let now = Utc::now();
        ProtocolStep {
            protocol_step_id: Uuid::new_v4(),
            protocol_id,
            step_number: number,
            step_name: format!("Step {}", number),
            instruction: "Do the thing".to_string(),
            expected_duration_minutes: Some(5),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_document_crud() {
        let (repo, _dir) = setup_repo().await;
        let doc = sample_document();

        let stored = repo.upsert_document(&doc).await.unwrap();
        assert_eq!(stored, doc);

        let fetched = repo.get_document(&doc.document_id).await.unwrap().unwrap();
        assert_eq!(fetched.ingestion_status, IngestionStatus::Ingested);
        assert_eq!(fetched.description.as_deref(), Some("1. Run gel"));

        assert_eq!(repo.list_documents().await.unwrap().len(), 1);
        assert!(repo.delete_document(&doc.document_id).await.unwrap());
        assert!(repo.get_document(&doc.document_id).await.unwrap().is_none());
        assert!(!repo.delete_document(&doc.document_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_mutable_columns_and_keeps_created_at() {
        let (repo, _dir) = setup_repo().await;
        let doc = repo.upsert_document(&sample_document()).await.unwrap();

        let first = repo
            .upsert_protocol(&sample_protocol(doc.document_id))
            .await
            .unwrap();

        let mut changed = first.clone();
        changed.protocol_name = "Western Blot v2".to_string();
        changed.description = None;
        changed.created_at = first.created_at + Duration::hours(1);
        changed.updated_at = first.updated_at + Duration::hours(1);
        let second = repo.upsert_protocol(&changed).await.unwrap();

        assert_eq!(second.protocol_name, "Western Blot v2");
        assert_eq!(second.description, None);
        assert_eq!(second.updated_at, changed.updated_at);
        assert_eq!(second.created_at, first.created_at);

        let fetched = repo.get_protocol(&first.protocol_id).await.unwrap().unwrap();
        assert_eq!(fetched, second);
        assert_eq!(repo.list_protocols().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_steps_ordered_by_step_number() {
        let (repo, _dir) = setup_repo().await;
        let doc = repo.upsert_document(&sample_document()).await.unwrap();
        let protocol = repo
            .upsert_protocol(&sample_protocol(doc.document_id))
            .await
            .unwrap();

        for n in [3, 1, 2] {
            repo.upsert_step(&sample_step(protocol.protocol_id, n))
                .await
                .unwrap();
        }

        let numbers: Vec<_> = repo
            .steps_by_protocol(&protocol.protocol_id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.step_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(repo.all_steps().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_tied_step_numbers_match_preview_order() {
        let (repo, _dir) = setup_repo().await;
        let doc = repo.upsert_document(&sample_document()).await.unwrap();
        let protocol = repo
            .upsert_protocol(&sample_protocol(doc.document_id))
            .await
            .unwrap();

        let mut written = Vec::new();
        for n in [2, 1, 2, 2, 1] {
            written.push(
                repo.upsert_step(&sample_step(protocol.protocol_id, n))
                    .await
                    .unwrap(),
            );
        }

        let stored = repo.steps_by_protocol(&protocol.protocol_id).await.unwrap();
        let preview = ProtocolPreview::new(protocol, written, doc.object_url);
        assert_eq!(stored, preview.protocol_steps);
    }

    #[tokio::test]
    async fn test_lists_most_recent_first() {
        let (repo, _dir) = setup_repo().await;
        let doc = repo.upsert_document(&sample_document()).await.unwrap();

        let mut older = sample_protocol(doc.document_id);
        older.created_at = Utc::now() - Duration::days(1);
        let newer = sample_protocol(doc.document_id);
        repo.upsert_protocol(&older).await.unwrap();
        repo.upsert_protocol(&newer).await.unwrap();

        let listed = repo.protocols_by_document(&doc.document_id).await.unwrap();
        assert_eq!(listed[0].protocol_id, newer.protocol_id);
        assert_eq!(listed[1].protocol_id, older.protocol_id);
    }

    #[tokio::test]
    async fn test_delete_document_removes_protocols_and_steps() {
        let (repo, _dir) = setup_repo().await;
        let doc = repo.upsert_document(&sample_document()).await.unwrap();
        let protocol = repo
            .upsert_protocol(&sample_protocol(doc.document_id))
            .await
            .unwrap();
        let step = repo
            .upsert_step(&sample_step(protocol.protocol_id, 1))
            .await
            .unwrap();

        assert!(repo.delete_document(&doc.document_id).await.unwrap());
        assert!(repo.get_protocol(&protocol.protocol_id).await.unwrap().is_none());
        assert!(repo.get_step(&step.protocol_step_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_protocol_and_step() {
        let (repo, _dir) = setup_repo().await;
        let doc = repo.upsert_document(&sample_document()).await.unwrap();
        let protocol = repo
            .upsert_protocol(&sample_protocol(doc.document_id))
            .await
            .unwrap();
        let keep = repo
            .upsert_step(&sample_step(protocol.protocol_id, 1))
            .await
            .unwrap();
        let drop = repo
            .upsert_step(&sample_step(protocol.protocol_id, 2))
            .await
            .unwrap();

        assert!(repo.delete_step(&drop.protocol_step_id).await.unwrap());
        assert_eq!(
            repo.steps_by_protocol(&protocol.protocol_id).await.unwrap(),
            vec![keep]
        );

        assert!(repo.delete_protocol(&protocol.protocol_id).await.unwrap());
        assert!(repo.all_steps().await.unwrap().is_empty());
    }
}
