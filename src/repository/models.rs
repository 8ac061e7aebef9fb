//! Diesel row types for every table.
//!
//! Records own their strings for loading; `New*` structs borrow for insertion.

use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::protocol_documents)]
#[diesel(primary_key(document_id))]
pub struct DocumentRecord {
    pub document_id: String,
    pub document_name: String,
    pub description: Option<String>,
    pub object_url: String,
    pub mime_type: Option<String>,
    pub ingestion_status: String,
    pub ingested_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::protocol_documents)]
pub struct NewDocument<'a> {
    pub document_id: &'a str,
    pub document_name: &'a str,
    pub description: Option<&'a str>,
    pub object_url: &'a str,
    pub mime_type: Option<&'a str>,
    pub ingestion_status: &'a str,
    pub ingested_at: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::protocols)]
#[diesel(primary_key(protocol_id))]
pub struct ProtocolRecord {
    pub protocol_id: String,
    pub document_id: String,
    pub protocol_name: String,
    pub description: Option<String>,
    pub created_by_user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::protocols)]
pub struct NewProtocol<'a> {
    pub protocol_id: &'a str,
    pub document_id: &'a str,
    pub protocol_name: &'a str,
    pub description: Option<&'a str>,
    pub created_by_user_id: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::protocol_steps)]
#[diesel(primary_key(protocol_step_id))]
pub struct ProtocolStepRecord {
    pub protocol_step_id: String,
    pub protocol_id: String,
    pub step_number: i32,
    pub step_name: String,
    pub instruction: String,
    pub expected_duration_minutes: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::protocol_steps)]
pub struct NewProtocolStep<'a> {
    pub protocol_step_id: &'a str,
    pub protocol_id: &'a str,
    pub step_number: i32,
    pub step_name: &'a str,
    pub instruction: &'a str,
    pub expected_duration_minutes: Option<i32>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::experiments)]
#[diesel(primary_key(experiment_id))]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub protocol_id: String,
    pub user_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::experiments)]
pub struct NewExperiment<'a> {
    pub experiment_id: &'a str,
    pub protocol_id: &'a str,
    pub user_id: Option<&'a str>,
    pub start_time: Option<&'a str>,
    pub end_time: Option<&'a str>,
    pub status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::experiment_steps)]
#[diesel(primary_key(experiment_step_id))]
pub struct ExperimentStepRecord {
    pub experiment_step_id: String,
    pub experiment_id: String,
    pub protocol_step_id: String,
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::experiment_steps)]
pub struct NewExperimentStep<'a> {
    pub experiment_step_id: &'a str,
    pub experiment_id: &'a str,
    pub protocol_step_id: &'a str,
    pub actual_start_time: Option<&'a str>,
    pub actual_end_time: Option<&'a str>,
    pub status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::experiment_conversations)]
#[diesel(primary_key(message_id))]
pub struct ConversationRecord {
    pub message_id: String,
    pub experiment_id: String,
    pub experiment_step_id: Option<String>,
    pub sender_role: String,
    pub message_type: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::experiment_conversations)]
pub struct NewConversation<'a> {
    pub message_id: &'a str,
    pub experiment_id: &'a str,
    pub experiment_step_id: Option<&'a str>,
    pub sender_role: &'a str,
    pub message_type: &'a str,
    pub content: &'a str,
    pub created_at: &'a str,
}
