//! Repository for experiment runs, their step executions and conversations.

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::models::{
    ConversationRecord, ExperimentRecord, ExperimentStepRecord, NewConversation, NewExperiment,
    NewExperimentStep,
};
use super::pool::{DbPool, DieselError};
use super::{
    format_datetime, format_datetime_opt, parse_datetime, parse_datetime_opt, parse_uuid,
    parse_uuid_opt,
};
use crate::models::{
    Experiment, ExperimentConversation, ExperimentStatus, ExperimentStep, MessageType,
    SenderRole, StepStatus,
};
use crate::schema::{experiment_conversations, experiment_steps, experiments};
use crate::with_conn;

fn unknown_enum(column: &str, value: &str) -> DieselError {
    DieselError::DeserializationError(
        format!("unknown {} value '{}'", column, value).into(),
    )
}

impl TryFrom<ExperimentRecord> for Experiment {
    type Error = DieselError;

    fn try_from(record: ExperimentRecord) -> Result<Self, Self::Error> {
        Ok(Experiment {
            experiment_id: parse_uuid(&record.experiment_id)?,
            protocol_id: parse_uuid(&record.protocol_id)?,
            user_id: parse_uuid_opt(record.user_id.as_deref())?,
            start_time: parse_datetime_opt(record.start_time),
            end_time: parse_datetime_opt(record.end_time),
            status: ExperimentStatus::from_str(&record.status)
                .ok_or_else(|| unknown_enum("status", &record.status))?,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

impl TryFrom<ExperimentStepRecord> for ExperimentStep {
    type Error = DieselError;

    fn try_from(record: ExperimentStepRecord) -> Result<Self, Self::Error> {
        Ok(ExperimentStep {
            experiment_step_id: parse_uuid(&record.experiment_step_id)?,
            experiment_id: parse_uuid(&record.experiment_id)?,
            protocol_step_id: parse_uuid(&record.protocol_step_id)?,
            actual_start_time: parse_datetime_opt(record.actual_start_time),
            actual_end_time: parse_datetime_opt(record.actual_end_time),
            status: StepStatus::from_str(&record.status)
                .ok_or_else(|| unknown_enum("status", &record.status))?,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

impl TryFrom<ConversationRecord> for ExperimentConversation {
    type Error = DieselError;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        Ok(ExperimentConversation {
            message_id: parse_uuid(&record.message_id)?,
            experiment_id: parse_uuid(&record.experiment_id)?,
            experiment_step_id: parse_uuid_opt(record.experiment_step_id.as_deref())?,
            sender_role: SenderRole::from_str(&record.sender_role)
                .ok_or_else(|| unknown_enum("sender_role", &record.sender_role))?,
            message_type: MessageType::from_str(&record.message_type)
                .ok_or_else(|| unknown_enum("message_type", &record.message_type))?,
            content: record.content,
            created_at: parse_datetime(&record.created_at),
        })
    }
}

fn convert_all<R, T>(records: Vec<R>) -> Result<Vec<T>, DieselError>
where
    T: TryFrom<R, Error = DieselError>,
{
    records.into_iter().map(T::try_from).collect()
}

/// Diesel-backed store for the experiment tables.
#[derive(Clone)]
pub struct ExperimentRepository {
    pool: DbPool,
}

impl ExperimentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // Experiments

    /// Insert or replace an experiment; `created_at` keeps its first value.
    pub async fn upsert_experiment(
        &self,
        experiment: &Experiment,
    ) -> Result<Experiment, DieselError> {
        let experiment_id = experiment.experiment_id.to_string();
        let protocol_id = experiment.protocol_id.to_string();
        let user_id = experiment.user_id.map(|u| u.to_string());
        let start_time = format_datetime_opt(experiment.start_time.as_ref());
        let end_time = format_datetime_opt(experiment.end_time.as_ref());
        let created_at = format_datetime(&experiment.created_at);
        let updated_at = format_datetime(&experiment.updated_at);
        let new = NewExperiment {
            experiment_id: &experiment_id,
            protocol_id: &protocol_id,
            user_id: user_id.as_deref(),
            start_time: start_time.as_deref(),
            end_time: end_time.as_deref(),
            status: experiment.status.as_str(),
            created_at: &created_at,
            updated_at: &updated_at,
        };

        let record: ExperimentRecord = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::insert_into(experiments::table)
                        .values(&new)
                        .on_conflict(experiments::experiment_id)
                        .do_update()
                        .set((
                            experiments::protocol_id.eq(excluded(experiments::protocol_id)),
                            experiments::user_id.eq(excluded(experiments::user_id)),
                            experiments::start_time.eq(excluded(experiments::start_time)),
                            experiments::end_time.eq(excluded(experiments::end_time)),
                            experiments::status.eq(excluded(experiments::status)),
                            experiments::updated_at.eq(excluded(experiments::updated_at)),
                        ))
                        .execute(conn)
                        .await?;

                    experiments::table
                        .find(new.experiment_id)
                        .select(ExperimentRecord::as_select())
                        .first(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;

        Experiment::try_from(record)
    }

    pub async fn get_experiment(&self, id: &Uuid) -> Result<Option<Experiment>, DieselError> {
        let id = id.to_string();
        let record: Option<ExperimentRecord> = with_conn!(self.pool, conn => {
            experiments::table
                .find(&id)
                .select(ExperimentRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        record.map(Experiment::try_from).transpose()
    }

    /// All experiments, most recent first.
    pub async fn list_experiments(&self) -> Result<Vec<Experiment>, DieselError> {
        let records: Vec<ExperimentRecord> = with_conn!(self.pool, conn => {
            experiments::table
                .order(experiments::created_at.desc())
                .select(ExperimentRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn experiments_by_protocol(
        &self,
        protocol_id: &Uuid,
    ) -> Result<Vec<Experiment>, DieselError> {
        let protocol_id = protocol_id.to_string();
        let records: Vec<ExperimentRecord> = with_conn!(self.pool, conn => {
            experiments::table
                .filter(experiments::protocol_id.eq(&protocol_id))
                .order(experiments::created_at.desc())
                .select(ExperimentRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn experiments_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<Experiment>, DieselError> {
        let user_id = user_id.to_string();
        let records: Vec<ExperimentRecord> = with_conn!(self.pool, conn => {
            experiments::table
                .filter(experiments::user_id.eq(&user_id))
                .order(experiments::created_at.desc())
                .select(ExperimentRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    /// Delete an experiment with its steps and conversation.
    pub async fn delete_experiment(&self, id: &Uuid) -> Result<bool, DieselError> {
        let id = id.to_string();
        let rows = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::delete(
                        experiment_conversations::table
                            .filter(experiment_conversations::experiment_id.eq(&id)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::delete(
                        experiment_steps::table.filter(experiment_steps::experiment_id.eq(&id)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::delete(experiments::table.find(&id)).execute(conn).await
                }
                .scope_boxed()
            })
            .await
        })?;
        Ok(rows > 0)
    }

    // Experiment steps

    pub async fn upsert_step(&self, step: &ExperimentStep) -> Result<ExperimentStep, DieselError> {
        let step_id = step.experiment_step_id.to_string();
        let experiment_id = step.experiment_id.to_string();
        let protocol_step_id = step.protocol_step_id.to_string();
        let start = format_datetime_opt(step.actual_start_time.as_ref());
        let end = format_datetime_opt(step.actual_end_time.as_ref());
        let created_at = format_datetime(&step.created_at);
        let updated_at = format_datetime(&step.updated_at);
        let new = NewExperimentStep {
            experiment_step_id: &step_id,
            experiment_id: &experiment_id,
            protocol_step_id: &protocol_step_id,
            actual_start_time: start.as_deref(),
            actual_end_time: end.as_deref(),
            status: step.status.as_str(),
            created_at: &created_at,
            updated_at: &updated_at,
        };

        let record: ExperimentStepRecord = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::insert_into(experiment_steps::table)
                        .values(&new)
                        .on_conflict(experiment_steps::experiment_step_id)
                        .do_update()
                        .set((
                            experiment_steps::experiment_id
                                .eq(excluded(experiment_steps::experiment_id)),
                            experiment_steps::protocol_step_id
                                .eq(excluded(experiment_steps::protocol_step_id)),
                            experiment_steps::actual_start_time
                                .eq(excluded(experiment_steps::actual_start_time)),
                            experiment_steps::actual_end_time
                                .eq(excluded(experiment_steps::actual_end_time)),
                            experiment_steps::status.eq(excluded(experiment_steps::status)),
                            experiment_steps::updated_at.eq(excluded(experiment_steps::updated_at)),
                        ))
                        .execute(conn)
                        .await?;

                    experiment_steps::table
                        .find(new.experiment_step_id)
                        .select(ExperimentStepRecord::as_select())
                        .first(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;

        ExperimentStep::try_from(record)
    }

    pub async fn get_step(&self, id: &Uuid) -> Result<Option<ExperimentStep>, DieselError> {
        let id = id.to_string();
        let record: Option<ExperimentStepRecord> = with_conn!(self.pool, conn => {
            experiment_steps::table
                .find(&id)
                .select(ExperimentStepRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        record.map(ExperimentStep::try_from).transpose()
    }

    /// Steps of one experiment in chronological order.
    pub async fn steps_by_experiment(
        &self,
        experiment_id: &Uuid,
    ) -> Result<Vec<ExperimentStep>, DieselError> {
        let experiment_id = experiment_id.to_string();
        let records: Vec<ExperimentStepRecord> = with_conn!(self.pool, conn => {
            experiment_steps::table
                .filter(experiment_steps::experiment_id.eq(&experiment_id))
                .order(experiment_steps::created_at.asc())
                .select(ExperimentStepRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn delete_step(&self, id: &Uuid) -> Result<bool, DieselError> {
        let id = id.to_string();
        let rows = with_conn!(self.pool, conn => {
            diesel::delete(experiment_steps::table.find(&id))
                .execute(&mut conn)
                .await
        })?;
        Ok(rows > 0)
    }

    // Conversation

    /// Append a conversation message.
    ///
    /// The log is append-only: re-appending an existing `message_id` leaves
    /// the stored message untouched and returns it.
    pub async fn append_message(
        &self,
        message: &ExperimentConversation,
    ) -> Result<ExperimentConversation, DieselError> {
        let message_id = message.message_id.to_string();
        let experiment_id = message.experiment_id.to_string();
        let step_id = message.experiment_step_id.map(|u| u.to_string());
        let created_at = format_datetime(&message.created_at);
        let new = NewConversation {
            message_id: &message_id,
            experiment_id: &experiment_id,
            experiment_step_id: step_id.as_deref(),
            sender_role: message.sender_role.as_str(),
            message_type: message.message_type.as_str(),
            content: &message.content,
            created_at: &created_at,
        };

        let record: ConversationRecord = with_conn!(self.pool, conn => {
            conn.transaction::<_, DieselError, _>(|conn| {
                async move {
                    diesel::insert_into(experiment_conversations::table)
                        .values(&new)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;

                    experiment_conversations::table
                        .find(new.message_id)
                        .select(ConversationRecord::as_select())
                        .first(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
        })?;

        ExperimentConversation::try_from(record)
    }

    pub async fn get_message(
        &self,
        id: &Uuid,
    ) -> Result<Option<ExperimentConversation>, DieselError> {
        let id = id.to_string();
        let record: Option<ConversationRecord> = with_conn!(self.pool, conn => {
            experiment_conversations::table
                .find(&id)
                .select(ConversationRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        record.map(ExperimentConversation::try_from).transpose()
    }

    /// Conversation of one experiment in chronological order.
    pub async fn messages_by_experiment(
        &self,
        experiment_id: &Uuid,
    ) -> Result<Vec<ExperimentConversation>, DieselError> {
        let experiment_id = experiment_id.to_string();
        let records: Vec<ConversationRecord> = with_conn!(self.pool, conn => {
            experiment_conversations::table
                .filter(experiment_conversations::experiment_id.eq(&experiment_id))
                .order(experiment_conversations::created_at.asc())
                .select(ConversationRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn messages_by_step(
        &self,
        experiment_step_id: &Uuid,
    ) -> Result<Vec<ExperimentConversation>, DieselError> {
        let step_id = experiment_step_id.to_string();
        let records: Vec<ConversationRecord> = with_conn!(self.pool, conn => {
            experiment_conversations::table
                .filter(experiment_conversations::experiment_step_id.eq(&step_id))
                .order(experiment_conversations::created_at.asc())
                .select(ConversationRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn messages_by_sender(
        &self,
        experiment_id: &Uuid,
        sender_role: SenderRole,
    ) -> Result<Vec<ExperimentConversation>, DieselError> {
        let experiment_id = experiment_id.to_string();
        let records: Vec<ConversationRecord> = with_conn!(self.pool, conn => {
            experiment_conversations::table
                .filter(experiment_conversations::experiment_id.eq(&experiment_id))
                .filter(experiment_conversations::sender_role.eq(sender_role.as_str()))
                .order(experiment_conversations::created_at.asc())
                .select(ConversationRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        convert_all(records)
    }

    pub async fn delete_message(&self, id: &Uuid) -> Result<bool, DieselError> {
        let id = id.to_string();
        let rows = with_conn!(self.pool, conn => {
            diesel::delete(experiment_conversations::table.find(&id))
                .execute(&mut conn)
                .await
        })?;
        Ok(rows > 0)
    }
}
