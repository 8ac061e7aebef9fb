// Kept in sync by hand with `DbContext::init_schema`.

diesel::table! {
    protocol_documents (document_id) {
        document_id -> Text,
        document_name -> Text,
        description -> Nullable<Text>,
        object_url -> Text,
        mime_type -> Nullable<Text>,
        ingestion_status -> Text,
        ingested_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    protocols (protocol_id) {
        protocol_id -> Text,
        document_id -> Text,
        protocol_name -> Text,
        description -> Nullable<Text>,
        created_by_user_id -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    protocol_steps (protocol_step_id) {
        protocol_step_id -> Text,
        protocol_id -> Text,
        step_number -> Integer,
        step_name -> Text,
        instruction -> Text,
        expected_duration_minutes -> Nullable<Integer>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    experiments (experiment_id) {
        experiment_id -> Text,
        protocol_id -> Text,
        user_id -> Nullable<Text>,
        start_time -> Nullable<Text>,
        end_time -> Nullable<Text>,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    experiment_steps (experiment_step_id) {
        experiment_step_id -> Text,
        experiment_id -> Text,
        protocol_step_id -> Text,
        actual_start_time -> Nullable<Text>,
        actual_end_time -> Nullable<Text>,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    experiment_conversations (message_id) {
        message_id -> Text,
        experiment_id -> Text,
        experiment_step_id -> Nullable<Text>,
        sender_role -> Text,
        message_type -> Text,
        content -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(protocols -> protocol_documents (document_id));
diesel::joinable!(protocol_steps -> protocols (protocol_id));
diesel::joinable!(experiments -> protocols (protocol_id));
diesel::joinable!(experiment_steps -> experiments (experiment_id));
diesel::joinable!(experiment_conversations -> experiments (experiment_id));

diesel::allow_tables_to_appear_in_same_query!(
    protocol_documents,
    protocols,
    protocol_steps,
    experiments,
    experiment_steps,
    experiment_conversations,
);
