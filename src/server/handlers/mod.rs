//! HTTP request handlers.

mod documents;
mod experiments;
mod files;
mod health;
mod protocols;

pub use documents::{
    delete_document, document_file, document_protocols, get_document, list_documents,
};
pub use experiments::{
    complete_step, experiment_conversation, experiment_steps, experiments_by_protocol,
    experiments_by_user, get_experiment, start_experiment, start_step, stop_experiment,
    voice_turn,
};
pub use files::serve_object;
pub use health::{health, root};
pub use protocols::{
    get_protocol, get_protocol_complete, get_protocol_steps, list_protocols, upload_protocol,
};
