//! Protocol Copilot - lab protocol ingestion and experiment assistant.
//!
//! Uploaded protocol documents are stored in an object store, read by a
//! multimodal model, and persisted as structured protocols with ordered
//! steps. Experiment runs against those protocols carry a voice assistant
//! whose turns are kept as a conversation log.

pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
pub mod storage;

#[cfg(test)]
mod test_support;
