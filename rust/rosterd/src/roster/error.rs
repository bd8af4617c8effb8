use thiserror::Error;

use super::model::ClassId;
use crate::exams::ProvisionError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("please enter student name")]
    EmptyName,
    #[error("roster store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to encode roster: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("roster for {class} changed concurrently {attempts} times; giving up")]
    WriteConflict { class: ClassId, attempts: u32 },
    #[error("exam bank error: {0}")]
    Provision(#[from] ProvisionError),
    #[error("class lists are not valid: {0}")]
    InvalidImport(String),
    #[error("name collation unavailable: {0}")]
    Collation(String),
}

impl RosterError {
    /// Stable code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::Store(_) => "db_query_failed",
            Self::Encode(_) => "encode_failed",
            Self::WriteConflict { .. } => "write_conflict",
            Self::Provision(_) => "exam_bank_failed",
            Self::InvalidImport(_) => "bad_params",
            Self::Collation(_) => "collation_failed",
        }
    }
}
