use std::path::PathBuf;

use crate::model::plan::PlanStatus;
use crate::parse::frontmatter::FieldError;

/// Error type for library operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("Plan not found: {0}")]
    NotFound(String),
    #[error("plan already exists: {0}")]
    AlreadyExists(String),
    #[error("{filename} was modified externally (last known {last_known}, now {current})")]
    Conflict {
        filename: String,
        last_known: i64,
        current: i64,
    },
    #[error("content is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: PlanStatus, to: PlanStatus },
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("View not found: {0}")]
    ViewNotFound(String),
    #[error("preset views cannot be changed: {0}")]
    PresetView(String),
    #[error("Archived plan not found: {0}")]
    ArchiveNotFound(String),
    #[error("an archived plan is already named {0}")]
    AlreadyArchived(String),
    #[error("Backup not found: {0}")]
    BackupNotFound(String),
    #[error("could not build export: {0}")]
    Export(String),
    #[error("Subtask not found: {0}")]
    SubtaskNotFound(String),
    #[error("could not find a free filename after {0} attempts")]
    NamesExhausted(usize),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("could not edit config: {0}")]
    ConfigEdit(#[from] toml_edit::TomlError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

/// Broad class of a failure, shared by the RPC and HTTP surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Conflict,
    TooLarge,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Invalid => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TooLarge => "payload_too_large",
            ErrorKind::Internal => "internal",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidFilename(_)
            | StoreError::InvalidTransition { .. }
            | StoreError::Field(_)
            | StoreError::Invalid(_)
            | StoreError::PresetView(_)
            | StoreError::ConfigParse(_)
            | StoreError::ConfigEdit(_) => ErrorKind::Invalid,
            StoreError::NotFound(_)
            | StoreError::ViewNotFound(_)
            | StoreError::ArchiveNotFound(_)
            | StoreError::BackupNotFound(_)
            | StoreError::SubtaskNotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_)
            | StoreError::AlreadyArchived(_)
            | StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::TooLarge { .. } => ErrorKind::TooLarge,
            StoreError::NamesExhausted(_)
            | StoreError::Export(_)
            | StoreError::Io { .. }
            | StoreError::Json { .. } => ErrorKind::Internal,
        }
    }
}
