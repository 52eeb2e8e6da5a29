//! Named-channel request/response surface: `channel` + JSON payload in,
//! JSON out. Channel names follow the desktop shell's IPC channels.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::io::{ErrorKind, Library, StoreError};
use crate::model::backup::PlanFile;
use crate::model::plan::PlanStatus;
use crate::model::settings::SettingsUpdate;
use crate::model::view::{CreateViewRequest, UpdateViewRequest};
use crate::ops::export::{ExportFormat, ExportOptions};
use crate::ops::search::DEFAULT_LIMIT;
use crate::ops::subtask_ops::SubtaskAction;

/// Every channel `dispatch` answers
pub const CHANNELS: &[&str] = &[
    "plans:list",
    "plans:get",
    "plans:create",
    "plans:update",
    "plans:delete",
    "plans:rename",
    "plans:updateStatus",
    "plans:updateFrontmatter",
    "plans:bulkDelete",
    "plans:bulkStatus",
    "plans:subtask",
    "plans:availableTransitions",
    "plans:checkConflict",
    "plans:migrate",
    "search:query",
    "dependencies:graph",
    "dependencies:plan",
    "archive:list",
    "archive:restore",
    "archive:delete",
    "archive:cleanup",
    "notifications:list",
    "notifications:markRead",
    "notifications:markAllRead",
    "settings:get",
    "settings:update",
    "views:list",
    "views:get",
    "views:create",
    "views:update",
    "views:delete",
    "check:run",
    "import:markdown",
    "export:backup",
    "export:listBackups",
    "export:restoreBackup",
    "export:json",
    "export:csv",
];

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("invalid payload for {channel}: {message}")]
    InvalidPayload { channel: String, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not encode response: {0}")]
    Encode(serde_json::Error),
}

impl RpcError {
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::UnknownChannel(_) => "unknown_channel",
            RpcError::InvalidPayload { .. } => ErrorKind::Invalid.as_str(),
            RpcError::Store(e) => e.kind().as_str(),
            RpcError::Encode(_) => ErrorKind::Internal.as_str(),
        }
    }

    /// `{ "error": code, "message": text }`
    pub fn to_json(&self) -> Value {
        json!({ "error": self.code(), "message": self.to_string() })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilenameArg {
    Bare(String),
    Object { filename: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdArg {
    Bare(String),
    Object { id: String },
}

#[derive(Deserialize)]
struct CreateArgs {
    content: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Deserialize)]
struct UpdateArgs {
    filename: String,
    content: String,
}

#[derive(Deserialize)]
struct DeleteArgs {
    filename: String,
    #[serde(default)]
    archive: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeleteArg {
    Bare(String),
    Object(DeleteArgs),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameArgs {
    filename: String,
    new_filename: String,
}

#[derive(Deserialize)]
struct StatusArgs {
    filename: String,
    status: PlanStatus,
}

#[derive(Deserialize)]
struct FrontmatterArgs {
    filename: String,
    field: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct BulkDeleteArgs {
    filenames: Vec<String>,
    #[serde(default)]
    archive: bool,
}

#[derive(Deserialize)]
struct BulkStatusArgs {
    filenames: Vec<String>,
    status: PlanStatus,
}

#[derive(Deserialize)]
struct SubtaskArgs {
    filename: String,
    #[serde(flatten)]
    action: SubtaskAction,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryArg {
    Bare(String),
    Object {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    },
}

#[derive(Deserialize)]
struct UpdateViewArgs {
    id: String,
    #[serde(flatten)]
    update: UpdateViewRequest,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportArg {
    Bare(Vec<PlanFile>),
    Object { files: Vec<PlanFile> },
}

fn args<T: DeserializeOwned>(channel: &str, payload: Value) -> Result<T, RpcError> {
    serde_json::from_value(payload).map_err(|e| RpcError::InvalidPayload {
        channel: channel.to_string(),
        message: e.to_string(),
    })
}

fn reply<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::Encode)
}

fn filename(channel: &str, payload: Value) -> Result<String, RpcError> {
    Ok(match args(channel, payload)? {
        FilenameArg::Bare(f) | FilenameArg::Object { filename: f } => f,
    })
}

fn id(channel: &str, payload: Value) -> Result<String, RpcError> {
    Ok(match args(channel, payload)? {
        IdArg::Bare(id) | IdArg::Object { id } => id,
    })
}

/// Exports travel as text, like the files they would be saved to.
fn export_text(lib: &Library, channel: &str, format: ExportFormat, payload: Value) -> Result<Value, RpcError> {
    let options: Option<ExportOptions> = args(channel, payload)?;
    let bytes = lib.export(format, &options.unwrap_or_default())?;
    let text = String::from_utf8(bytes).map_err(|e| StoreError::Export(e.to_string()))?;
    reply(text)
}

/// Route one request to the library.
pub fn dispatch(lib: &Library, channel: &str, payload: Value) -> Result<Value, RpcError> {
    log::debug!("rpc {}", channel);
    match channel {
        "plans:list" => reply(lib.list_plans()),
        "plans:get" => reply(lib.get_plan(&filename(channel, payload)?)?),
        "plans:create" => {
            let a: CreateArgs = args(channel, payload)?;
            reply(lib.create_plan(&a.content, a.filename.as_deref())?)
        }
        "plans:update" => {
            let a: UpdateArgs = args(channel, payload)?;
            reply(lib.update_plan(&a.filename, &a.content)?)
        }
        "plans:delete" => {
            let (name, archive) = match args(channel, payload)? {
                DeleteArg::Bare(f) => (f, false),
                DeleteArg::Object(a) => (a.filename, a.archive),
            };
            lib.delete_plan(&name, archive)?;
            reply(json!({ "success": true }))
        }
        "plans:rename" => {
            let a: RenameArgs = args(channel, payload)?;
            reply(lib.rename_plan(&a.filename, &a.new_filename)?)
        }
        "plans:updateStatus" => {
            let a: StatusArgs = args(channel, payload)?;
            reply(lib.update_status(&a.filename, a.status)?)
        }
        "plans:updateFrontmatter" => {
            let a: FrontmatterArgs = args(channel, payload)?;
            reply(lib.update_frontmatter_field(&a.filename, &a.field, a.value)?)
        }
        "plans:bulkDelete" => {
            let a: BulkDeleteArgs = args(channel, payload)?;
            reply(lib.bulk_delete(&a.filenames, a.archive))
        }
        "plans:bulkStatus" => {
            let a: BulkStatusArgs = args(channel, payload)?;
            reply(lib.bulk_status(&a.filenames, a.status))
        }
        "plans:subtask" => {
            let a: SubtaskArgs = args(channel, payload)?;
            reply(lib.apply_subtask(&a.filename, a.action)?)
        }
        "plans:availableTransitions" => {
            reply(lib.available_transitions(&filename(channel, payload)?)?)
        }
        "plans:checkConflict" => reply(lib.check_conflict(&filename(channel, payload)?)?),
        "plans:migrate" => reply(json!({ "migrated": lib.migrate_all()? })),
        "search:query" => {
            let (query, limit) = match args(channel, payload)? {
                QueryArg::Bare(q) => (q, None),
                QueryArg::Object { query, limit } => (query, limit),
            };
            reply(lib.search(&query, limit.unwrap_or(DEFAULT_LIMIT)))
        }
        "dependencies:graph" => reply(lib.dependency_graph()),
        "dependencies:plan" => reply(lib.plan_dependencies(&filename(channel, payload)?)?),
        "archive:list" => {
            let archived = lib.archived();
            reply(json!({ "total": archived.len(), "archived": archived }))
        }
        "archive:restore" => {
            let name = filename(channel, payload)?;
            lib.restore_archived(&name)?;
            reply(json!({ "success": true, "filename": name }))
        }
        "archive:delete" => {
            lib.delete_archived(&filename(channel, payload)?)?;
            reply(json!({ "success": true }))
        }
        "archive:cleanup" => reply(json!({ "deleted": lib.cleanup_archive()? })),
        "notifications:list" => reply(lib.notifications()),
        "notifications:markRead" => {
            lib.mark_read(&id(channel, payload)?)?;
            reply(json!({ "success": true }))
        }
        "notifications:markAllRead" => reply(json!({ "marked": lib.mark_all_read()? })),
        "settings:get" => reply(lib.settings().get()),
        "settings:update" => {
            let update: SettingsUpdate = args(channel, payload)?;
            reply(lib.settings().update(update)?)
        }
        "views:list" => reply(json!({ "views": lib.views().list() })),
        "views:get" => reply(lib.views().get(&id(channel, payload)?)?),
        "views:create" => {
            let request: CreateViewRequest = args(channel, payload)?;
            reply(lib.views().create(request)?)
        }
        "views:update" => {
            let a: UpdateViewArgs = args(channel, payload)?;
            reply(lib.views().update(&a.id, a.update)?)
        }
        "views:delete" => {
            lib.views().delete(&id(channel, payload)?)?;
            reply(json!({ "success": true }))
        }
        "check:run" => reply(lib.check()),
        "import:markdown" => {
            let files = match args(channel, payload)? {
                ImportArg::Bare(files) | ImportArg::Object { files } => files,
            };
            if files.is_empty() {
                return Err(RpcError::InvalidPayload {
                    channel: channel.to_string(),
                    message: "at least one file is required".to_string(),
                });
            }
            reply(lib.import_markdown(files))
        }
        "export:backup" => reply(lib.create_backup()?),
        "export:listBackups" => reply(lib.list_backups()),
        "export:restoreBackup" => reply(lib.restore_backup(&id(channel, payload)?)?),
        "export:json" => export_text(lib, channel, ExportFormat::Json, payload),
        "export:csv" => export_text(lib, channel, ExportFormat::Csv, payload),
        other => Err(RpcError::UnknownChannel(other.to_string())),
    }
}
