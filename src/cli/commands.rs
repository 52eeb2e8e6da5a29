use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pb", about = concat!("planbook v", env!("CARGO_PKG_VERSION"), " - markdown plans with frontmatter"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a different plans directory
    #[arg(short = 'C', long = "plans-dir", global = true)]
    pub plans_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List plans, most recently modified first
    List(ListArgs),
    /// Show a plan
    Show(ShowArgs),
    /// Create a plan from a file or stdin
    Create(CreateArgs),
    /// Replace a plan's content from a file or stdin
    Update(UpdateArgs),
    /// Archive a plan (or delete it for good with --permanent)
    Delete(DeleteArgs),
    /// Rename a plan
    Rename(RenameArgs),
    /// Change a plan's status, or list the allowed transitions
    Status(StatusArgs),
    /// Set one frontmatter field
    Set(SetArgs),
    /// Manage a plan's subtasks
    Subtask(SubtaskCmd),
    /// Apply one operation to many plans
    Bulk(BulkCmd),
    /// Search plans (supports status:, tag:, due<, "phrases")
    Search(SearchArgs),
    /// Show the dependency graph, or one plan's dependencies
    Deps(DepsArgs),
    /// Archived plans
    Archive(ArchiveCmd),
    /// Due-date and stale-blocker notifications
    Notifications(NotificationsCmd),
    /// Saved views
    Views(ViewsCmd),
    /// Show or change application settings
    Settings(SettingsCmd),
    /// Validate plan frontmatter and links
    Check,
    /// Rewrite legacy frontmatter in place
    Migrate,
    /// View or manage the recovery log
    Recovery(RecoveryCmd),
    /// Export plans as JSON, CSV or a tarball
    Export(ExportArgs),
    /// Import markdown files as new plans
    Import(ImportArgs),
    /// Create, list or restore backups
    Backup(BackupCmd),
    /// Show or edit planbook.toml
    Config(ConfigCmd),
    /// Invoke an RPC channel with a JSON payload
    Rpc(RpcArgs),
    /// Run the HTTP server
    Serve(ServeArgs),
}

// ---------------------------------------------------------------------------
// Plan commands
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Filter by status (todo, in_progress, review, completed)
    #[arg(long)]
    pub status: Option<String>,
    /// Filter by tag
    #[arg(long)]
    pub tag: Option<String>,
    /// Apply a saved view
    #[arg(long)]
    pub view: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub filename: String,
    /// Print only the markdown body
    #[arg(long)]
    pub body: bool,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Filename to create (default: a generated name)
    #[arg(long)]
    pub name: Option<String>,
    /// Read content from this file instead of stdin
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub filename: String,
    /// Read content from this file instead of stdin
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub filename: String,
    /// Delete for good instead of archiving
    #[arg(long)]
    pub permanent: bool,
}

#[derive(Args)]
pub struct RenameArgs {
    pub filename: String,
    pub new_filename: String,
}

#[derive(Args)]
pub struct StatusArgs {
    pub filename: String,
    /// New status; omit to list allowed transitions
    pub status: Option<String>,
}

#[derive(Args)]
pub struct SetArgs {
    pub filename: String,
    /// Frontmatter field (camelCase, e.g. dueDate)
    pub field: String,
    /// Value; JSON is accepted for lists (e.g. '["a","b"]'), `null` clears
    pub value: String,
}

// ---------------------------------------------------------------------------
// Subtasks
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SubtaskCmd {
    pub filename: String,
    #[command(subcommand)]
    pub action: Option<SubtaskCliAction>,
}

#[derive(Subcommand)]
pub enum SubtaskCliAction {
    /// List subtasks (default)
    List,
    /// Add a subtask
    Add(SubtaskAddArgs),
    /// Toggle a subtask between todo and done
    Toggle(SubtaskIdArg),
    /// Change a subtask's fields
    Update(SubtaskUpdateArgs),
    /// Remove a subtask
    Delete(SubtaskIdArg),
}

#[derive(Args)]
pub struct SubtaskAddArgs {
    pub title: String,
    #[arg(long)]
    pub assignee: Option<String>,
    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args)]
pub struct SubtaskIdArg {
    pub id: String,
}

#[derive(Args)]
pub struct SubtaskUpdateArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    /// todo or done
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub due: Option<String>,
}

// ---------------------------------------------------------------------------
// Bulk
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct BulkCmd {
    #[command(subcommand)]
    pub action: BulkAction,
}

#[derive(Subcommand)]
pub enum BulkAction {
    /// Archive (or permanently delete) several plans
    Delete(BulkDeleteArgs),
    /// Set the same status on several plans
    Status(BulkStatusArgs),
}

#[derive(Args)]
pub struct BulkDeleteArgs {
    #[arg(required = true)]
    pub filenames: Vec<String>,
    #[arg(long)]
    pub permanent: bool,
}

#[derive(Args)]
pub struct BulkStatusArgs {
    pub status: String,
    #[arg(required = true)]
    pub filenames: Vec<String>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SearchArgs {
    /// Query words and filters
    #[arg(required = true)]
    pub query: Vec<String>,
    /// Maximum number of results (default: 50)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct DepsArgs {
    /// Plan to show; omit for the whole graph
    pub filename: Option<String>,
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ArchiveCmd {
    #[command(subcommand)]
    pub action: Option<ArchiveAction>,
}

#[derive(Subcommand)]
pub enum ArchiveAction {
    /// List archived plans (default)
    List,
    /// Move an archived plan back
    Restore(ArchiveFileArg),
    /// Delete an archived plan for good
    Delete(ArchiveFileArg),
    /// Delete archived plans past their retention period
    Cleanup,
}

#[derive(Args)]
pub struct ArchiveFileArg {
    pub filename: String,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct NotificationsCmd {
    #[command(subcommand)]
    pub action: Option<NotificationsAction>,
}

#[derive(Subcommand)]
pub enum NotificationsAction {
    /// List notifications (default)
    List,
    /// Mark one notification as read
    Read(NotificationIdArg),
    /// Mark every current notification as read
    ReadAll,
}

#[derive(Args)]
pub struct NotificationIdArg {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ViewsCmd {
    #[command(subcommand)]
    pub action: Option<ViewsAction>,
}

#[derive(Subcommand)]
pub enum ViewsAction {
    /// List views (default)
    List,
    /// Show one view
    Show(ViewIdArg),
    /// Save a new view
    Create(ViewCreateArgs),
    /// Delete a custom view
    Delete(ViewIdArg),
}

#[derive(Args)]
pub struct ViewIdArg {
    pub id: String,
}

#[derive(Args)]
pub struct ViewCreateArgs {
    pub name: String,
    /// Free-text query
    #[arg(long, default_value = "")]
    pub query: String,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    /// Tag filter (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub assignee: Option<String>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SettingsCmd {
    #[command(subcommand)]
    pub action: Option<SettingsAction>,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print current settings (default)
    Show,
    /// Change settings
    Set(SettingsSetArgs),
}

#[derive(Args)]
pub struct SettingsSetArgs {
    /// Turn frontmatter handling on or off
    #[arg(long)]
    pub frontmatter: Option<bool>,
    /// Plan directory (repeatable; replaces the current list)
    #[arg(long = "dir")]
    pub dirs: Vec<String>,
    /// Shortcut override as ACTION=CHORD (repeatable)
    #[arg(long = "shortcut")]
    pub shortcuts: Vec<String>,
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Show entries after this timestamp (ISO-8601)
    #[arg(long)]
    pub since: Option<String>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
    /// Print the absolute path to the recovery log
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long)]
    pub all: bool,
}

// ---------------------------------------------------------------------------
// Import, export and backups
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ExportArgs {
    /// json, csv or tar (gzipped)
    #[arg(long, default_value = "json")]
    pub format: String,
    /// Only plans with this status
    #[arg(long)]
    pub status: Option<String>,
    /// Only plans carrying this tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Include archived plans
    #[arg(long)]
    pub include_archived: bool,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Markdown files; each keeps its file name
    #[arg(required = true)]
    pub files: Vec<String>,
}

#[derive(Args)]
pub struct BackupCmd {
    #[command(subcommand)]
    pub action: Option<BackupAction>,
}

#[derive(Subcommand)]
pub enum BackupAction {
    /// List backups, newest first (default)
    List,
    /// Back up every plan
    Create,
    /// Import the plans of a backup that no longer exist
    Restore(BackupIdArg),
}

#[derive(Args)]
pub struct BackupIdArg {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Config, RPC and server
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration (default)
    Show,
    /// Print the config file path
    Path,
    /// Set a key in planbook.toml
    Set(ConfigSetArgs),
}

#[derive(Args)]
pub struct ConfigSetArgs {
    /// Key, e.g. server.port or archive_retention_days
    pub key: String,
    pub value: String,
}

#[derive(Args)]
pub struct RpcArgs {
    /// Channel name, e.g. plans:list
    pub channel: String,
    /// JSON payload (default: null)
    pub payload: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(long)]
    pub port: Option<u16>,
    /// Host to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,
}
