use thiserror::Error;

/// Reasons a task descriptor is rejected at load time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("task {task}: unknown kind {kind:?}")]
    UnknownKind { task: String, kind: String },

    #[error("task {0}: missing time limit")]
    MissingTimeLimit(String),

    #[error("task {task}: time limit must be positive, got {value}")]
    NonPositiveTimeLimit { task: String, value: i64 },

    #[error("task {0}: no targets")]
    EmptyTargets(String),

    #[error("task {task}: target {target} has non-positive radius {radius}")]
    NonPositiveRadius {
        task: String,
        target: u32,
        radius: f64,
    },

    #[error("task {task}: double-click interval must be positive, got {value}")]
    NonPositiveInterval { task: String, value: i64 },

    #[error("task {0}: no drag items")]
    EmptyItems(String),

    #[error("task {task}: drag item id {item} is used more than once")]
    DuplicateItemId { task: String, item: String },

    #[error("task {task}: hover duration {value}ms must be positive and within the time limit")]
    InvalidHoverDuration { task: String, value: u64 },

    #[error("task {0}: end threshold must be positive")]
    NonPositiveEndThreshold(String),

    #[error("task {task}: drop zone for item {item} has no area")]
    EmptyDropZone { task: String, item: String },

    #[error("task {0}: missing path")]
    MissingPath(String),

    #[error("task {task}: path needs at least 2 points, got {found}")]
    TooFewPathPoints { task: String, found: usize },

    #[error("task {0}: path width must be positive")]
    NonPositivePathWidth(String),

    #[error("task {0}: missing shape")]
    MissingShape(String),

    #[error("task {0}: shape dimensions must be positive")]
    InvalidShape(String),

    #[error("task {0}: line width must be positive")]
    NonPositiveLineWidth(String),
}

/// Failures while obtaining the task list.
#[derive(Debug, Error)]
pub enum TaskSourceError {
    #[error("failed to read tasks: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid task JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("built-in task file not found: {0}")]
    MissingBuiltin(String),

    #[error("no valid tasks in source")]
    NoValidTasks,
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("progress storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress export error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("no session to restart")]
    NoSession,

    #[error(transparent)]
    Progress(#[from] ProgressError),
}
