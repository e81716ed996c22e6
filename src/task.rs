use crate::config::Script;
use crate::error::{TaskSourceError, ValidationError};
use crate::geometry::{distance_to_polyline, Point, Shape};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

static TASKS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/tasks");

/// Minimal hover/click/double-click set used when no other source works.
pub const FALLBACK_FILE: &str = "fallback.json";
/// Drag, curve and trace drills shipped alongside the fallback set.
pub const EXTENDED_FILE: &str = "extended.json";

pub const DEFAULT_HOVER_DURATION_MS: u64 = 500;
pub const DEFAULT_DOUBLE_CLICK_INTERVAL_MS: u64 = 500;
pub const DEFAULT_END_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub hiragana: String,
    pub kanji: String,
}

impl Title {
    pub fn same(text: &str) -> Self {
        Self {
            hiragana: text.to_string(),
            kanji: text.to_string(),
        }
    }

    pub fn get(&self, script: Script) -> &str {
        match script {
            Script::Hiragana => &self.hiragana,
            Script::Kanji => &self.kanji,
        }
    }
}

/// Item identifiers show up as both numbers and strings in stage files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{n}"),
            RawId::Text(s) => f.write_str(s),
        }
    }
}

/// Task as it appears in a stage file, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[serde(rename = "taskId", alias = "id")]
    pub id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub difficulty: Option<u8>,
    pub title: Option<Title>,
    #[serde(alias = "timeLimitSeconds")]
    pub time_limit: Option<i64>,
    #[serde(default)]
    pub targets: Vec<TargetDescriptor>,
    #[serde(alias = "hoverDurationMs")]
    pub hover_duration: Option<u64>,
    #[serde(alias = "doubleClickIntervalMs")]
    pub double_click_interval: Option<i64>,
    #[serde(default)]
    pub items: Vec<ItemDescriptor>,
    pub path: Option<PathDescriptor>,
    pub start_x: Option<f64>,
    pub start_y: Option<f64>,
    pub end_threshold: Option<f64>,
    pub icon: Option<String>,
    pub shape: Option<ShapeDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetDescriptor {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDescriptor {
    pub id: RawId,
    pub icon: Option<String>,
    pub start_x: f64,
    pub start_y: f64,
    pub target_x: f64,
    pub target_y: f64,
    pub target_width: f64,
    pub target_height: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDescriptor {
    #[serde(rename = "type", default)]
    pub curve: Option<String>,
    #[serde(default)]
    pub points: Vec<Point>,
    pub path_width: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeDescriptor {
    #[serde(rename_all = "camelCase")]
    Circle {
        center_x: f64,
        center_y: f64,
        radius: f64,
        line_width: f64,
    },
    #[serde(rename_all = "camelCase")]
    Square {
        x: f64,
        y: f64,
        size: f64,
        line_width: f64,
    },
    #[serde(rename_all = "camelCase")]
    Triangle {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        x3: f64,
        y3: f64,
        line_width: f64,
    },
    #[serde(rename_all = "camelCase")]
    Star {
        center_x: f64,
        center_y: f64,
        points: u32,
        inner_radius: f64,
        outer_radius: f64,
        line_width: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum KindTag {
    Hover,
    Click,
    DoubleClick,
    DragDiscrete,
    DragCurve,
    Trace,
}

impl KindTag {
    /// Accepts both the camelCase names and the legacy stage-file spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hover" => Some(KindTag::Hover),
            "click" => Some(KindTag::Click),
            "doubleClick" | "doubleclick" | "double_click" => Some(KindTag::DoubleClick),
            "dragDiscrete" | "drag_discrete" | "drag_horizontal" | "drag_vertical" => {
                Some(KindTag::DragDiscrete)
            }
            "dragCurve" | "drag_curve" => Some(KindTag::DragCurve),
            "trace" => Some(KindTag::Trace),
            _ => None,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, KindTag::DragCurve | KindTag::Trace)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Display label; visiting order is the position in the sequence.
    pub id: u32,
    pub center: Point,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropZone {
    pub origin: Point,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragItem {
    pub id: String,
    pub icon: Option<String>,
    pub start: Point,
    pub zone: DropZone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurvePath {
    /// Control points; rendered as piecewise cubic segments, matched as a polyline.
    pub points: Vec<Point>,
    pub width: f64,
}

impl CurvePath {
    pub fn end(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn deviation(&self, at: Point) -> f64 {
        distance_to_polyline(at, &self.points)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    Hover {
        targets: Vec<Target>,
        hover_duration_ms: u64,
    },
    Click {
        targets: Vec<Target>,
    },
    DoubleClick {
        targets: Vec<Target>,
        double_click_interval_ms: u64,
    },
    DragDiscrete {
        items: Vec<DragItem>,
    },
    DragCurve {
        path: CurvePath,
        start: Point,
        end_threshold: f64,
        icon: Option<String>,
    },
    Trace {
        shape: Shape,
        line_width: f64,
    },
}

/// Validated, immutable exercise definition.
///
/// Build it with [`load_task`]; the session relies on the checks made there.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub difficulty: u8,
    pub title: Title,
    pub time_limit_secs: u32,
    pub kind: TaskKind,
}

impl Task {
    pub fn tag(&self) -> KindTag {
        match self.kind {
            TaskKind::Hover { .. } => KindTag::Hover,
            TaskKind::Click { .. } => KindTag::Click,
            TaskKind::DoubleClick { .. } => KindTag::DoubleClick,
            TaskKind::DragDiscrete { .. } => KindTag::DragDiscrete,
            TaskKind::DragCurve { .. } => KindTag::DragCurve,
            TaskKind::Trace { .. } => KindTag::Trace,
        }
    }

    pub fn targets(&self) -> &[Target] {
        match &self.kind {
            TaskKind::Hover { targets, .. }
            | TaskKind::Click { targets }
            | TaskKind::DoubleClick { targets, .. } => targets,
            _ => &[],
        }
    }

    /// Number of discrete steps, `None` for continuous-gesture kinds.
    pub fn step_count(&self) -> Option<usize> {
        match &self.kind {
            TaskKind::Hover { targets, .. }
            | TaskKind::Click { targets }
            | TaskKind::DoubleClick { targets, .. } => Some(targets.len()),
            TaskKind::DragDiscrete { items } => Some(items.len()),
            TaskKind::DragCurve { .. } | TaskKind::Trace { .. } => None,
        }
    }

    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_secs) * 1000
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn load_targets(id: &str, raw: Vec<TargetDescriptor>) -> Result<Vec<Target>, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyTargets(id.to_string()));
    }
    raw.into_iter()
        .map(|t| {
            if !positive(t.radius) {
                return Err(ValidationError::NonPositiveRadius {
                    task: id.to_string(),
                    target: t.id,
                    radius: t.radius,
                });
            }
            Ok(Target {
                id: t.id,
                center: Point::new(t.x, t.y),
                radius: t.radius,
            })
        })
        .collect()
}

fn load_items(id: &str, raw: Vec<ItemDescriptor>) -> Result<Vec<DragItem>, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyItems(id.to_string()));
    }
    let mut seen = HashSet::with_capacity(raw.len());
    raw.into_iter()
        .map(|item| {
            let item_id = item.id.to_string();
            if !seen.insert(item_id.clone()) {
                return Err(ValidationError::DuplicateItemId {
                    task: id.to_string(),
                    item: item_id,
                });
            }
            if !positive(item.target_width) || !positive(item.target_height) {
                return Err(ValidationError::EmptyDropZone {
                    task: id.to_string(),
                    item: item_id,
                });
            }
            Ok(DragItem {
                id: item_id,
                icon: item.icon,
                start: Point::new(item.start_x, item.start_y),
                zone: DropZone {
                    origin: Point::new(item.target_x, item.target_y),
                    width: item.target_width,
                    height: item.target_height,
                },
            })
        })
        .collect()
}

fn load_shape(id: &str, raw: ShapeDescriptor) -> Result<(Shape, f64), ValidationError> {
    let invalid = || ValidationError::InvalidShape(id.to_string());
    let (shape, line_width) = match raw {
        ShapeDescriptor::Circle {
            center_x,
            center_y,
            radius,
            line_width,
        } => {
            if !positive(radius) {
                return Err(invalid());
            }
            (
                Shape::Circle {
                    center: Point::new(center_x, center_y),
                    radius,
                },
                line_width,
            )
        }
        ShapeDescriptor::Square {
            x,
            y,
            size,
            line_width,
        } => {
            if !positive(size) {
                return Err(invalid());
            }
            (
                Shape::Square {
                    origin: Point::new(x, y),
                    size,
                },
                line_width,
            )
        }
        ShapeDescriptor::Triangle {
            x1,
            y1,
            x2,
            y2,
            x3,
            y3,
            line_width,
        } => (
            Shape::Triangle {
                vertices: [
                    Point::new(x1, y1),
                    Point::new(x2, y2),
                    Point::new(x3, y3),
                ],
            },
            line_width,
        ),
        ShapeDescriptor::Star {
            center_x,
            center_y,
            points,
            inner_radius,
            outer_radius,
            line_width,
        } => {
            if points < 2 || !positive(inner_radius) || outer_radius < inner_radius {
                return Err(invalid());
            }
            (
                Shape::Star {
                    center: Point::new(center_x, center_y),
                    points,
                    inner_radius,
                    outer_radius,
                },
                line_width,
            )
        }
    };

    if !positive(line_width) {
        return Err(ValidationError::NonPositiveLineWidth(id.to_string()));
    }
    Ok((shape, line_width))
}

/// Validate a descriptor into a [`Task`].
pub fn load_task(raw: TaskDescriptor) -> Result<Task, ValidationError> {
    let id = raw.id;
    let tag = KindTag::parse(&raw.kind).ok_or_else(|| ValidationError::UnknownKind {
        task: id.clone(),
        kind: raw.kind.clone(),
    })?;

    let time_limit = raw
        .time_limit
        .ok_or_else(|| ValidationError::MissingTimeLimit(id.clone()))?;
    let time_limit_secs = u32::try_from(time_limit)
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| ValidationError::NonPositiveTimeLimit {
            task: id.clone(),
            value: time_limit,
        })?;

    let kind = match tag {
        KindTag::Hover => {
            let hover_duration_ms = raw.hover_duration.unwrap_or(DEFAULT_HOVER_DURATION_MS);
            if hover_duration_ms == 0 || hover_duration_ms > u64::from(time_limit_secs) * 1000 {
                return Err(ValidationError::InvalidHoverDuration {
                    task: id,
                    value: hover_duration_ms,
                });
            }
            TaskKind::Hover {
                targets: load_targets(&id, raw.targets)?,
                hover_duration_ms,
            }
        }
        KindTag::Click => TaskKind::Click {
            targets: load_targets(&id, raw.targets)?,
        },
        KindTag::DoubleClick => {
            let interval = raw
                .double_click_interval
                .unwrap_or(DEFAULT_DOUBLE_CLICK_INTERVAL_MS as i64);
            if interval <= 0 {
                return Err(ValidationError::NonPositiveInterval {
                    task: id,
                    value: interval,
                });
            }
            TaskKind::DoubleClick {
                targets: load_targets(&id, raw.targets)?,
                double_click_interval_ms: interval as u64,
            }
        }
        KindTag::DragDiscrete => TaskKind::DragDiscrete {
            items: load_items(&id, raw.items)?,
        },
        KindTag::DragCurve => {
            let path = raw
                .path
                .ok_or_else(|| ValidationError::MissingPath(id.clone()))?;
            if path.points.len() < 2 {
                return Err(ValidationError::TooFewPathPoints {
                    task: id,
                    found: path.points.len(),
                });
            }
            if !positive(path.path_width) {
                return Err(ValidationError::NonPositivePathWidth(id));
            }
            let end_threshold = raw.end_threshold.unwrap_or(DEFAULT_END_THRESHOLD);
            if !positive(end_threshold) {
                return Err(ValidationError::NonPositiveEndThreshold(id));
            }
            let start = match (raw.start_x, raw.start_y) {
                (Some(x), Some(y)) => Point::new(x, y),
                _ => path.points[0],
            };
            TaskKind::DragCurve {
                path: CurvePath {
                    points: path.points,
                    width: path.path_width,
                },
                start,
                end_threshold,
                icon: raw.icon,
            }
        }
        KindTag::Trace => {
            let shape = raw
                .shape
                .ok_or_else(|| ValidationError::MissingShape(id.clone()))?;
            let (shape, line_width) = load_shape(&id, shape)?;
            TaskKind::Trace { shape, line_width }
        }
    };

    Ok(Task {
        title: raw.title.unwrap_or_else(|| Title::same(&id)),
        difficulty: raw.difficulty.unwrap_or(1).clamp(1, 5),
        time_limit_secs,
        kind,
        id,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskDocument {
    Wrapped { tasks: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Validated in-memory task list.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    tasks: Vec<Task>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Parse a stage document, dropping descriptors that fail validation.
    pub fn from_json(json: &str) -> Result<Self, TaskSourceError> {
        let values = match serde_json::from_str::<TaskDocument>(json)? {
            TaskDocument::Wrapped { tasks } | TaskDocument::Bare(tasks) => tasks,
        };

        let mut tasks = Vec::with_capacity(values.len());
        for value in values {
            let loaded = serde_json::from_value::<TaskDescriptor>(value)
                .map_err(|e| e.to_string())
                .and_then(|raw| load_task(raw).map_err(|e| e.to_string()));
            match loaded {
                Ok(task) => tasks.push(task),
                Err(reason) => warn!(%reason, "skipping task descriptor"),
            }
        }

        if tasks.is_empty() {
            return Err(TaskSourceError::NoValidTasks);
        }
        Ok(Self { tasks })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TaskSourceError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    fn embedded(file_name: &str) -> Result<Self, TaskSourceError> {
        let contents = TASKS_DIR
            .get_file(file_name)
            .and_then(|f| f.contents_utf8())
            .ok_or_else(|| TaskSourceError::MissingBuiltin(file_name.to_string()))?;
        Self::from_json(contents)
    }

    pub fn fallback() -> Result<Self, TaskSourceError> {
        Self::embedded(FALLBACK_FILE)
    }

    /// Every task shipped with the binary.
    pub fn builtin() -> Result<Self, TaskSourceError> {
        let mut catalog = Self::embedded(FALLBACK_FILE)?;
        catalog.tasks.extend(Self::embedded(EXTENDED_FILE)?.tasks);
        Ok(catalog)
    }

    /// Load `path` if given, otherwise the built-in set; any failure to read
    /// the file falls back to the minimal built-in list.
    pub fn load_or_fallback(path: Option<&Path>) -> Result<Self, TaskSourceError> {
        match path {
            None => Self::builtin(),
            Some(p) => match Self::from_file(p) {
                Ok(catalog) => {
                    debug!(path = %p.display(), count = catalog.len(), "loaded tasks");
                    Ok(catalog)
                }
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "using fallback tasks");
                    Self::fallback()
                }
            },
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}
