//! Per-attempt state machine.
//!
//! A [`Session`] is fed one [`Interaction`] or tick at a time, each stamped
//! with a millisecond timestamp, and answers with [`Feedback`] for the
//! presentation layer. Time is always supplied by the caller so the session
//! is deterministic under test.

use crate::geometry::{mean, shape_match_rate, Point};
use crate::scoring::{grade, Outcome};
use crate::task::{Task, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Trace gestures at or above this match rate complete the task.
pub const TRACE_PASS_RATE: f64 = 60.0;

/// Identity of one attempt, used to discard events aimed at a superseded
/// or finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pointer interaction delivered by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Interaction {
    PointerEnter { target: u32 },
    PointerLeave { target: u32 },
    Click { target: u32 },
    DragStart { x: f64, y: f64 },
    DragMove { x: f64, y: f64 },
    DragEnd { x: f64, y: f64 },
    Drop { item: String, zone: String, overlap: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    /// Interacted with a target other than the next one.
    WrongOrder { expected: u32, got: u32 },
    /// Drop missed its zone; the item goes back to its start position.
    MissedDropZone { item: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    NextTarget(u32),
    Remaining(usize),
    FollowPath,
    TraceShape,
}

/// Signals emitted for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    StepSucceeded { score: f64 },
    StepFailed(FailReason),
    /// First click of a double-click landed; waiting for the second.
    NeedSecondClick { target: u32 },
    /// Continuous gesture rejected; `match_rate` is set for traces.
    GestureNeedsRetry { match_rate: Option<f64> },
    TaskCompleted(Outcome),
    HintChanged(Hint),
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::StepSucceeded { score } => write!(f, "step succeeded (score {score:.0})"),
            Feedback::StepFailed(FailReason::WrongOrder { expected, got }) => {
                write!(f, "wrong order: expected {expected}, got {got}")
            }
            Feedback::StepFailed(FailReason::MissedDropZone { item }) => {
                write!(f, "missed drop zone: {item} returned to start")
            }
            Feedback::NeedSecondClick { target } => write!(f, "click {target} once more"),
            Feedback::GestureNeedsRetry {
                match_rate: Some(rate),
            } => write!(f, "{rate:.0}% match, try again"),
            Feedback::GestureNeedsRetry { match_rate: None } => write!(f, "try again"),
            Feedback::TaskCompleted(outcome) => write!(
                f,
                "completed: {} points, {} stars, {:.1}s, {} errors",
                outcome.final_score, outcome.star_rating, outcome.elapsed_secs, outcome.error_count
            ),
            Feedback::HintChanged(Hint::NextTarget(id)) => write!(f, "next: {id}"),
            Feedback::HintChanged(Hint::Remaining(n)) => write!(f, "{n} left"),
            Feedback::HintChanged(Hint::FollowPath) => write!(f, "follow the line"),
            Feedback::HintChanged(Hint::TraceShape) => write!(f, "trace the shape"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Active,
    Completed(Outcome),
}

#[derive(Debug, Clone, Copy)]
struct PendingDwell {
    target: u32,
    since_ms: u64,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    task: Arc<Task>,
    phase: Phase,
    step: usize,
    score: f64,
    error_count: u32,
    started_at_ms: u64,
    // double-click bookkeeping
    last_click_at_ms: u64,
    pending_click_count: u8,
    pending_dwell: Option<PendingDwell>,
    // continuous gestures
    gesture_active: bool,
    sampled_deviations: Vec<f64>,
    sampled_points: Vec<Point>,
    placed_items: HashSet<String>,
}

impl Session {
    pub fn new(id: SessionId, task: Arc<Task>, started_at_ms: u64) -> Self {
        info!(session = %id, task = %task.id, kind = %task.tag(), "session started");
        Self {
            id,
            task,
            phase: Phase::Active,
            step: 0,
            score: 0.0,
            error_count: 0,
            started_at_ms,
            last_click_at_ms: 0,
            pending_click_count: 0,
            pending_dwell: None,
            gesture_active: false,
            sampled_deviations: Vec::new(),
            sampled_points: Vec::new(),
            placed_items: HashSet::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.phase {
            Phase::Completed(outcome) => Some(outcome),
            Phase::Active => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn deadline_ms(&self) -> u64 {
        self.started_at_ms + self.task.time_limit_ms()
    }

    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        self.deadline_ms().saturating_sub(now_ms) / 1000
    }

    /// Earliest instant at which a tick would change state.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        if !self.is_active() {
            return None;
        }
        let dwell = self.dwell_deadline_ms();
        Some(dwell.map_or(self.deadline_ms(), |d| d.min(self.deadline_ms())))
    }

    /// Hint for the current state, shown when the session starts.
    pub fn hint(&self) -> Option<Hint> {
        match &self.task.kind {
            TaskKind::Hover { targets, .. }
            | TaskKind::Click { targets }
            | TaskKind::DoubleClick { targets, .. } => {
                targets.get(self.step).map(|t| Hint::NextTarget(t.id))
            }
            TaskKind::DragDiscrete { items } => {
                Some(Hint::Remaining(items.len() - self.placed_items.len()))
            }
            TaskKind::DragCurve { .. } => Some(Hint::FollowPath),
            TaskKind::Trace { .. } => Some(Hint::TraceShape),
        }
    }

    /// Periodic timer signal: resolves a finished dwell and forces
    /// completion once the time limit has passed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Feedback> {
        let mut out = Vec::new();
        if !self.is_active() {
            return out;
        }
        self.resolve_dwell(now_ms, &mut out);
        self.check_timeout(now_ms, &mut out);
        out
    }

    pub fn handle(&mut self, interaction: &Interaction, now_ms: u64) -> Vec<Feedback> {
        let mut out = self.tick(now_ms);
        if !self.is_active() {
            return out;
        }

        let task = Arc::clone(&self.task);
        match &task.kind {
            TaskKind::Click { .. } => {
                if let Interaction::Click { target } = interaction {
                    self.on_click(*target, now_ms, &mut out);
                }
            }
            TaskKind::Hover { .. } => self.on_hover(interaction, now_ms),
            TaskKind::DoubleClick { .. } => {
                if let Interaction::Click { target } = interaction {
                    self.on_double_click(*target, now_ms, &mut out);
                }
            }
            TaskKind::DragDiscrete { .. } => {
                if let Interaction::Drop {
                    item,
                    zone,
                    overlap,
                } = interaction
                {
                    self.on_drop(item, zone, *overlap, now_ms, &mut out);
                }
            }
            TaskKind::DragCurve { .. } => self.on_curve_drag(interaction, now_ms, &mut out),
            TaskKind::Trace { .. } => self.on_trace(interaction, now_ms, &mut out),
        }
        out
    }

    fn expected_target(&self) -> Option<u32> {
        self.task.targets().get(self.step).map(|t| t.id)
    }

    fn dwell_deadline_ms(&self) -> Option<u64> {
        match (&self.task.kind, self.pending_dwell) {
            (TaskKind::Hover {
                hover_duration_ms, ..
            }, Some(dwell)) => Some(dwell.since_ms.saturating_add(*hover_duration_ms)),
            _ => None,
        }
    }

    fn resolve_dwell(&mut self, now_ms: u64, out: &mut Vec<Feedback>) {
        if let Some(deadline) = self.dwell_deadline_ms() {
            // the dwell cannot outlive the session's own deadline
            if deadline <= now_ms && deadline < self.deadline_ms() {
                self.pending_dwell = None;
                self.advance_step(deadline, out);
            }
        }
    }

    fn check_timeout(&mut self, now_ms: u64, out: &mut Vec<Feedback>) {
        if self.is_active() && now_ms >= self.deadline_ms() {
            debug!(session = %self.id, step = self.step, "time limit reached");
            self.finish(self.deadline_ms(), out);
        }
    }

    fn wrong_order(&mut self, expected: u32, got: u32, out: &mut Vec<Feedback>) {
        self.error_count += 1;
        debug!(session = %self.id, expected, got, errors = self.error_count, "wrong order");
        out.push(Feedback::StepFailed(FailReason::WrongOrder { expected, got }));
    }

    fn advance_step(&mut self, now_ms: u64, out: &mut Vec<Feedback>) {
        self.step += 1;
        self.score += 1.0;
        out.push(Feedback::StepSucceeded { score: self.score });

        match self.expected_target() {
            Some(next) => out.push(Feedback::HintChanged(Hint::NextTarget(next))),
            None => self.finish(now_ms, out),
        }
    }

    fn on_click(&mut self, target: u32, now_ms: u64, out: &mut Vec<Feedback>) {
        let Some(expected) = self.expected_target() else {
            return;
        };
        if target == expected {
            self.advance_step(now_ms, out);
        } else {
            self.wrong_order(expected, target, out);
        }
    }

    fn on_hover(&mut self, interaction: &Interaction, now_ms: u64) {
        match interaction {
            Interaction::PointerEnter { target } if Some(*target) == self.expected_target() => {
                self.pending_dwell = Some(PendingDwell {
                    target: *target,
                    since_ms: now_ms,
                });
            }
            Interaction::PointerLeave { target } => {
                if self.pending_dwell.is_some_and(|d| d.target == *target) {
                    debug!(session = %self.id, target_id = *target, "dwell interrupted");
                    self.pending_dwell = None;
                }
            }
            _ => {}
        }
    }

    fn on_double_click(&mut self, target: u32, now_ms: u64, out: &mut Vec<Feedback>) {
        let TaskKind::DoubleClick {
            double_click_interval_ms,
            ..
        } = self.task.kind
        else {
            return;
        };
        let Some(expected) = self.expected_target() else {
            return;
        };

        if target != expected {
            self.pending_click_count = 0;
            self.wrong_order(expected, target, out);
            return;
        }

        let within = now_ms.saturating_sub(self.last_click_at_ms) < double_click_interval_ms;
        if self.pending_click_count == 1 && within {
            self.pending_click_count = 0;
            self.advance_step(now_ms, out);
        } else {
            // first click, or a second one that came too late
            self.pending_click_count = 1;
            self.last_click_at_ms = now_ms;
            out.push(Feedback::NeedSecondClick { target });
        }
    }

    fn on_drop(&mut self, item: &str, zone: &str, overlap: bool, now_ms: u64, out: &mut Vec<Feedback>) {
        let TaskKind::DragDiscrete { items } = &self.task.kind else {
            return;
        };
        let total = items.len();
        if self.placed_items.contains(item) || !items.iter().any(|i| i.id == item) {
            debug!(session = %self.id, item, "ignoring drop");
            return;
        }

        if overlap && zone == item {
            self.placed_items.insert(item.to_string());
            self.score += 1.0;
            out.push(Feedback::StepSucceeded { score: self.score });
            if self.placed_items.len() == total {
                self.finish(now_ms, out);
            } else {
                out.push(Feedback::HintChanged(Hint::Remaining(
                    total - self.placed_items.len(),
                )));
            }
        } else {
            self.error_count += 1;
            out.push(Feedback::StepFailed(FailReason::MissedDropZone {
                item: item.to_string(),
            }));
        }
    }

    fn on_curve_drag(&mut self, interaction: &Interaction, now_ms: u64, out: &mut Vec<Feedback>) {
        let TaskKind::DragCurve {
            path,
            end_threshold,
            ..
        } = &self.task.kind
        else {
            return;
        };

        match *interaction {
            Interaction::DragStart { .. } => {
                self.gesture_active = true;
                self.sampled_deviations.clear();
            }
            Interaction::DragMove { x, y } if self.gesture_active => {
                self.sampled_deviations.push(path.deviation(Point::new(x, y)));
            }
            Interaction::DragEnd { x, y } if self.gesture_active => {
                self.gesture_active = false;
                let release = Point::new(x, y);
                let samples = std::mem::take(&mut self.sampled_deviations);

                let reached_end = path
                    .end()
                    .is_some_and(|end| release.distance(&end) < *end_threshold);
                if reached_end {
                    let average = mean(&samples).unwrap_or_else(|| path.deviation(release));
                    self.score = (100.0 - average / path.width * 100.0).clamp(0.0, 100.0);
                    debug!(session = %self.id, average, score = self.score, "curve finished");
                    self.finish(now_ms, out);
                } else {
                    self.error_count += 1;
                    out.push(Feedback::GestureNeedsRetry { match_rate: None });
                }
            }
            _ => {}
        }
    }

    fn on_trace(&mut self, interaction: &Interaction, now_ms: u64, out: &mut Vec<Feedback>) {
        let TaskKind::Trace { shape, line_width } = &self.task.kind else {
            return;
        };

        match *interaction {
            Interaction::DragStart { x, y } => {
                self.gesture_active = true;
                self.sampled_points.clear();
                self.sampled_points.push(Point::new(x, y));
            }
            Interaction::DragMove { x, y } if self.gesture_active => {
                self.sampled_points.push(Point::new(x, y));
            }
            Interaction::DragEnd { .. } if self.gesture_active => {
                self.gesture_active = false;
                let points = std::mem::take(&mut self.sampled_points);
                let rate = shape_match_rate(&points, shape, *line_width);
                debug!(session = %self.id, rate, samples = points.len(), "trace finished");

                if rate >= TRACE_PASS_RATE {
                    self.score = rate.round();
                    out.push(Feedback::StepSucceeded { score: self.score });
                    self.finish(now_ms, out);
                } else {
                    self.error_count += 1;
                    out.push(Feedback::GestureNeedsRetry {
                        match_rate: Some(rate),
                    });
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self, now_ms: u64, out: &mut Vec<Feedback>) {
        self.pending_dwell = None;
        self.pending_click_count = 0;
        self.gesture_active = false;
        self.sampled_deviations.clear();
        self.sampled_points.clear();

        let elapsed_secs = now_ms.saturating_sub(self.started_at_ms) as f64 / 1000.0;
        let outcome = grade(&self.task, self.score, self.error_count, elapsed_secs);
        info!(
            session = %self.id,
            task = %outcome.task_id,
            score = outcome.final_score,
            stars = outcome.star_rating,
            "session completed"
        );
        self.phase = Phase::Completed(outcome.clone());
        out.push(Feedback::TaskCompleted(outcome));
    }
}
