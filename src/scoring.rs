//! Final grading of a finished session.

use crate::task::{KindTag, Task};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const ERROR_PENALTY: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub time: f64,
    pub accuracy: f64,
}

pub const STEP_WEIGHTS: Weights = Weights {
    time: 0.4,
    accuracy: 0.6,
};

pub const GESTURE_WEIGHTS: Weights = Weights {
    time: 0.3,
    accuracy: 0.7,
};

impl Weights {
    pub fn for_kind(tag: KindTag) -> Self {
        if tag.is_continuous() {
            GESTURE_WEIGHTS
        } else {
            STEP_WEIGHTS
        }
    }
}

/// Graded result of a completed or timed-out session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub task_id: String,
    pub final_score: u32,
    pub star_rating: u8,
    pub elapsed_secs: f64,
    pub error_count: u32,
    pub completed_at: DateTime<Local>,
}

pub fn time_score(elapsed_secs: f64, time_limit_secs: u32) -> f64 {
    (100.0 - elapsed_secs / f64::from(time_limit_secs) * 100.0).max(0.0)
}

/// `score` is a step count for discrete kinds and already 0-100 for gestures.
pub fn accuracy_score(task: &Task, score: f64) -> f64 {
    match task.step_count() {
        Some(steps) if steps > 0 => score / steps as f64 * 100.0,
        Some(_) => 0.0,
        None => score,
    }
}

pub fn final_score(time_score: f64, accuracy_score: f64, error_count: u32, weights: Weights) -> u32 {
    let raw = time_score * weights.time + accuracy_score * weights.accuracy
        - f64::from(error_count) * ERROR_PENALTY;
    raw.max(0.0).round() as u32
}

/// Never below one star, even for a fully failed attempt.
pub fn star_rating(final_score: u32) -> u8 {
    match final_score {
        90.. => 5,
        70..=89 => 4,
        50..=69 => 3,
        30..=49 => 2,
        _ => 1,
    }
}

pub fn grade(task: &Task, score: f64, error_count: u32, elapsed_secs: f64) -> Outcome {
    let time = time_score(elapsed_secs, task.time_limit_secs);
    let accuracy = accuracy_score(task, score);
    let final_score = final_score(time, accuracy, error_count, Weights::for_kind(task.tag()));

    Outcome {
        task_id: task.id.clone(),
        final_score,
        star_rating: star_rating(final_score),
        elapsed_secs,
        error_count,
        completed_at: Local::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Shape};
    use crate::task::{Target, TaskKind, Title};

    fn click_task(targets: usize, time_limit_secs: u32) -> Task {
        Task {
            id: "click".into(),
            difficulty: 1,
            title: Title::same("click"),
            time_limit_secs,
            kind: TaskKind::Click {
                targets: (1..=targets as u32)
                    .map(|id| Target {
                        id,
                        center: Point::new(0.0, 0.0),
                        radius: 10.0,
                    })
                    .collect(),
            },
        }
    }

    fn trace_task(time_limit_secs: u32) -> Task {
        Task {
            id: "trace".into(),
            difficulty: 1,
            title: Title::same("trace"),
            time_limit_secs,
            kind: TaskKind::Trace {
                shape: Shape::Circle {
                    center: Point::new(0.0, 0.0),
                    radius: 50.0,
                },
                line_width: 5.0,
            },
        }
    }

    #[test]
    fn test_full_time_used() {
        let outcome = grade(&click_task(5, 40), 5.0, 0, 40.0);
        assert_eq!(time_score(40.0, 40), 0.0);
        assert_eq!(outcome.final_score, 60);
        assert_eq!(outcome.star_rating, 3);
    }

    #[test]
    fn test_instant_with_errors() {
        let outcome = grade(&click_task(5, 40), 5.0, 2, 0.0);
        assert_eq!(outcome.final_score, 80);
        assert_eq!(outcome.star_rating, 4);
        assert_eq!(outcome.error_count, 2);
    }

    #[test]
    fn test_time_score_floors_at_zero() {
        assert_eq!(time_score(90.0, 30), 0.0);
        assert_eq!(time_score(15.0, 30), 50.0);
    }

    #[test]
    fn test_partial_steps_on_timeout() {
        // 2 of 5 steps, time exhausted
        let outcome = grade(&click_task(5, 40), 2.0, 0, 40.0);
        assert_eq!(outcome.final_score, 24);
        assert_eq!(outcome.star_rating, 1);
    }

    #[test]
    fn test_gesture_weights() {
        // 0.3 * 50 + 0.7 * 80 = 71
        let outcome = grade(&trace_task(40), 80.0, 0, 20.0);
        assert_eq!(outcome.final_score, 71);
        assert_eq!(outcome.star_rating, 4);
    }

    #[test]
    fn test_penalty_never_goes_negative() {
        let outcome = grade(&click_task(3, 10), 0.0, 12, 10.0);
        assert_eq!(outcome.final_score, 0);
        assert_eq!(outcome.star_rating, 1);
    }

    #[test]
    fn test_star_thresholds() {
        assert_eq!(star_rating(100), 5);
        assert_eq!(star_rating(90), 5);
        assert_eq!(star_rating(89), 4);
        assert_eq!(star_rating(70), 4);
        assert_eq!(star_rating(69), 3);
        assert_eq!(star_rating(50), 3);
        assert_eq!(star_rating(49), 2);
        assert_eq!(star_rating(30), 2);
        assert_eq!(star_rating(29), 1);
        assert_eq!(star_rating(0), 1);
    }
}
