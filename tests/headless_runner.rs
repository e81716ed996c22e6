use std::sync::mpsc;
use std::time::Duration;

use mousedrill::progress::{MemoryProgressStore, ProgressStore};
use mousedrill::runtime::{
    ChannelEventSource, Clock, DrillEvent, Envelope, FixedTicker, MonotonicClock, Runner,
};
use mousedrill::{Feedback, Interaction, TaskCatalog, Trainer};

const DRILLS: &str = r#"[
    {
        "taskId": "dwell",
        "type": "hover",
        "difficulty": 1,
        "targets": [{ "id": 1, "x": 100, "y": 100, "radius": 40 }],
        "hoverDuration": 150,
        "timeLimit": 5
    },
    {
        "taskId": "quick",
        "type": "click",
        "targets": [{ "id": 1, "x": 100, "y": 100, "radius": 40 }],
        "timeLimit": 1
    }
]"#;

fn trainer() -> Trainer<MemoryProgressStore> {
    Trainer::new(
        TaskCatalog::from_json(DRILLS).unwrap(),
        MemoryProgressStore::new(),
    )
}

fn completed(feedback: &[Feedback]) -> Vec<&mousedrill::Outcome> {
    feedback
        .iter()
        .filter_map(|fb| match fb {
            Feedback::TaskCompleted(o) => Some(o),
            _ => None,
        })
        .collect()
}

// Dwell completion arrives through a tick, without any further input.
#[test]
fn headless_dwell_resolves_on_tick() {
    let clock = MonotonicClock::new();
    let mut trainer = trainer();
    let (session, _) = trainer.start("dwell", clock.now_ms()).unwrap();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(10)),
    );

    tx.send(DrillEvent::Input(Envelope {
        session,
        at_ms: clock.now_ms(),
        interaction: Interaction::PointerEnter { target: 1 },
    }))
    .unwrap();

    let feedback = runner.drive(&mut trainer, &clock, 1_000);

    let outcomes = completed(&feedback);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].error_count, 0);
    assert!(outcomes[0].star_rating >= 4);
    assert!(trainer.active_session_id().is_none());
    assert!(trainer.store().get_best("dwell").unwrap().is_some());
}

#[test]
fn headless_session_times_out() {
    let clock = MonotonicClock::new();
    let mut trainer = trainer();
    trainer.start("quick", clock.now_ms()).unwrap();

    let (_tx, rx) = mpsc::channel();
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(20)),
    );

    let feedback = runner.drive(&mut trainer, &clock, 1_000);

    let outcomes = completed(&feedback);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].final_score, 0);
    assert_eq!(outcomes[0].star_rating, 1);
    assert_eq!(outcomes[0].elapsed_secs, 1.0);
}

// Input for a session that was replaced never reaches the new one.
#[test]
fn headless_stale_input_is_ignored() {
    let clock = MonotonicClock::new();
    let mut trainer = trainer();
    let (stale, _) = trainer.start("quick", clock.now_ms()).unwrap();
    let (fresh, _) = trainer.start("quick", clock.now_ms()).unwrap();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(10)),
    );
    for session in [stale, fresh] {
        tx.send(DrillEvent::Input(Envelope {
            session,
            at_ms: clock.now_ms(),
            interaction: Interaction::Click { target: 1 },
        }))
        .unwrap();
    }

    let feedback = runner.drive(&mut trainer, &clock, 1_000);

    let outcomes = completed(&feedback);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].error_count, 0);
    assert!(outcomes[0].final_score > 50);
}

// With the producer gone the runner still waits for the clock instead of
// burning its step budget.
#[test]
fn headless_disconnected_source_waits_for_deadline() {
    let clock = MonotonicClock::new();
    let mut trainer = trainer();
    trainer.start("quick", clock.now_ms()).unwrap();

    let (tx, rx) = mpsc::channel();
    drop(tx);
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(10)),
    );

    let feedback = runner.drive(&mut trainer, &clock, 3);

    let outcomes = completed(&feedback);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].star_rating, 1);
    assert!(clock.now_ms() >= 1_000);
}
