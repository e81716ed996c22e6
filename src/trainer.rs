//! Owns the task list, the single live session and progress recording.

use crate::error::TrainerError;
use crate::progress::ProgressStore;
use crate::runtime::{DrillEvent, Envelope};
use crate::scoring::Outcome;
use crate::session::{Feedback, Session, SessionId};
use crate::task::{Task, TaskCatalog};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Trainer<S: ProgressStore> {
    tasks: Vec<Arc<Task>>,
    store: S,
    active: Option<Session>,
    next_session: u64,
}

impl<S: ProgressStore> Trainer<S> {
    pub fn new(catalog: TaskCatalog, store: S) -> Self {
        Self {
            tasks: catalog.into_tasks().into_iter().map(Arc::new).collect(),
            store,
            active: None,
            next_session: 1,
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().map(|t| t.as_ref())
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    /// Id of the session still accepting input, if any.
    pub fn active_session_id(&self) -> Option<SessionId> {
        self.active.as_ref().filter(|s| s.is_active()).map(Session::id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn best(&self, task_id: &str) -> Result<Option<Outcome>, TrainerError> {
        Ok(self.store.get_best(task_id)?)
    }

    /// Begin a fresh attempt at `task_id`, superseding any previous session.
    pub fn start(
        &mut self,
        task_id: &str,
        now_ms: u64,
    ) -> Result<(SessionId, Vec<Feedback>), TrainerError> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or_else(|| TrainerError::UnknownTask(task_id.to_string()))?;

        if let Some(previous) = self.active_session_id() {
            debug!(session = %previous, "session superseded");
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let session = Session::new(id, task, now_ms);
        let feedback = session.hint().map(Feedback::HintChanged).into_iter().collect();
        self.active = Some(session);
        Ok((id, feedback))
    }

    /// Start the current task over.
    pub fn retry(&mut self, now_ms: u64) -> Result<(SessionId, Vec<Feedback>), TrainerError> {
        let task_id = self
            .active
            .as_ref()
            .map(|s| s.task().id.clone())
            .ok_or(TrainerError::NoSession)?;
        self.start(&task_id, now_ms)
    }

    /// Leave the current task without grading it.
    pub fn abandon(&mut self) {
        if let Some(session) = self.active.take() {
            info!(session = %session.id(), "session abandoned");
        }
    }

    pub fn dispatch(&mut self, envelope: &Envelope) -> Vec<Feedback> {
        let Some(session) = self.active.as_mut().filter(|s| s.id() == envelope.session) else {
            debug!(session = %envelope.session, "discarding event for stale session");
            return Vec::new();
        };
        let feedback = session.handle(&envelope.interaction, envelope.at_ms);
        self.record(&feedback);
        feedback
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<Feedback> {
        let Some(session) = self.active.as_mut() else {
            return Vec::new();
        };
        let feedback = session.tick(now_ms);
        self.record(&feedback);
        feedback
    }

    pub fn handle_event(&mut self, event: DrillEvent, now_ms: u64) -> Vec<Feedback> {
        match event {
            DrillEvent::Input(envelope) => self.dispatch(&envelope),
            DrillEvent::Tick => self.tick(now_ms),
        }
    }

    fn record(&mut self, feedback: &[Feedback]) {
        for fb in feedback {
            if let Feedback::TaskCompleted(outcome) = fb {
                match self.store.record_if_better(outcome) {
                    Ok(true) => info!(task = %outcome.task_id, stars = outcome.star_rating, "new best"),
                    Ok(false) => {}
                    Err(e) => warn!(task = %outcome.task_id, error = %e, "failed to record progress"),
                }
            }
        }
    }
}
