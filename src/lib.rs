// Library surface for the CLI and integration tests.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod geometry;
pub mod progress;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod task;
pub mod trainer;

pub use error::{ProgressError, TaskSourceError, TrainerError, ValidationError};
pub use scoring::Outcome;
pub use session::{Feedback, Interaction, Session, SessionId};
pub use task::{Task, TaskCatalog};
pub use trainer::Trainer;
