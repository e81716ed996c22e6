use chrono::Local;
use clap::{Parser, Subcommand};
use mousedrill::{
    config::{Config, ConfigStore, FileConfigStore, Script},
    progress::{ProgressStore, SqliteProgressStore},
    runtime::Envelope,
    session::{Feedback, Interaction},
    task::TaskCatalog,
    trainer::Trainer,
};
use serde::Deserialize;
use std::{
    error::Error,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};
use time_humanize::{Accuracy, HumanTime, Tense};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const MAX_DIFFICULTY: u8 = 5;

/// pointer skills drills with graded attempts and star ratings
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Pointer skills drills (hover, click, double-click, drag and trace) graded into scores and star ratings, with best results kept per drill."
)]
pub struct Cli {
    /// task file to load instead of the built-in drills
    #[clap(short = 't', long = "tasks", global = true)]
    task_file: Option<PathBuf>,

    /// progress database location
    #[clap(long = "db", global = true)]
    database_path: Option<PathBuf>,

    /// script used for drill titles
    #[clap(short = 's', long, value_enum, global = true)]
    script: Option<Script>,

    /// remember the given options as defaults
    #[clap(long, global = true)]
    save_config: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// list drills with their best star rating
    List,

    /// play a recorded interaction script against a drill
    Replay {
        task_id: String,
        /// JSON lines, one interaction per line stamped with `at` (ms)
        events: PathBuf,
    },

    /// show the best result of every drill
    Progress,

    /// write every recorded attempt to a CSV file
    Export { output: PathBuf },
}

impl Cli {
    fn merge_into(&self, mut cfg: Config) -> Config {
        if let Some(script) = self.script {
            cfg.script = script;
        }
        if let Some(path) = &self.task_file {
            cfg.task_file = Some(path.clone());
        }
        if let Some(path) = &self.database_path {
            cfg.database_path = Some(path.clone());
        }
        cfg
    }
}

#[derive(Debug, Deserialize)]
struct ScriptedEvent {
    at: u64,
    #[serde(flatten)]
    interaction: Interaction,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config_store = FileConfigStore::new();
    let cfg = cli.merge_into(config_store.load());
    if cli.save_config {
        config_store.save(&cfg)?;
        debug!(path = %config_store.path().display(), "saved config");
    }

    let catalog = TaskCatalog::load_or_fallback(cfg.task_file.as_deref())?;
    let store = match &cfg.database_path {
        Some(path) => SqliteProgressStore::open(path)?,
        None => SqliteProgressStore::open_default()?,
    };
    let mut trainer = Trainer::new(catalog, store);

    match &cli.command {
        Command::List => list(&trainer, cfg.script)?,
        Command::Replay { task_id, events } => replay(&mut trainer, task_id, events)?,
        Command::Progress => progress(trainer.store())?,
        Command::Export { output } => {
            let written = trainer.store().export_csv(File::create(output)?)?;
            println!("exported {written} attempts to {}", output.display());
        }
    }

    Ok(())
}

fn stars(filled: u8, total: u8) -> String {
    (0..total)
        .map(|i| if i < filled { '★' } else { '☆' })
        .collect()
}

fn list<S: ProgressStore>(trainer: &Trainer<S>, script: Script) -> Result<(), Box<dyn Error>> {
    for task in trainer.tasks() {
        let best = trainer
            .best(&task.id)?
            .map(|o| stars(o.star_rating, 5))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<13} {} {:>3}s  {}  best {}",
            task.id,
            task.tag().to_string(),
            stars(task.difficulty, MAX_DIFFICULTY),
            task.time_limit_secs,
            task.title.get(script),
            best
        );
    }
    Ok(())
}

fn print_feedback(at_ms: u64, feedback: &[Feedback]) {
    for fb in feedback {
        println!("{:>7}ms  {fb}", at_ms);
    }
}

/// Runs `events` against a fresh session started at t=0. A session still
/// active once the script runs out is ticked at its deadline.
fn replay<S: ProgressStore>(
    trainer: &mut Trainer<S>,
    task_id: &str,
    events: &Path,
) -> Result<(), Box<dyn Error>> {
    let reader = BufReader::new(File::open(events)?);
    let (session, feedback) = trainer.start(task_id, 0)?;
    print_feedback(0, &feedback);

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ScriptedEvent = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {e}", events.display(), n + 1))?;

        print_feedback(event.at, &trainer.tick(event.at));
        let feedback = trainer.dispatch(&Envelope {
            session,
            at_ms: event.at,
            interaction: event.interaction,
        });
        print_feedback(event.at, &feedback);

        if trainer.active_session_id().is_none() {
            break;
        }
    }

    if let Some(deadline) = trainer
        .session()
        .filter(|s| s.is_active())
        .map(|s| s.deadline_ms())
    {
        print_feedback(deadline, &trainer.tick(deadline));
    }
    Ok(())
}

fn progress<S: ProgressStore>(store: &S) -> Result<(), Box<dyn Error>> {
    let best = store.all_best()?;
    if best.is_empty() {
        println!("no results yet");
        return Ok(());
    }
    let now = Local::now();
    for outcome in best {
        let ago = (now - outcome.completed_at).to_std().unwrap_or_default();
        println!(
            "{:<16} {} {:>3} points  {:>5.1}s  {} errors  {}",
            outcome.task_id,
            stars(outcome.star_rating, 5),
            outcome.final_score,
            outcome.elapsed_secs,
            outcome.error_count,
            HumanTime::from(ago).to_text_en(Accuracy::Rough, Tense::Past)
        );
    }
    Ok(())
}
