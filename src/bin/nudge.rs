//! Nudge CLI - Command-line interface for Posture Nudge
//!
//! Commands:
//! - run: Stream motion samples from stdin and emit reminders
//! - settings: Show or update detection settings
//! - exceptions: Manage apps exempt from reminders
//! - history: List or acknowledge reminders
//! - summary: Usage statistics for a period
//! - preview: Send a sample reminder through the notification channel
//! - doctor: Diagnose configuration and stored state

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use posture_nudge::storage::STATE_KEYS;
use posture_nudge::{
    CoachEngine, CoachError, EngineConfig, FileStore, KeyValueStore, LogChannel, Period,
    ReminderKind, SettingsPatch, NUDGE_VERSION, PRODUCER_NAME,
};

/// Nudge - mindful phone use while walking or lying down
#[derive(Parser)]
#[command(name = "nudge")]
#[command(version = NUDGE_VERSION)]
#[command(about = "Detect risky phone-use postures and issue reminders", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding settings, exceptions, history and usage
    #[arg(long, global = true, default_value = ".nudge")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream NDJSON motion samples from stdin, emit reminders as NDJSON
    Run {
        /// Emit every sample outcome, not just reminders
        #[arg(long)]
        all: bool,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Show or update settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },

    /// Manage exception apps
    Exceptions {
        #[command(subcommand)]
        action: Option<ExceptionsAction>,
    },

    /// List or acknowledge reminders
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Usage summary and report for a period
    Summary {
        #[arg(value_enum, default_value = "week")]
        period: PeriodArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deliver a sample reminder without recording it
    Preview {
        #[arg(value_enum)]
        kind: KindArg,
    },

    /// Diagnose configuration and stored state
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,
    /// Apply a partial update
    Set {
        /// SettingsPatch JSON, applied before the flags below
        #[arg(long)]
        patch: Option<String>,

        #[arg(long)]
        walking_detection: Option<bool>,

        #[arg(long)]
        lying_detection: Option<bool>,

        #[arg(long)]
        exercise_mode: Option<bool>,

        #[arg(long)]
        walking_sensitivity: Option<u8>,

        #[arg(long)]
        lying_sensitivity: Option<u8>,

        #[arg(long)]
        bedtime_start: Option<u8>,

        #[arg(long)]
        bedtime_end: Option<u8>,
    },
}

#[derive(Subcommand)]
enum ExceptionsAction {
    /// List exception apps
    List,
    /// Add an exception app
    Add { name: String },
    /// Remove an exception app
    Remove { name: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List reminders, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Acknowledge a reminder by id
    Ack { id: String },
    /// Acknowledge every reminder
    AckAll,
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Week,
    Month,
    Quarter,
    Year,
}

impl From<PeriodArg> for Period {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Week => Period::Week,
            PeriodArg::Month => Period::Month,
            PeriodArg::Quarter => Period::Quarter,
            PeriodArg::Year => Period::Year,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Walking,
    Lying,
}

impl From<KindArg> for ReminderKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Walking => ReminderKind::Walking,
            KindArg::Lying => ReminderKind::Lying,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), NudgeCliError> {
    let config = load_config(cli.config.as_deref())?;
    let state_dir = cli.state_dir;

    match cli.command {
        Commands::Run { all, flush } => with_engine(config, &state_dir, |engine| cmd_run(engine, all, flush)),
        Commands::Settings { action } => with_engine(config, &state_dir, |engine| cmd_settings(engine, action)),
        Commands::Exceptions { action } => {
            with_engine(config, &state_dir, |engine| cmd_exceptions(engine, action))
        }
        Commands::History { action } => with_engine(config, &state_dir, |engine| cmd_history(engine, action)),
        Commands::Summary { period, json } => {
            with_engine(config, &state_dir, |engine| cmd_summary(engine, period.into(), json))
        }
        Commands::Preview { kind } => with_engine(config, &state_dir, |engine| {
            let notification = engine.preview_reminder(kind.into(), Utc::now())?;
            println!("{}", serde_json::to_string(&notification)?);
            Ok(())
        }),
        Commands::Doctor { json } => cmd_doctor(&config, &state_dir, json),
    }
}

/// Load the engine from `state_dir`, run a command, and persist the result.
/// State is saved even when the command fails part way.
fn with_engine<F>(config: EngineConfig, state_dir: &Path, command: F) -> Result<(), NudgeCliError>
where
    F: FnOnce(&mut CoachEngine) -> Result<(), NudgeCliError>,
{
    let store = FileStore::open(state_dir)?;
    let mut engine = CoachEngine::load(config, &store, Box::new(LogChannel))?;
    let result = command(&mut engine);
    let saved = engine.save(&store);
    result?;
    saved?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, NudgeCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn cmd_run(engine: &mut CoachEngine, all: bool, flush: bool) -> Result<(), NudgeCliError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    stream_samples(engine, stdin.lock(), &mut stdout, all, flush)
}

/// Feed NDJSON samples to the engine. Lines that do not parse are logged and
/// counted as dropped samples; the stream carries on.
fn stream_samples<R: BufRead, W: Write>(
    engine: &mut CoachEngine,
    input: R,
    out: &mut W,
    all: bool,
    flush: bool,
) -> Result<(), NudgeCliError> {
    for (number, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let outcome = engine.process_sample_json(trimmed);
        if outcome.timestamp.is_none() {
            log::warn!("line {}: not a motion sample, skipped", number + 1);
        }

        let record = if all {
            Some(serde_json::to_string(&outcome)?)
        } else {
            outcome.reminder.as_ref().map(serde_json::to_string).transpose()?
        };

        if let Some(record) = record {
            writeln!(out, "{}", record)?;
            if flush {
                out.flush()?;
            }
        }
    }

    out.flush()?;
    log::info!("stream finished: {:?}", engine.metrics());
    Ok(())
}

fn cmd_settings(engine: &mut CoachEngine, action: Option<SettingsAction>) -> Result<(), NudgeCliError> {
    let settings = match action.unwrap_or(SettingsAction::Show) {
        SettingsAction::Show => engine.settings(),
        SettingsAction::Set {
            patch,
            walking_detection,
            lying_detection,
            exercise_mode,
            walking_sensitivity,
            lying_sensitivity,
            bedtime_start,
            bedtime_end,
        } => {
            let mut merged: SettingsPatch = match patch {
                Some(json) => serde_json::from_str(&json)?,
                None => SettingsPatch::default(),
            };
            merged.walking_detection_enabled = walking_detection.or(merged.walking_detection_enabled);
            merged.lying_detection_enabled = lying_detection.or(merged.lying_detection_enabled);
            merged.exercise_mode = exercise_mode.or(merged.exercise_mode);
            merged.walking_sensitivity = walking_sensitivity.or(merged.walking_sensitivity);
            merged.lying_sensitivity = lying_sensitivity.or(merged.lying_sensitivity);
            merged.bedtime_start = bedtime_start.or(merged.bedtime_start);
            merged.bedtime_end = bedtime_end.or(merged.bedtime_end);
            engine.update_settings(&merged)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&*settings)?);
    Ok(())
}

fn cmd_exceptions(engine: &mut CoachEngine, action: Option<ExceptionsAction>) -> Result<(), NudgeCliError> {
    match action.unwrap_or(ExceptionsAction::List) {
        ExceptionsAction::List => {}
        ExceptionsAction::Add { name } => engine.add_exception(&name)?,
        ExceptionsAction::Remove { name } => {
            if !engine.remove_exception(&name) {
                log::warn!("{} was not an exception app", name);
            }
        }
    }

    for app in engine.exception_apps() {
        println!("{}", app);
    }
    Ok(())
}

fn cmd_history(engine: &CoachEngine, action: Option<HistoryAction>) -> Result<(), NudgeCliError> {
    match action.unwrap_or(HistoryAction::List { limit: 20, offset: 0 }) {
        HistoryAction::List { limit, offset } => {
            for event in engine.list_history(limit, offset) {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        HistoryAction::Ack { id } => {
            let id = uuid::Uuid::parse_str(&id)
                .map_err(|e| NudgeCliError::InvalidId(format!("Invalid reminder id {}: {}", id, e)))?;
            engine.acknowledge(id)?;
        }
        HistoryAction::AckAll => {
            let count = engine.acknowledge_all();
            println!("{} reminders acknowledged", count);
        }
    }
    Ok(())
}

fn cmd_summary(engine: &CoachEngine, period: Period, json: bool) -> Result<(), NudgeCliError> {
    let report = engine.report(period);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} ({})", period.display_name(), period.as_str());
    for bucket in &report.buckets {
        println!(
            "  {:>4}  walking {:>4}m  lying {:>4}m",
            bucket.label, bucket.walking_minutes, bucket.lying_minutes
        );
    }
    println!();
    println!("{}", report.to_text());
    Ok(())
}

fn cmd_doctor(config: &EngineConfig, state_dir: &Path, json: bool) -> Result<(), NudgeCliError> {
    let mut checks = Vec::new();

    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "window {} / quorum {}, cooldown {}s, utc offset {}m",
            config.classifier.window,
            config.classifier.quorum,
            config.cooldown.seconds,
            config.utc_offset_minutes
        ),
    });

    if config.classifier.quorum > config.classifier.window || config.cooldown.seconds <= 0 {
        checks.push(DoctorCheck {
            name: "config_values".to_string(),
            status: CheckStatus::Warning,
            message: "quorum exceeds window or cooldown is not positive; values will be clamped"
                .to_string(),
        });
    }

    // Check each persisted key
    if state_dir.exists() {
        match FileStore::open(state_dir) {
            Ok(store) => {
                for key in STATE_KEYS {
                    checks.push(check_state_key(&store, key));
                }
            }
            Err(e) => checks.push(DoctorCheck {
                name: "state_dir".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }
    } else {
        checks.push(DoctorCheck {
            name: "state_dir".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist (first run)", state_dir.display()),
        });
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: NUDGE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Nudge Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(NudgeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_state_key(store: &FileStore, key: &str) -> DoctorCheck {
    let (status, message) = match store.get(key) {
        Ok(Some(content)) => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(_) => (CheckStatus::Ok, format!("{} bytes", content.len())),
            Err(e) => (CheckStatus::Error, format!("Invalid JSON: {}", e)),
        },
        Ok(None) => (CheckStatus::Warning, "not saved yet, defaults apply".to_string()),
        Err(e) => (CheckStatus::Error, e.to_string()),
    };
    DoctorCheck {
        name: key.to_string(),
        status,
        message,
    }
}

// Error types

#[derive(Debug)]
enum NudgeCliError {
    Io(io::Error),
    Engine(CoachError),
    Json(serde_json::Error),
    DoctorFailed,
    InvalidId(String),
}

impl From<io::Error> for NudgeCliError {
    fn from(e: io::Error) -> Self {
        NudgeCliError::Io(e)
    }
}

impl From<CoachError> for NudgeCliError {
    fn from(e: CoachError) -> Self {
        NudgeCliError::Engine(e)
    }
}

impl From<serde_json::Error> for NudgeCliError {
    fn from(e: serde_json::Error) -> Self {
        NudgeCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<NudgeCliError> for CliError {
    fn from(e: NudgeCliError) -> Self {
        match e {
            NudgeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            NudgeCliError::Engine(e) => {
                let (code, hint) = match &e {
                    CoachError::InvalidSetting(_) => (
                        "INVALID_SETTING",
                        "Sensitivity is 10-100 in steps of 10; hours are 0-23",
                    ),
                    CoachError::DuplicateException(_) => {
                        ("DUPLICATE_EXCEPTION", "Run 'nudge exceptions list' to see registered apps")
                    }
                    CoachError::NotFound(_) => ("NOT_FOUND", "Run 'nudge history list' for reminder ids"),
                    CoachError::StorageError(_) => ("STORAGE_ERROR", "Run 'nudge doctor' to inspect state"),
                    _ => ("ENGINE_ERROR", "Run 'nudge doctor' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            NudgeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            NudgeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            NudgeCliError::InvalidId(msg) => CliError {
                code: "INVALID_ID".to_string(),
                message: msg,
                hint: Some("Run 'nudge history list' for reminder ids".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
