mod config;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use services::{AppServices, Clock, ServiceError};
use training_core::model::{
    CompletionDraft, CompletionId, ExerciseDraft, IdempotencyKey, SessionDraft, SessionId, UserId,
};
use training_core::time::days_window;

use config::{AppConfig, prepare_sqlite_file};

/// Exit status for failures a retry may fix (`EX_TEMPFAIL`).
const EXIT_RETRYABLE: i32 = 75;
const EXIT_FAILURE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "progression")]
#[command(about = "Workout sessions, completion ledgers, and XP progression")]
struct Cli {
    /// Database location: a path, `sqlite://<path>`, or `sqlite::memory:`
    #[arg(long, env = "PROGRESSION_DB_URL", default_value = "sqlite://progression.sqlite3")]
    db: String,

    /// Log filter directives, e.g. `info` or `services=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    /// Acting user
    #[arg(short, long, env = "PROGRESSION_USER")]
    user: UserId,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a progression account for the user
    Register,
    /// Show the user's XP, level, and lifetime stats
    Account,
    /// Manage session templates
    #[command(subcommand)]
    Session(SessionCommand),
    /// Record a completion of a session
    Complete {
        #[arg(long)]
        session: SessionId,
        #[command(flatten)]
        payload: Payload,
        /// Makes retried submissions safe; reuse the same key for the same attempt
        #[arg(long)]
        idempotency_key: Option<IdempotencyKey>,
    },
    /// Correct a recorded completion
    Correct {
        completion: CompletionId,
        #[command(flatten)]
        payload: Payload,
    },
    /// Remove a recorded completion and its contribution
    Remove { completion: CompletionId },
    /// Show one completion
    Show { completion: CompletionId },
    /// Show the completion history of a session
    Ledger { session: SessionId },
    /// List completions between two dates, both inclusive
    History {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        until: NaiveDate,
    },
    /// Compare the account with a replay of its ledger
    Reconcile {
        /// Overwrite drifted totals with the replayed ones
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Create a session from a name and an optional plan
    Create(SessionFields),
    /// List active sessions
    List,
    Show { session: SessionId },
    Edit {
        session: SessionId,
        #[command(flatten)]
        fields: SessionFields,
    },
    /// Hide a session; its completions keep counting
    Delete { session: SessionId },
    /// Copy a session's plan into a fresh session
    Duplicate { session: SessionId },
}

#[derive(Args, Debug)]
struct SessionFields {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    /// JSON file with an array of planned exercises
    #[arg(long)]
    plan: Option<PathBuf>,
}

impl SessionFields {
    fn into_draft(self) -> anyhow::Result<SessionDraft> {
        let plan = match self.plan {
            Some(path) => {
                let raw = read_input(Some(&path))?;
                serde_json::from_str::<Vec<ExerciseDraft>>(&raw)
                    .with_context(|| format!("invalid plan in {}", path.display()))?
            }
            None => Vec::new(),
        };
        Ok(SessionDraft {
            name: self.name,
            description: self.description,
            plan,
        })
    }
}

#[derive(Args, Debug)]
struct Payload {
    /// JSON completion payload; read from stdin when omitted or `-`
    #[arg(long)]
    file: Option<PathBuf>,
}

impl Payload {
    fn into_draft(self) -> anyhow::Result<CompletionDraft> {
        let raw = read_input(self.file.as_deref())?;
        Ok(CompletionDraft::from_json(&raw)?)
    }
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display())),
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("cannot read payload from stdin")?;
            Ok(raw)
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(services: &AppServices, user: UserId, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register => {
            let account = services.accounts().register(user).await?;
            print(&account.snapshot())
        }
        Command::Account => print(&services.accounts().snapshot(user).await?),
        Command::Session(command) => execute_session(services, user, command).await,
        Command::Complete {
            session,
            payload,
            idempotency_key,
        } => {
            let draft = payload.into_draft()?;
            let outcome = services
                .completions()
                .create(user, session, draft, idempotency_key)
                .await?;
            print(&outcome)
        }
        Command::Correct {
            completion,
            payload,
        } => {
            let draft = payload.into_draft()?;
            print(&services.completions().update(user, completion, draft).await?)
        }
        Command::Remove { completion } => {
            print(&services.completions().delete(user, completion).await?)
        }
        Command::Show { completion } => {
            print(&services.completions().get_completion(user, completion).await?)
        }
        Command::Ledger { session } => {
            let ledger = services.completions().session_ledger(user, session).await?;
            print(&json!({
                "sessionId": ledger.session_id(),
                "completions": ledger.records(),
            }))
        }
        Command::History { from, until } => {
            let (start, end) = days_window(from, until);
            let records = services.completions().calendar(user, start, end).await?;
            print(&records)
        }
        Command::Reconcile { repair: true } => print(&services.accounts().repair(user).await?),
        Command::Reconcile { repair: false } => {
            print(&services.accounts().reconcile(user).await?)
        }
    }
}

async fn execute_session(
    services: &AppServices,
    user: UserId,
    command: SessionCommand,
) -> anyhow::Result<()> {
    let sessions = services.sessions();
    match command {
        SessionCommand::Create(fields) => {
            print(&sessions.create(user, fields.into_draft()?).await?)
        }
        SessionCommand::List => print(&sessions.list_active(user).await?),
        SessionCommand::Show { session } => print(&sessions.get(user, session).await?),
        SessionCommand::Edit { session, fields } => {
            print(&sessions.edit(user, session, fields.into_draft()?).await?)
        }
        SessionCommand::Delete { session } => print(&sessions.delete(user, session).await?),
        SessionCommand::Duplicate { session } => print(&sessions.duplicate(user, session).await?),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::new(&cli.db, cli.log);
    init_tracing(&config.log_filter);

    prepare_sqlite_file(&config.db_url)?;
    debug!(db = %config.db_url, in_memory = config.is_in_memory(), "opening database");
    let services = AppServices::new_sqlite(&config.db_url, Clock::default_clock())
        .await
        .with_context(|| format!("cannot open {}", config.db_url))?;
    info!(user = %cli.user, "command started");

    execute(&services, cli.user, cli.command).await
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ServiceError>() {
        Some(service) if service.is_retryable() => EXIT_RETRYABLE,
        _ => EXIT_FAILURE,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_completion_with_key() {
        let cli = Cli::try_parse_from([
            "progression",
            "--db",
            "sqlite::memory:",
            "--user",
            "3",
            "complete",
            "--session",
            "9",
            "--file",
            "done.json",
            "--idempotency-key",
            "7f9c24e5-2f4b-4b6e-9a51-1d8a4c3e2b10",
        ])
        .unwrap();
        assert_eq!(cli.user, UserId::new(3));
        let Command::Complete {
            session,
            payload,
            idempotency_key,
        } = cli.command
        else {
            panic!("expected complete");
        };
        assert_eq!(session, SessionId::new(9));
        assert_eq!(payload.file, Some(PathBuf::from("done.json")));
        assert!(idempotency_key.is_some());
    }

    #[test]
    fn rejects_bad_ids_and_dates() {
        assert!(Cli::try_parse_from(["progression", "--user", "x", "account"]).is_err());
        assert!(
            Cli::try_parse_from([
                "progression",
                "--user",
                "1",
                "history",
                "--from",
                "2024-13-01",
                "--until",
                "2024-12-31",
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "progression",
                "--user",
                "1",
                "complete",
                "--session",
                "1",
                "--idempotency-key",
                "nope",
            ])
            .is_err()
        );
    }

    #[test]
    fn conflicts_exit_as_retryable() {
        let err = anyhow::Error::new(ServiceError::Conflict(services::Resource::Completion(
            CompletionId::new(1),
        )));
        assert_eq!(exit_code(&err), EXIT_RETRYABLE);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), EXIT_FAILURE);
    }

    #[tokio::test]
    async fn in_memory_services_answer_commands() {
        let services = AppServices::in_memory(Clock::default_clock());
        let user = UserId::new(1);
        execute(&services, user, Command::Register).await.unwrap();
        execute(&services, user, Command::Session(SessionCommand::List))
            .await
            .unwrap();

        let err = execute(&services, user, Command::Register).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::AlreadyRegistered(_))
        ));
        let err = execute(&services, user, Command::Show {
            completion: CompletionId::new(5),
        })
        .await
        .unwrap_err();
        assert_eq!(exit_code(&err), EXIT_FAILURE);
    }
}
