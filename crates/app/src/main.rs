use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use quest_core::model::{AnswerSheet, CategoryId, Identity, Question, StageNumber, UserId};
use services::{AppServices, AuthEvent, AuthSession, AuthState, Clock, ConfigError, EngineConfig};
use storage::{FileKeyValueStore, KeyValueStore};
use tracing_subscriber::EnvFilter;

mod session;

use session::LocalSessionProvider;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidGuestDir { raw: String },
    InvalidCategory { raw: String },
    InvalidStage { raw: String },
    InvalidUser { raw: String },
    InvalidAnswer { raw: String },
    AnswerCount { expected: usize, got: usize },
    Config(ConfigError),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidGuestDir { raw } => write!(f, "invalid --guest-dir value: {raw}"),
            ArgsError::InvalidCategory { raw } => write!(f, "invalid category id: {raw}"),
            ArgsError::InvalidStage { raw } => write!(f, "invalid stage number: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid user id (expected UUID): {raw}"),
            ArgsError::InvalidAnswer { raw } => {
                write!(f, "invalid answer {raw:?} (expected option index or '-')")
            }
            ArgsError::AnswerCount { expected, got } => {
                write!(f, "stage has {expected} questions but {got} answers were given")
            }
            ArgsError::Config(err) => write!(f, "environment: {err}"),
        }
    }
}

impl std::error::Error for ArgsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArgsError::Config(err) => Some(err),
            _ => None,
        }
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Categories,
    Stages { category: CategoryId },
    Questions { category: CategoryId, stage: StageNumber },
    Submit { category: CategoryId, stage: StageNumber, answers: String },
    Login { user: Option<UserId> },
    Logout,
    WhoAmI,
    Merge,
    History,
}

struct Args {
    config: EngineConfig,
    command: Command,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--db <sqlite_url>] [--guest-dir <dir>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  categories                         List categories");
    eprintln!("  stages <category>                  Stages with unlock state and best score");
    eprintln!("  questions <category> <stage>       Show a stage's questions");
    eprintln!("  submit <category> <stage> <a,b,..> Submit option indices in question order ('-' = unanswered)");
    eprintln!("  login [<user-uuid>]                Sign in (new account when omitted); merges guest progress");
    eprintln!("  logout                             Sign out and continue as guest");
    eprintln!("  whoami                             Show the active identity");
    eprintln!("  merge                              Retry merging leftover guest progress");
    eprintln!("  history                            Quiz history of the signed-in account");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUEST_DB_URL, QUEST_GUEST_DIR, QUEST_STORE_TIMEOUT_MS, RUST_LOG");
}

fn parse_category(raw: Option<String>) -> Result<CategoryId, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArg { name: "category" })?;
    raw.parse()
        .map_err(|_| ArgsError::InvalidCategory { raw: raw.clone() })
}

fn parse_stage(raw: Option<String>) -> Result<StageNumber, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArg { name: "stage" })?;
    match raw.parse::<StageNumber>() {
        Ok(stage) if stage.value() > 0 => Ok(stage),
        _ => Err(ArgsError::InvalidStage { raw }),
    }
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        Self::parse_with_env(argv, |var| std::env::var(var).ok())
    }

    /// Flags override the environment read through `lookup`; a set but
    /// invalid variable fails parsing.
    fn parse_with_env(
        argv: impl IntoIterator<Item = String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut config = EngineConfig::from_lookup(lookup).map_err(ArgsError::Config)?;
        let mut positional = Vec::new();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config.database_url = value;
                }
                "--guest-dir" => {
                    let value = require_value(&mut args, "--guest-dir")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidGuestDir { raw: value });
                    }
                    config.guest_dir = PathBuf::from(value);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let name = positional.next().ok_or(ArgsError::MissingArg { name: "command" })?;
        let command = match name.as_str() {
            "categories" => Command::Categories,
            "stages" => Command::Stages {
                category: parse_category(positional.next())?,
            },
            "questions" => Command::Questions {
                category: parse_category(positional.next())?,
                stage: parse_stage(positional.next())?,
            },
            "submit" => Command::Submit {
                category: parse_category(positional.next())?,
                stage: parse_stage(positional.next())?,
                answers: positional
                    .next()
                    .ok_or(ArgsError::MissingArg { name: "answers" })?,
            },
            "login" => Command::Login {
                user: positional
                    .next()
                    .map(|raw| raw.parse::<UserId>().map_err(|_| ArgsError::InvalidUser { raw }))
                    .transpose()?,
            },
            "logout" => Command::Logout,
            "whoami" => Command::WhoAmI,
            "merge" => Command::Merge,
            "history" => Command::History,
            _ => return Err(ArgsError::UnknownCommand(name)),
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self { config, command })
    }
}

/// Turns `a,b,-,c` into an answer sheet, one entry per question in order.
fn build_sheet(questions: &[Question], raw: &str) -> Result<AnswerSheet, Box<dyn std::error::Error>> {
    let tokens: Vec<&str> = raw.split(',').map(str::trim).collect();
    if tokens.len() != questions.len() {
        return Err(ArgsError::AnswerCount {
            expected: questions.len(),
            got: tokens.len(),
        }
        .into());
    }

    let mut sheet = AnswerSheet::seeded(questions);
    for (question, token) in questions.iter().zip(tokens) {
        if token == "-" || token == "-1" {
            continue;
        }
        let option: usize = token.parse().map_err(|_| ArgsError::InvalidAnswer {
            raw: token.to_owned(),
        })?;
        sheet.select(question, option)?;
    }
    Ok(sheet)
}

fn normalize_sqlite_url(raw: String) -> String {
    let in_memory = raw == "sqlite::memory:" || raw.contains("mode=memory");
    if in_memory || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Resolve the identity for this invocation, falling back to guest play.
async fn active_identity(session: &mut AuthSession) -> Result<Identity, Box<dyn std::error::Error>> {
    session.restore().await?;
    Ok(session.continue_as_guest())
}

fn signed_in_user(identity: Identity) -> Result<UserId, Box<dyn std::error::Error>> {
    identity
        .user_id()
        .ok_or_else(|| "not signed in; run `login` first".into())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = args.config;
    config.database_url = normalize_sqlite_url(config.database_url);
    prepare_sqlite_file(&config.database_url)?;

    let app = AppServices::from_config(&config, Clock::default()).await?;
    let session_kv: Arc<dyn KeyValueStore> =
        Arc::new(FileKeyValueStore::new(config.guest_dir.clone()));
    let provider = Arc::new(LocalSessionProvider::new(session_kv));
    let mut session = app.auth_session(Arc::clone(&provider) as Arc<dyn services::IdentityProvider>);

    match args.command {
        Command::Categories => {
            for category in app.catalog().list_categories().await? {
                println!(
                    "{:>4}  {}  (stages {}..={})",
                    category.id(),
                    category.name(),
                    category.initial_stage(),
                    category.max_stage()
                );
            }
        }
        Command::Stages { category } => {
            let identity = active_identity(&mut session).await?;
            for status in app.progress().stage_overview(identity, category).await? {
                let lock = if status.is_unlocked { "open  " } else { "locked" };
                let best = if status.attempted {
                    format!("best {}%", status.highest_score)
                } else {
                    "not attempted".to_owned()
                };
                println!(
                    "{:>3}  {lock}  {}  {best}",
                    status.stage.stage_number, status.stage.title
                );
            }
        }
        Command::Questions { category, stage } => {
            let identity = active_identity(&mut session).await?;
            if !app.progress().is_unlocked(identity, category, stage).await? {
                println!("stage {stage} is locked");
                return Ok(());
            }
            for (n, question) in app
                .catalog()
                .stage_questions(category, stage)
                .await?
                .iter()
                .enumerate()
            {
                println!("{}. {}", n + 1, question.prompt());
                for (i, option) in question.options().iter().enumerate() {
                    println!("   [{i}] {option}");
                }
            }
        }
        Command::Submit {
            category,
            stage,
            answers,
        } => {
            let identity = active_identity(&mut session).await?;
            if !app.progress().is_unlocked(identity, category, stage).await? {
                tracing::warn!(category_id = %category, stage = %stage, "submitting a locked stage");
            }
            let (questions, _) = app.catalog().new_answer_sheet(category, stage).await?;
            let sheet = build_sheet(&questions, &answers)?;
            let outcome = app
                .progress()
                .submit_stage(identity, category, stage, &sheet)
                .await?;

            println!(
                "score {}% ({}/{} correct), best {}%",
                outcome.score, outcome.correct, outcome.total_questions, outcome.highest_score
            );
            for (n, graded) in outcome.graded.iter().enumerate() {
                let mark = if graded.is_correct { "ok   " } else { "wrong" };
                println!(
                    "{:>3}. {mark} answer {}",
                    n + 1,
                    graded.correct_index
                );
                if let (false, Some(explanation)) = (graded.is_correct, &graded.explanation) {
                    println!("       {explanation}");
                }
            }
            if let Some(next) = outcome.next_stage_unlocked {
                println!("stage {next} unlocked");
            }
        }
        Command::Login { user } => {
            let user = user.unwrap_or_else(UserId::random);
            if session.restore().await? == AuthState::SignedOut {
                session.continue_as_guest();
            }
            provider.sign_in(user)?;
            match session.handle(AuthEvent::SignedIn(user)).await? {
                Some(report) => println!(
                    "signed in as {user}; merged {} guest records",
                    report.merged
                ),
                None => println!("signed in as {user}"),
            }
        }
        Command::Logout => {
            session.restore().await?;
            session.sign_out().await?;
            println!("signed out; playing as guest");
        }
        Command::WhoAmI => match active_identity(&mut session).await? {
            Identity::Guest => println!("guest"),
            Identity::User(user) => println!("{user}"),
        },
        Command::Merge => {
            let user = signed_in_user(active_identity(&mut session).await?)?;
            let report = app.progress().merge_guest_progress(user).await?;
            println!("merged {} guest records", report.merged);
        }
        Command::History => {
            let user = signed_in_user(active_identity(&mut session).await?)?;
            let results = app.history().history(user).await?;
            if results.is_empty() {
                println!("no quiz history yet");
            }
            for result in results {
                println!(
                    "{}  category {} stage {}  {}% of {}",
                    result.created_at.format("%Y-%m-%d %H:%M"),
                    result.category_id,
                    result.stage_number,
                    result.score,
                    result.total_questions
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::model::QuestionId;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn parse(items: &[&str]) -> Result<Args, ArgsError> {
        Args::parse_with_env(argv(items), |_| None)
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var| {
            pairs
                .iter()
                .find(|(name, _)| *name == var)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    fn question(id: u64, options: usize) -> Question {
        Question::new(
            QuestionId::new(id),
            CategoryId::new(1),
            StageNumber::new(1),
            "Q",
            (0..options).map(|i| i.to_string()).collect(),
            0,
            None,
        )
        .unwrap()
    }

    #[test]
    fn parses_flags_around_the_command() {
        let args = parse(&[
            "submit",
            "--db",
            "sqlite::memory:",
            "3",
            "2",
            "0,1,-",
            "--guest-dir",
            "/tmp/g",
        ])
        .unwrap();
        assert_eq!(args.config.database_url, "sqlite::memory:");
        assert_eq!(args.config.guest_dir, PathBuf::from("/tmp/g"));
        assert_eq!(
            args.command,
            Command::Submit {
                category: CategoryId::new(3),
                stage: StageNumber::new(2),
                answers: "0,1,-".into(),
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse(&["stages"]),
            Err(ArgsError::MissingArg { name: "category" })
        ));
        assert!(matches!(
            parse(&["questions", "1", "0"]),
            Err(ArgsError::InvalidStage { .. })
        ));
        assert!(matches!(
            parse(&["login", "bob"]),
            Err(ArgsError::InvalidUser { .. })
        ));
        assert!(matches!(
            parse(&["dance"]),
            Err(ArgsError::UnknownCommand(_))
        ));
    }

    #[test]
    fn flags_override_the_environment() {
        let lookup = env(&[
            ("QUEST_DB_URL", "sqlite:from-env.sqlite3"),
            ("QUEST_STORE_TIMEOUT_MS", "1500"),
        ]);
        let args =
            Args::parse_with_env(argv(&["--guest-dir", "/tmp/g", "whoami"]), lookup).unwrap();
        assert_eq!(args.config.database_url, "sqlite:from-env.sqlite3");
        assert_eq!(args.config.guest_dir, PathBuf::from("/tmp/g"));
        assert_eq!(args.config.store_timeout, std::time::Duration::from_millis(1500));

        let lookup = env(&[("QUEST_DB_URL", "sqlite:from-env.sqlite3")]);
        let args =
            Args::parse_with_env(argv(&["--db", "sqlite::memory:", "whoami"]), lookup).unwrap();
        assert_eq!(args.config.database_url, "sqlite::memory:");
    }

    #[test]
    fn invalid_environment_fails_instead_of_falling_back() {
        let lookup = env(&[
            ("QUEST_DB_URL", "sqlite:production.sqlite3"),
            ("QUEST_STORE_TIMEOUT_MS", "soon"),
        ]);
        let err = Args::parse_with_env(argv(&["categories"]), lookup)
            .err()
            .expect("invalid timeout must be rejected");
        assert!(matches!(
            err,
            ArgsError::Config(ConfigError::Invalid {
                var: "QUEST_STORE_TIMEOUT_MS",
                ..
            })
        ));
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn answer_list_maps_onto_questions() {
        let questions = vec![question(1, 2), question(2, 3), question(3, 2)];
        let sheet = build_sheet(&questions, "1, -, 0").unwrap();
        assert_eq!(sheet.selected(QuestionId::new(1)), Some(1));
        assert_eq!(sheet.selected(QuestionId::new(2)), None);
        assert_eq!(sheet.answered_count(), 2);

        assert!(build_sheet(&questions, "1,0").is_err());
        assert!(build_sheet(&questions, "1,x,0").is_err());
        assert!(build_sheet(&questions, "1,7,0").is_err());
    }

    #[test]
    fn memory_urls_are_left_alone() {
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
        let shared = "sqlite:file:x?mode=memory&cache=shared".to_owned();
        assert_eq!(normalize_sqlite_url(shared.clone()), shared);
        assert!(normalize_sqlite_url("sqlite:quest.sqlite3".into()).starts_with("sqlite:///"));
    }
}
