use std::fmt;

use quest_core::model::{Category, CategoryId, Question, QuestionId, Stage, StageNumber};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    stages: u32,
    questions: u32,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidStages { raw: String },
    InvalidQuestions { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStages { raw } => {
                write!(f, "invalid --stages value (expected 1..=20): {raw}")
            }
            ArgsError::InvalidQuestions { raw } => write!(f, "invalid --questions value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_stages(raw: String) -> Result<u32, ArgsError> {
    match raw.parse::<u32>() {
        Ok(n) if (1..=20).contains(&n) => Ok(n),
        _ => Err(ArgsError::InvalidStages { raw }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUEST_DB_URL").unwrap_or_else(|_| "sqlite:quest.sqlite3".into());
        let mut stages = 3;
        let mut questions = 5;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--stages" => {
                    stages = parse_stages(require_value(&mut args, "--stages")?)?;
                }
                "--questions" => {
                    let value = require_value(&mut args, "--questions")?;
                    questions = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(ArgsError::InvalidQuestions { raw: value })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            stages,
            questions,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quest.sqlite3)");
    eprintln!("  --stages <n>              Stages per category, 1..=20 (default: 3)");
    eprintln!("  --questions <n>           Questions per stage (default: 5)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUEST_DB_URL              Same as --db");
    eprintln!("  RUST_LOG                  Log filter (default: info)");
}

/// Demo arithmetic question: "a + b" with the right sum at a rotating index.
fn arithmetic_question(
    id: u64,
    category_id: CategoryId,
    stage: StageNumber,
    n: u32,
) -> Result<Question, Box<dyn std::error::Error>> {
    let a = stage.value() * 10 + n;
    let b = n + 1;
    let sum = a + b;
    let slot = n % 4;
    let options = (0..4u32).map(|i| (sum + i - slot).to_string()).collect();

    Ok(Question::new(
        QuestionId::new(id),
        category_id,
        stage,
        format!("What is {a} + {b}?"),
        options,
        slot as usize,
        Some(format!("{a} + {b} = {sum}")),
    )?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let categories = [
        Category::with_defaults(CategoryId::new(1), "Arithmetic", 0)?,
        Category::with_defaults(CategoryId::new(2), "Mental Math", 1)?,
    ];

    let mut question_id = 1_u64;
    for category in &categories {
        storage.catalog.upsert_category(category).await?;
        for s in 1..=args.stages {
            let stage = StageNumber::new(s);
            storage
                .catalog
                .upsert_stage(&Stage::new(
                    category.id(),
                    stage,
                    format!("{} {s}", category.name()),
                    None,
                ))
                .await?;
            for n in 0..args.questions {
                let question = arithmetic_question(question_id, category.id(), stage, n)?;
                storage.catalog.upsert_question(&question).await?;
                question_id += 1;
            }
        }
        tracing::info!(category_id = %category.id(), stages = args.stages, "seeded category");
    }

    println!(
        "Seeded {} categories with {} stages of {} questions into {}",
        categories.len(),
        args.stages,
        args.questions,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
