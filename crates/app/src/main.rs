use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use course_core::model::{AdvancePolicy, Catalog, ChallengeId, LearnerId, UserProgress};
use serde::Serialize;
use services::{CourseServices, ProgressStore};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod render;

use config::{Backend, FileConfig, Overrides, Settings};

/// Track progress through a week/day/challenge SQL course.
#[derive(Parser, Debug)]
#[command(name = "course", version, about, long_about = None)]
struct Cli {
    /// Verbose logging. Repeat for more (-v, -vv, -vvv). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database url or path.
    #[arg(long = "db", global = true)]
    db_url: Option<String>,

    /// Course catalog (JSON).
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Learner id (UUID).
    #[arg(long, global = true)]
    learner: Option<String>,

    /// Base url of a remote progress service; replaces the SQLite backend.
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// How the current challenge moves on completion.
    #[arg(long, global = true)]
    advance: Option<AdvancePolicy>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Overall completion, XP and per-week totals.
    Status,
    /// Mark a challenge as completed.
    Complete { challenge: String },
    /// Completion of one day.
    Day { week: u32, day: u32 },
    /// Completion of one week.
    Week { week: u32 },
    /// Merge a progress record (JSON) into the learner's progress.
    Import { file: PathBuf },
    /// Print a fresh learner id.
    NewLearner,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            db_url: self.db_url.clone(),
            catalog: self.catalog.clone(),
            learner: self.learner.clone(),
            remote_url: self.remote_url.clone(),
            advance: self.advance,
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(path: &std::path::Path) -> anyhow::Result<Catalog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let catalog =
        Catalog::from_json_str(&raw).with_context(|| format!("loading catalog {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        challenges = catalog.total_challenges(),
        weeks = catalog.weeks().len(),
        "loaded catalog"
    );
    Ok(catalog)
}

async fn build_services(settings: &Settings, catalog: Catalog) -> anyhow::Result<CourseServices> {
    let services = match &settings.backend {
        Backend::Sqlite { url } => {
            db::prepare_sqlite_file(url)?;
            CourseServices::new_sqlite(url, catalog)
                .await
                .with_context(|| format!("opening database {url}"))?
        }
        Backend::Remote(remote) => {
            tracing::info!(base_url = %remote.base_url, "using remote progress service");
            CourseServices::new_remote(remote.clone(), catalog)?
        }
    };
    Ok(services.with_settings(settings.store))
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteOutput<'a> {
    challenge: &'a str,
    newly_completed: bool,
    current_challenge: &'a ChallengeId,
    overall_percent: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportOutput {
    added: usize,
    dropped: usize,
    overall_percent: u8,
}

async fn run_command(cli: &Cli, store: &mut ProgressStore) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Status => {
            let summary = store.summary();
            emit(cli.json, &summary, || render::summary(&summary))
        }
        Commands::Complete { challenge } => {
            let id = ChallengeId::new(challenge.as_str())
                .map_err(|_| anyhow!("invalid challenge id: {challenge:?}"))?;
            let outcome = store.mark_complete(&id).await?;
            let output = CompleteOutput {
                challenge: id.as_str(),
                newly_completed: outcome.is_new(),
                current_challenge: store.current_challenge(),
                overall_percent: store.overall_percent(),
            };
            emit(cli.json, &output, || {
                render::mark_outcome(id.as_str(), &outcome, store.current_challenge().as_str())
            })
        }
        Commands::Day { week, day } => {
            let progress = store.day_progress(*week, *day)?;
            emit(cli.json, &progress, || render::day(&progress))
        }
        Commands::Week { week } => {
            let progress = store.week_progress(*week)?;
            emit(cli.json, &progress, || render::week(&progress))
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let incoming: UserProgress = serde_json::from_str(&raw)
                .with_context(|| format!("parsing progress record {}", file.display()))?;
            let report = store.import(incoming).await?;
            let output = ImportOutput {
                added: report.added,
                dropped: report.dropped,
                overall_percent: store.overall_percent(),
            };
            emit(cli.json, &output, || render::import_report(&report))
        }
        Commands::NewLearner => new_learner(cli.json),
    }
}

fn new_learner(json: bool) -> anyhow::Result<()> {
    let learner = LearnerId::generate();
    emit(json, &learner, || learner.to_string())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if matches!(cli.command, Commands::NewLearner) {
        return new_learner(cli.json);
    }

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(file, |key| dotenvy::var(key).ok(), cli.overrides())?;
    let learner = settings.learner.ok_or_else(|| {
        anyhow!(
            "no learner id configured; pass --learner or set {} (`course new-learner` prints one)",
            config::ENV_LEARNER_ID
        )
    })?;

    let catalog = load_catalog(&settings.catalog)?;
    let services = build_services(&settings, catalog).await?;
    let mut store = services.open_store(learner).await?;
    tracing::debug!(learner = %store.learner(), version = store.version(), "store ready");

    run_command(&cli, &mut store).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
