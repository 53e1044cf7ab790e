//! Kata CLI
//!
//! Browse exercise sets, check solutions, report progress and serve a live
//! session over HTTP.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kata_engine::{
    create_router, AppState, Catalog, CatalogSet, Config, FileProgressStore, LevelFilter,
    ProgressStore, ProgressSummary, Session,
};
use kata_report::{json::JsonGenerator, MarkdownGenerator, ProgressReport};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Kata - practice HTML, CSS and JavaScript one exercise at a time
#[derive(Parser, Debug)]
#[command(name = "kata")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: kata.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Path to the exercise catalog
    #[arg(long, value_name = "FILE", global = true)]
    catalog: Option<String>,

    /// Directory progress records are stored in
    #[arg(long, value_name = "DIR", global = true)]
    progress_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List exercises with completion marks
    List {
        /// Only list this set
        #[arg(short, long)]
        set: Option<String>,

        /// Only list exercises of this level (1-6)
        #[arg(short, long)]
        level: Option<u8>,
    },

    /// Show an exercise's instructions, hint and starter source
    Show {
        /// Set name
        set: String,
        /// Exercise number, as in "Exercise N"
        number: usize,
    },

    /// Render the preview for a source file, or for the starter source
    Preview {
        /// Set name
        set: String,
        /// Exercise number, as in "Exercise N"
        number: usize,
        /// Source file to preview
        file: Option<PathBuf>,
    },

    /// Verify a solution and record completion when it passes
    Check {
        /// Set name
        set: String,
        /// Exercise number, as in "Exercise N"
        number: usize,
        /// Solution file
        file: PathBuf,
    },

    /// Show completion counts
    Progress {
        /// Only show this set
        #[arg(short, long)]
        set: Option<String>,
    },

    /// Write Markdown and JSON progress reports
    Report {
        /// Set name
        set: String,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },

    /// Forget all completed exercises in a set
    Reset {
        /// Set name
        set: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Serve a session over HTTP and WebSocket
    Serve {
        /// Set to open (default: defaultSet from config, else the first set)
        #[arg(short, long)]
        set: Option<String>,

        /// Port for the HTTP server (default: server.port from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?cli.config, catalog = ?cli.catalog, "Starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(catalog) = cli.catalog {
        config.catalog = catalog;
    }
    if let Some(progress_dir) = cli.progress_dir {
        config.progress_dir = Some(progress_dir);
    }
    if let Command::Serve {
        port: Some(port), ..
    } = cli.command
    {
        config.server.port = port;
    }

    // Re-validate after overrides
    config.validate()?;

    let catalog = Catalog::load(Path::new(&config.catalog))?;
    let store: Arc<dyn ProgressStore> =
        Arc::new(FileProgressStore::new(config.resolved_progress_dir()?));

    match cli.command {
        Command::List { set, level } => {
            let filter = parse_level(level)?;
            for set in selected_sets(&catalog, set.as_deref())? {
                print_listing(&open_session(&config, set, &store, filter)?);
            }
        }
        Command::Show { set, number } => {
            print_exercise(catalog.set(&set)?, number)?;
        }
        Command::Preview { set, number, file } => {
            let set = catalog.set(&set)?;
            let (index, exercise) = set.by_number(number)?;
            let source = match file {
                Some(path) => read_source(&path)?,
                None => exercise.starter_source.clone(),
            };

            let mut session = open_session(&config, set, &store, LevelFilter::All)?;
            session.select(index);
            if let Some(preview) = session.edit(source) {
                if let Some(fault) = &preview.fault {
                    tracing::warn!(fault = %fault, "Script raised an uncaught error");
                }
                println!("{}", preview.html());
            }
        }
        Command::Check { set, number, file } => {
            let set = catalog.set(&set)?;
            let (index, _) = set.by_number(number)?;
            let source = read_source(&file)?;

            let mut session = open_session(&config, set, &store, LevelFilter::All)?;
            session.select(index);
            session.edit(source);
            let Some(outcome) = session.submit() else {
                anyhow::bail!("Exercise {number} could not be opened");
            };

            if outcome.passed {
                println!("PASS  {}", outcome.message);
                print_progress(&session.set().name, &session.progress());
            } else {
                println!("FAIL  {}", outcome.message);
                return Ok(ExitCode::from(2));
            }
        }
        Command::Progress { set } => {
            for set in selected_sets(&catalog, set.as_deref())? {
                let session = open_session(&config, set, &store, LevelFilter::All)?;
                print_progress(&session.set().name, &session.progress());
            }
        }
        Command::Report { set, output_dir } => {
            let session = open_session(&config, catalog.set(&set)?, &store, LevelFilter::All)?;
            write_reports(&ProgressReport::from_session(&session), &output_dir)?;
        }
        Command::Reset { set, yes } => {
            let mut session = open_session(&config, catalog.set(&set)?, &store, LevelFilter::All)?;
            let name = session.set().name.clone();
            if session.reset_progress(|| yes || confirm_reset(&name)) {
                println!("Progress for '{name}' has been reset");
            } else {
                println!("Nothing was reset");
            }
        }
        Command::Serve { set, .. } => {
            serve(config, catalog, store, set.as_deref()).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Loads configuration from an explicit path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn parse_level(level: Option<u8>) -> anyhow::Result<LevelFilter> {
    match level {
        None => Ok(LevelFilter::All),
        Some(level) => LevelFilter::level(level).ok_or_else(|| {
            anyhow::anyhow!("Invalid level {level}\n\nSuggestion: Use a level between 1 and 6")
        }),
    }
}

fn selected_sets<'a>(
    catalog: &'a Catalog,
    name: Option<&str>,
) -> anyhow::Result<Vec<&'a CatalogSet>> {
    match name {
        Some(name) => Ok(vec![catalog.set(name)?]),
        None => Ok(catalog.sets.iter().collect()),
    }
}

fn open_session(
    config: &Config,
    set: &CatalogSet,
    store: &Arc<dyn ProgressStore>,
    filter: LevelFilter,
) -> anyhow::Result<Session> {
    let mut session = Session::new(set.clone(), Arc::clone(store), config.sandbox)?;
    session.set_filter(filter);
    Ok(session)
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {e}", path.display()))
}

/// Asks on stdin whether to reset. Anything but "y" or "yes" declines.
fn confirm_reset(name: &str) -> bool {
    print!("Reset all progress for '{name}'? [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_listing(session: &Session) {
    let progress = session.progress();
    println!(
        "{} ({}/{} completed, {}%)",
        session.set().name,
        progress.completed,
        progress.total,
        progress.percent
    );

    let visible = session.visible_exercises();
    if visible.is_empty() {
        println!("  No exercises for level {}", session.filter());
    }
    for exercise in visible {
        let mark = if exercise.completed { "x" } else { " " };
        println!(
            "  [{mark}] {:<12} L{} {:<10} {}",
            exercise.label,
            exercise.level,
            exercise.kind.as_str(),
            exercise.title
        );
    }
    println!();
}

fn print_exercise(set: &CatalogSet, number: usize) -> anyhow::Result<()> {
    let (index, exercise) = set.by_number(number)?;

    println!("{} / {}", set.name, kata_engine::exercise_label(index));
    if !exercise.title.is_empty() {
        println!("{}", exercise.title);
    }
    println!("Level {} ({})", exercise.level, exercise.kind);
    println!();
    println!("{}", exercise.instructions);

    if !exercise.hint_text.is_empty() {
        println!();
        println!("Hint: {}", exercise.hint_text);
    }
    if !exercise.starter_source.is_empty() {
        println!();
        println!("Starter:");
        println!("{}", exercise.starter_source);
    }
    Ok(())
}

fn print_progress(name: &str, progress: &ProgressSummary) {
    println!(
        "{name}: {}/{} completed ({}%)",
        progress.completed, progress.total, progress.percent
    );
    for level in &progress.by_level {
        println!(
            "  Level {}: {}/{}",
            level.level, level.completed, level.total
        );
    }
}

fn write_reports(report: &ProgressReport, output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let md_path = output_dir.join("kata-report.md");
    std::fs::write(&md_path, MarkdownGenerator::new(report).generate())?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join("kata-report.json");
    JsonGenerator::new(report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    Ok(())
}

async fn serve(
    config: Config,
    catalog: Catalog,
    store: Arc<dyn ProgressStore>,
    set: Option<&str>,
) -> anyhow::Result<()> {
    let addr = config.server.address();
    let state = AppState::new(config, catalog, store, set)?;
    let set_name = state.session.lock().await.set().name.clone();
    let router = create_router(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    tracing::info!(addr = %addr, set = %set_name, "Serving session");
    println!("Serving '{set_name}' on http://{addr} (Ctrl+C to stop)");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kata",
            "list",
            "--level",
            "2",
            "--catalog",
            "exercises.json",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.catalog.as_deref(), Some("exercises.json"));
        match cli.command {
            Command::List { set, level } => {
                assert_eq!(set, None);
                assert_eq!(level, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_check() {
        let cli =
            Cli::try_parse_from(["kata", "check", "HTML Basics", "3", "answer.html"]).unwrap();
        match cli.command {
            Command::Check { set, number, file } => {
                assert_eq!(set, "HTML Basics");
                assert_eq!(number, 3);
                assert_eq!(file, PathBuf::from("answer.html"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_check_requires_file() {
        assert!(Cli::try_parse_from(["kata", "check", "HTML Basics", "3"]).is_err());
    }

    #[test]
    fn test_report_default_output_dir() {
        let cli = Cli::try_parse_from(["kata", "report", "CSS"]).unwrap();
        match cli.command {
            Command::Report { output_dir, .. } => assert_eq!(output_dir, PathBuf::from(".")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None).unwrap(), LevelFilter::All);
        assert_eq!(parse_level(Some(6)).unwrap(), LevelFilter::Level(6));
        assert!(parse_level(Some(0)).is_err());
        assert!(parse_level(Some(7)).is_err());
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = load_config(Some("/definitely/not/here/kata.json")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let set = CatalogSet::new("Basics", vec![]);
        let report = ProgressReport::from_set(&set, &kata_engine::CompletedSet::new());

        write_reports(&report, &out).unwrap();

        assert!(out.join("kata-report.md").exists());
        assert!(out.join("kata-report.json").exists());
    }
}
