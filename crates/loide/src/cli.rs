//! Command-line surface of the `loide` binary.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::app::catalog::Catalog;
use crate::app::export::{self, Exporter};
use crate::app::project::{self, Payload, ProjectDocument};
use crate::app::session::Session;
use crate::app::settings::RunSettings;
use crate::app::share;
use crate::app::tabs::{MemoryBufferFactory, TabSession};
use crate::domain::model::OutputPanes;
use crate::infra::config::Config;
use crate::infra::socket::WebSocketTransport;
use crate::infra::storage::LocalStore;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Parser)]
#[command(
    name = "loide",
    author,
    version,
    about = "Run logic programs against a LoIDE solver service",
    long_about = None
)]
pub struct Cli {
    /// Configuration file used instead of the user and workspace files.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Solver service address, overriding the configuration.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the languages, solvers, executors, and options the service offers
    Languages,
    /// Run a project or program file and print the result
    Run {
        file: PathBuf,
        /// Run only the active tab, ignoring the tab selection
        #[arg(long)]
        tab_only: bool,
        /// Also write the output to LoIDE_output.txt in this directory
        #[arg(long)]
        save_output: Option<PathBuf>,
    },
    /// Print a link that reopens a project
    Share {
        file: PathBuf,
        #[arg(long, default_value = "http://localhost:8084")]
        host: String,
    },
    /// Load a project from a share link or file and print it
    Inspect {
        source: String,
        /// Save the project and each tab's program into this directory
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

pub fn run() -> Result<ExitCode> {
    execute(Cli::parse())
}

pub fn execute(cli: Cli) -> Result<ExitCode> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "loide", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(api_url) = cli.api_url {
        config.server.api_url = api_url;
    }
    crate::init(&config);

    match cli.command {
        Commands::Languages => languages(&config),
        Commands::Run {
            file,
            tab_only,
            save_output,
        } => run_file(&config, &file, tab_only, save_output.as_deref()),
        Commands::Share { file, host } => {
            let document = read_project(&file)?;
            println!("{}", share::share_url(&host, &document)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Inspect { source, save } => inspect(&config, &source, save.as_deref()),
        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn connect(config: &Config) -> Result<Session> {
    let transport = WebSocketTransport::new(&config.server.api_url)?;
    let session = Session::new(config, Box::new(transport), Box::new(MemoryBufferFactory));
    match LocalStore::open_in(config.project.storage_dir.as_deref()) {
        Ok(store) => Ok(session.with_store(store)),
        Err(err) => {
            tracing::warn!(error = %err, "running without local storage");
            Ok(session)
        }
    }
}

/// Pump the session until `done` holds. A zero timeout waits forever.
fn wait_for<F>(session: &mut Session, config: &Config, mut done: F) -> Result<()>
where
    F: FnMut(&Session) -> bool,
{
    let timeout = config.server.request_timeout_secs;
    let deadline = (timeout > 0).then(|| Instant::now() + Duration::from_secs(timeout));
    loop {
        session.pump();
        if done(&*session) {
            return Ok(());
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            bail!(
                "timed out after {timeout}s waiting for {}",
                config.server.api_url
            );
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Connect and wait for the catalog. Returns `None` after reporting a failure.
fn fetch_catalog(config: &Config) -> Result<Option<Session>> {
    let mut session = connect(config)?;
    session.start();
    wait_for(&mut session, config, |session| {
        session.has_catalog() || !session.output().error.is_empty()
    })?;
    if session.has_catalog() {
        return Ok(Some(session));
    }
    report_notifications(&mut session);
    Ok(None)
}

fn report_notifications(session: &mut Session) -> bool {
    let notifications = session.take_notifications();
    for notification in &notifications {
        eprintln!("{}", notification.reason);
    }
    !notifications.is_empty()
}

fn languages(config: &Config) -> Result<ExitCode> {
    let Some(session) = fetch_catalog(config)? else {
        return Ok(ExitCode::FAILURE);
    };
    let mut stdout = io::stdout().lock();
    write_catalog(&mut stdout, session.catalog())?;
    Ok(ExitCode::SUCCESS)
}

fn write_catalog(out: &mut impl Write, catalog: &Catalog) -> Result<()> {
    for language in catalog.languages() {
        writeln!(out, "{} ({})", language.value, language.name)?;
        for solver in &language.solvers {
            writeln!(out, "  {} ({})", solver.value, solver.name)?;
            let executors: Vec<&str> = solver
                .executors
                .iter()
                .map(|executor| executor.value.as_str())
                .collect();
            writeln!(out, "    executors: {}", executors.join(", "))?;
            for option in &solver.options {
                let arg = if option.word_argument { " <value>" } else { "" };
                writeln!(out, "    {}{arg}  {}", option.value, option.description)?;
            }
        }
    }
    Ok(())
}

fn run_file(
    config: &Config,
    file: &Path,
    tab_only: bool,
    save_output: Option<&Path>,
) -> Result<ExitCode> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let Some(mut session) = fetch_catalog(config)? else {
        return Ok(ExitCode::FAILURE);
    };
    session
        .import_single(&text)
        .with_context(|| format!("invalid project in {}", file.display()))?;

    if tab_only {
        session.run_tab();
    } else {
        session.run();
    }
    wait_for(&mut session, config, |session| session.pending_runs() == 0)?;

    let output = session.output();
    if !output.model.is_empty() {
        println!("{}", output.model);
    }
    if !output.error.is_empty() {
        eprintln!("{}", output.error);
    }
    if let Some(dir) = save_output {
        let saved = Exporter::new(dir, &config.project.name).save_output(output)?;
        tracing::debug!(path = %saved.output_path.display(), "output saved");
    }

    session.unload();
    let failed = report_notifications(&mut session);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn read_project(file: &Path) -> Result<ProjectDocument> {
    match export::load_file(file)? {
        Payload::Project(document) => Ok(document),
        _ => bail!("{} is not a LoIDE project", file.display()),
    }
}

fn inspect(config: &Config, source: &str, save: Option<&Path>) -> Result<ExitCode> {
    let is_link = source.starts_with("http://") || source.starts_with("https://");
    let document = if is_link {
        share::project_from_url(source)?.context("the link carries no project")?
    } else {
        read_project(Path::new(source))?
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&document).context("failed to serialize project")?
    );

    if let Some(dir) = save {
        let exporter = Exporter::new(dir, &config.project.name);
        exporter.save_project(&document, None)?;

        let mut settings = RunSettings::new();
        let mut tabs = TabSession::default();
        let mut output = OutputPanes::default();
        project::restore(
            &document,
            &Catalog::default(),
            &mut settings,
            &mut tabs,
            &mut output,
        )?;
        for tab in tabs.tabs() {
            exporter.save_tab(tab)?;
        }
        if !output.model.is_empty() || !output.error.is_empty() {
            exporter.save_output(&output)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::catalog::fixture;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from(["loide", "run", "p.json", "--tab-only"]).unwrap();
        match cli.command {
            Commands::Run { file, tab_only, .. } => {
                assert_eq!(file, PathBuf::from("p.json"));
                assert!(tab_only);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn catalog_tree_lists_options() {
        let mut out = Vec::new();
        write_catalog(&mut out, &fixture()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("asp ("));
        assert!(text.contains("    executors: none, local\n"));
        assert!(text.contains("    -filter= <value>"));
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
