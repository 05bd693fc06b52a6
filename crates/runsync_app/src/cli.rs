use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use runsync_core::ReportLength;
use runsync_engine::{
    ensure_store_dir, FileKeyValueStore, ReqwestBackend, RunBackend, RunStores, StartRunRequest,
};
use runsync_logging::{sync_info, sync_warn, LogDestination};
use tokio::io::BufReader;

use crate::config::{AppConfig, ConfigOverrides};
use crate::render;
use crate::session::{Session, WatchOutcome};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "runsync",
    version,
    about = "Start, follow and review long-running research agent runs"
)]
pub struct Cli {
    /// RON configuration file (defaults to ./runsync.ron when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the research backend
    #[arg(long, global = true, env = "RUNSYNC_BASE_URL")]
    pub base_url: Option<String>,

    /// Directory holding run metadata and history
    #[arg(long, global = true, env = "RUNSYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Milliseconds between status checks
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also log to the terminal
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Start a research run and follow it until it finishes
    Start {
        /// What to research
        #[arg(long)]
        query: String,

        /// Report length: short, medium or long
        #[arg(long, default_value_t = ReportLength::Medium)]
        length: ReportLength,

        /// Project whose documents the run may use
        #[arg(long)]
        project_id: Option<String>,

        /// Return as soon as the run is accepted
        #[arg(long)]
        detach: bool,
    },
    /// Resume following the run recorded by an earlier session
    Resume,
    /// Same as `resume`; used after `start --detach`
    Watch,
    /// List recorded runs, newest first
    History {
        /// Print the stored entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a run's report and update log
    Show { run_id: String },
    /// Delete a run from history
    Remove {
        run_id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            data_dir: self.data_dir.clone(),
            poll_interval_ms: self.poll_interval_ms,
            log_file: self.log_file.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let loaded = AppConfig::load(args.config.as_deref())?;
    let config = loaded.config.merged(args.overrides());

    let destination = if args.verbose {
        LogDestination::Both
    } else {
        LogDestination::File
    };
    runsync_logging::initialize(destination, config.level_filter()?, config.log_file.clone());
    if let Some(warning) = loaded.warning {
        sync_warn!("{}", warning);
    }
    sync_info!(
        "runsync starting (base_url={}, data_dir={:?})",
        config.base_url,
        config.data_dir
    );

    let stores = open_stores(&config.data_dir);
    let backend: Arc<dyn RunBackend> = Arc::new(
        ReqwestBackend::new(config.backend_settings())
            .with_context(|| format!("Invalid backend URL {}", config.base_url))?,
    );
    let mut session = Session::open(stores, backend, config.poll_interval());
    let mut out = io::stdout();

    match args.command {
        Command::Start {
            query,
            length,
            project_id,
            detach,
        } => {
            if query.trim().is_empty() {
                bail!("The query must not be empty");
            }
            let run_id = session
                .start(StartRunRequest {
                    query,
                    report_length: length,
                    project_id,
                })
                .await
                .context("Failed to start run")?;
            writeln!(out, "Started run {run_id}")?;
            if detach {
                session.shutdown();
                writeln!(out, "Detached; run `runsync watch` to follow it.")?;
                return Ok(());
            }
            follow(&mut session, &mut out).await
        }
        Command::Resume | Command::Watch => {
            if !session.resume() {
                writeln!(out, "No unfinished run to resume.")?;
                return Ok(());
            }
            follow(&mut session, &mut out).await
        }
        Command::History { json } => {
            if json {
                let entries = session.state().history().entries();
                writeln!(out, "{}", serde_json::to_string_pretty(entries)?)?;
            } else {
                for line in render::history_table(&session.state().view().history) {
                    writeln!(out, "{line}")?;
                }
            }
            Ok(())
        }
        Command::Show { run_id } => {
            let Some(entry) = session.state().history().get(&run_id) else {
                bail!("No run {run_id} in history");
            };
            for line in render::run_details(entry) {
                writeln!(out, "{line}")?;
            }
            Ok(())
        }
        Command::Remove { run_id, yes } => {
            if !session.state().history().contains(&run_id) {
                bail!("No run {run_id} in history");
            }
            if !yes && !confirm(&format!("Delete run {run_id} from history?"))? {
                writeln!(out, "Kept run {run_id}.")?;
                return Ok(());
            }
            session.remove(&run_id);
            writeln!(out, "Removed run {run_id}.")?;
            Ok(())
        }
    }
}

/// Storage problems never stop a command; the stores degrade to empty.
fn open_stores(data_dir: &Path) -> RunStores<FileKeyValueStore> {
    if let Err(err) = ensure_store_dir(data_dir) {
        sync_warn!(
            "Data directory {} is unusable ({}); runs will not be remembered",
            data_dir.display(),
            err
        );
    }
    RunStores::new(FileKeyValueStore::new(data_dir))
}

async fn follow<S>(session: &mut Session<S>, out: &mut io::Stdout) -> Result<()>
where
    S: runsync_engine::KeyValueStore,
{
    let input = BufReader::new(tokio::io::stdin());
    match session.watch(input, out).await? {
        WatchOutcome::Settled => {
            if let Some(run_id) = session.state().polling().run_id.clone() {
                writeln!(out, "Run finished; `runsync show {run_id}` prints the report.")?;
            }
        }
        WatchOutcome::Detached => {}
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn start_parses_length_and_project() {
        let cli = Cli::try_parse_from([
            "runsync",
            "start",
            "--query",
            "tidal power",
            "--length",
            "long",
            "--project-id",
            "p7",
            "--detach",
        ])
        .unwrap();

        match cli.command {
            Command::Start {
                query,
                length,
                project_id,
                detach,
            } => {
                assert_eq!(query, "tidal power");
                assert_eq!(length, ReportLength::Long);
                assert_eq!(project_id.as_deref(), Some("p7"));
                assert!(detach);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn length_defaults_to_medium() {
        let cli = Cli::try_parse_from(["runsync", "start", "--query", "q"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Start {
                length: ReportLength::Medium,
                ..
            }
        ));
    }

    #[test]
    fn unknown_length_is_rejected() {
        assert!(Cli::try_parse_from(["runsync", "start", "--query", "q", "--length", "epic"]).is_err());
    }

    #[test]
    fn unusable_data_dir_degrades_to_empty_stores() {
        let temp = tempfile::TempDir::new().unwrap();
        let blocker = temp.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let stores = open_stores(&blocker);

        assert!(stores.load_history().is_empty());
        assert_eq!(stores.load_run_metadata(), None);
        stores.save_history(&[]);
    }

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "runsync",
            "history",
            "--base-url",
            "http://backend:8000",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.base_url.as_deref(), Some("http://backend:8000"));
        assert_eq!(overrides.poll_interval_ms, Some(250));
        assert!(matches!(cli.command, Command::History { json: false }));
    }
}
