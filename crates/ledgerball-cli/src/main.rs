// ledgerball entry point.
//
// Startup sequence:
// 1. Parse arguments, initialize tracing (stderr, stdout carries output)
// 2. Resolve the base directory and load config
// 3. Open the stat store, name register and snapshot directory
// 4. Dispatch the subcommand

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use ledgerball_core::config::{self, DataPaths};
use ledgerball_core::{HistoryEntry, PlayerId, StatFamily};
use ledgerball_engine::{ProjectionRun, Projector};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ledgerball")]
#[command(about = "Regressed, multi-level player projections from game logs")]
#[command(version)]
struct Cli {
    /// Directory holding config/ and defaults/. Falls back to the current
    /// directory, then the per-user data directory.
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and publish projections for a date
    Project {
        /// Projection date (YYYY-MM-DD). Defaults to today.
        date: Option<NaiveDate>,

        /// Only this family. Both are projected when omitted.
        #[arg(short, long)]
        family: Option<StatFamily>,
    },

    /// Print a published snapshot
    Show {
        date: NaiveDate,

        #[arg(short, long, default_value = "batting")]
        family: StatFamily,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },

    /// Print one player's projection history, newest first
    History {
        player_id: PlayerId,

        #[arg(short, long, default_value = "batting")]
        family: StatFamily,

        /// Ignore snapshots after this date. Defaults to today.
        #[arg(long)]
        as_of: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },

    /// List published snapshot dates
    Dates {
        #[arg(short, long, default_value = "batting")]
        family: StatFamily,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let base = resolve_base(cli.base)?;
    let mut config = config::load_config_in(&base)
        .with_context(|| format!("failed to load configuration from {}", base.display()))?;
    anchor_paths(&mut config.paths, &base);
    info!(
        base = %base.display(),
        strategy = %config.strategy.name,
        "configuration loaded"
    );

    let projector = Arc::new(Projector::from_config(config).context("failed to open data sources")?);
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Project { date, family } => {
            let date = date.unwrap_or(today);
            let families = match family {
                Some(f) => vec![f],
                None => StatFamily::ALL.to_vec(),
            };
            project(projector, date, families).await
        }
        Commands::Show {
            date,
            family,
            format,
        } => show(&projector, date, family, format),
        Commands::History {
            player_id,
            family,
            as_of,
            format,
        } => history(&projector, player_id, family, as_of.unwrap_or(today), format),
        Commands::Dates { family } => {
            let dates = projector.snapshots().dates(family)?;
            let mut out = std::io::stdout().lock();
            for d in dates {
                writeln!(out, "{d}")?;
            }
            Ok(())
        }
    }
}

/// Run each family on the blocking pool. Every family is attempted; the
/// command fails if any of them did.
async fn project(
    projector: Arc<Projector>,
    date: NaiveDate,
    families: Vec<StatFamily>,
) -> anyhow::Result<()> {
    let handles: Vec<_> = families
        .into_iter()
        .map(|family| {
            let projector = Arc::clone(&projector);
            let handle = tokio::task::spawn_blocking(move || projector.project(date, family));
            (family, handle)
        })
        .collect();

    let mut failed = 0;
    for (family, handle) in handles {
        match handle.await.context("projection task panicked")? {
            Ok(ProjectionRun { snapshot, path }) => {
                info!(
                    %family,
                    %date,
                    players = snapshot.records.len(),
                    path = %path.display(),
                    "published projections"
                );
                println!("{}", path.display());
            }
            Err(e) => {
                error!(%family, %date, "projection failed: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} projection run(s) failed for {date}");
    }
    Ok(())
}

fn show(projector: &Projector, date: NaiveDate, family: StatFamily, format: Format) -> anyhow::Result<()> {
    let snapshot = projector.snapshots().load(date, family)?;
    let out = std::io::stdout().lock();
    match format {
        Format::Csv => snapshot.write_csv(out)?,
        Format::Json => serde_json::to_writer_pretty(out, &snapshot.records)?,
    }
    Ok(())
}

fn history(
    projector: &Projector,
    player_id: PlayerId,
    family: StatFamily,
    as_of: NaiveDate,
    format: Format,
) -> anyhow::Result<()> {
    let entries = projector
        .snapshots()
        .player_history(player_id, family, as_of)?;
    if entries.is_empty() {
        bail!("no {family} projections for player {player_id} on or before {as_of}");
    }

    let out = std::io::stdout().lock();
    match format {
        Format::Csv => write_history_csv(out, &entries)?,
        Format::Json => {
            let rows: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| serde_json::json!({ "date": e.date, "projection": e.record }))
                .collect();
            serde_json::to_writer_pretty(out, &rows)?;
        }
    }
    Ok(())
}

/// One row per snapshot date, columns from the newest entry.
fn write_history_csv<W: Write>(out: W, entries: &[HistoryEntry]) -> anyhow::Result<()> {
    let Some(newest) = entries.first() else {
        return Ok(());
    };
    let columns: Vec<_> = newest.record.stats.iter().map(|&(c, _)| c).collect();

    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec!["date".to_string()];
    header.extend(columns.iter().map(|c| c.label().to_string()));
    writer.write_record(&header)?;

    for entry in entries {
        let mut row = vec![entry.date.to_string()];
        row.extend(columns.iter().map(|&c| match entry.record.get(c) {
            Some(v) => v.to_string(),
            None => String::new(),
        }));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// An explicit `--base` wins. Otherwise the current directory, if it looks
/// like a project root, then the per-user data directory.
fn resolve_base(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(base) = explicit {
        return Ok(base);
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    if cwd.join("config").is_dir() || cwd.join("defaults").is_dir() {
        return Ok(cwd);
    }
    match ProjectDirs::from("", "", "ledgerball") {
        Some(dirs) => Ok(dirs.data_dir().to_path_buf()),
        None => Ok(cwd),
    }
}

/// Relative data paths in the config are relative to the base directory.
fn anchor_paths(paths: &mut DataPaths, base: &Path) {
    let anchor = |p: &mut String| {
        if Path::new(p.as_str()).is_relative() {
            *p = base.join(p.as_str()).display().to_string();
        }
    };
    anchor(&mut paths.store);
    anchor(&mut paths.projections);
    if let Some(names) = paths.names.as_mut() {
        anchor(names);
    }
}

/// Log to stderr so snapshot output on stdout stays machine-readable.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ledgerball=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
