use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use persistence::event_log::{read_log_dir, EventLogConfig};
use persistence::snapshot::RawSnapshotStore;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use types::time::{format_utc, TimestampValue};

use tracking::loader::{load_index, DirectorySource};
use tracking::manifest::{ClassFilter, Manifest};
use tracking::feed::FeedDiagnostics;
use tracking::partition::{DuplicatePolicy, PartitionWriter};
use tracking::session::Session;
use tracking::snapshot::{snapshot_at, SnapshotConfig};
use tracking::telemetry::read_telemetry;
use tracking::{parse_feed, TimeSeriesIndex};

/// Largest `--max-age-secs` whose millisecond value fits in an i64.
const MAX_AGE_SECS_LIMIT: i64 = i64::MAX / 1_000;

/// Largest `--step-mins` whose millisecond value fits in an i64.
const STEP_MINS_LIMIT: i64 = i64::MAX / 60_000;

#[derive(Parser, Debug)]
#[command(author, version, about = "Race tracker queries over logged telemetry", long_about = None)]
struct Cli {
    /// Event log directory (day streams and raw snapshots)
    #[arg(long, env = "TRACKER_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Directory holding exported partitions (`teams/`)
    #[arg(long, default_value = "public", global = true)]
    public_dir: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export event log rows into per-entity partitions and a manifest
    Export(ExportArgs),
    /// Import a telemetry CSV into per-entity partitions and a manifest
    Import(ImportArgs),
    /// Check every raw snapshot against its recorded digest
    VerifyRaw,
    /// Report whether there is data, and its time bounds
    Timeline(SourceArgs),
    /// Last known position of every entity at a timeline step or time
    Snapshot(SnapshotArgs),
    /// Entities ranked by distance travelled as of a time
    Leaderboard(LeaderboardArgs),
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Keep only the last sample per entity and timestamp
    #[arg(long)]
    keep_last: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Telemetry CSV to import
    csv: PathBuf,

    /// Keep every sample when an entity reports one timestamp twice
    /// (by default the last one wins)
    #[arg(long)]
    keep_all: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// Day streams of the event log
    Log,
    /// Exported per-entity partitions
    Partitions,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Where to load samples from
    #[arg(long, value_enum, default_value_t = SourceKind::Log)]
    from: SourceKind,

    /// Only entities with this classification tag (partitions only)
    #[arg(long)]
    class: Option<String>,
}

#[derive(Args, Debug)]
struct SnapshotArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Timeline step to report
    #[arg(long, conflicts_with = "at")]
    index: Option<usize>,

    /// Time to report (epoch ms, epoch seconds or RFC 3339)
    #[arg(long)]
    at: Option<String>,

    /// Omit entities whose latest sample is older than this
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=MAX_AGE_SECS_LIMIT))]
    max_age_secs: Option<i64>,
}

#[derive(Args, Debug)]
struct LeaderboardArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Time to rank at (epoch ms, epoch seconds or RFC 3339); defaults to
    /// the end of the data
    #[arg(long)]
    at: Option<String>,

    /// Number of standings to show
    #[arg(long, default_value_t = tracking::DEFAULT_TOP_N)]
    top: usize,

    /// Scrub step in minutes the time is rounded to
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(i64).range(1..=STEP_MINS_LIMIT))]
    step_mins: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match &cli.command {
        Command::Export(args) => handle_export(&cli, args),
        Command::Import(args) => handle_import(&cli, args),
        Command::VerifyRaw => handle_verify_raw(&cli),
        Command::Timeline(args) => handle_timeline(&cli, args).await,
        Command::Snapshot(args) => handle_snapshot(&cli, args).await,
        Command::Leaderboard(args) => handle_leaderboard(&cli, args).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_time(text: &str) -> Result<i64> {
    let value = match text.trim().parse::<f64>() {
        Ok(number) => TimestampValue::Number(number),
        Err(_) => TimestampValue::Text(text.to_string()),
    };
    value
        .normalize()
        .with_context(|| format!("unrecognised time: {text}"))
}

fn load_manifest_if_present(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        return Ok(Manifest::new());
    }
    Manifest::load(path).with_context(|| format!("reading manifest {}", path.display()))
}

/// Build a session from the chosen source, with the manifest used for labels.
async fn load_session(cli: &Cli, args: &SourceArgs) -> Result<(Session, Manifest)> {
    let source = DirectorySource::new(&cli.public_dir);
    match args.from {
        SourceKind::Log => {
            if args.class.is_some() {
                bail!("--class needs --from partitions: the event log carries no classification");
            }
            let contents = read_log_dir(&cli.data_dir)
                .with_context(|| format!("reading event log {}", cli.data_dir.display()))?;
            let index = TimeSeriesIndex::from_rows(&contents.rows);
            let manifest = load_manifest_if_present(&source.manifest_path())?;
            Ok((Session::new(index), manifest))
        }
        SourceKind::Partitions => {
            let manifest_path = source.manifest_path();
            let manifest = Manifest::load(&manifest_path)
                .with_context(|| format!("reading manifest {}", manifest_path.display()))?;
            let filter = ClassFilter::from_option(args.class.clone());
            let outcome = load_index(Arc::new(source), &manifest, &filter).await;
            Ok((Session::new(outcome.index), manifest))
        }
    }
}

fn handle_export(cli: &Cli, args: &ExportArgs) -> Result<()> {
    let contents = read_log_dir(&cli.data_dir)
        .with_context(|| format!("reading event log {}", cli.data_dir.display()))?;
    let policy = if args.keep_last {
        DuplicatePolicy::KeepLast
    } else {
        DuplicatePolicy::KeepAll
    };

    let writer = PartitionWriter::new(&cli.public_dir, policy);
    let base = load_manifest_if_present(&DirectorySource::new(&cli.public_dir).manifest_path())?;
    let summary = writer.export(&contents.rows, &base)?;
    info!(
        skipped_lines = contents.corruption.len(),
        "Export finished"
    );
    print_json(&summary)
}

fn handle_import(cli: &Cli, args: &ImportArgs) -> Result<()> {
    let import = read_telemetry(&args.csv)
        .with_context(|| format!("reading telemetry {}", args.csv.display()))?;
    let policy = if args.keep_all {
        DuplicatePolicy::KeepAll
    } else {
        DuplicatePolicy::KeepLast
    };

    let writer = PartitionWriter::new(&cli.public_dir, policy);
    let base = load_manifest_if_present(&DirectorySource::new(&cli.public_dir).manifest_path())?;
    let summary = writer.export_telemetry(&import.records, &base)?;
    print_json(&serde_json::json!({
        "export": summary,
        "skipped": import.skipped,
    }))
}

/// Integrity of one raw snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifactCheck {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    /// Bytes and record tags seen in the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<FeedDiagnostics>,
    /// Records the feed parser accepts.
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn check_raw_store(store: &RawSnapshotStore) -> Result<Vec<RawArtifactCheck>> {
    let paths = store
        .list()
        .with_context(|| format!("listing raw snapshots in {}", store.dir().display()))?;

    let checks = paths
        .into_iter()
        .map(|path| {
            let verified = store
                .verify(&path)
                .and_then(|sha256| Ok((sha256, store.load(&path)?)));
            match verified {
                Ok((sha256, body)) => RawArtifactCheck {
                    sha256: Some(sha256),
                    diagnostics: Some(FeedDiagnostics::inspect(&body)),
                    records: Some(parse_feed(&body).len()),
                    error: None,
                    path,
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Raw snapshot failed verification");
                    RawArtifactCheck {
                        sha256: None,
                        diagnostics: None,
                        records: None,
                        error: Some(e.to_string()),
                        path,
                    }
                }
            }
        })
        .collect();
    Ok(checks)
}

fn handle_verify_raw(cli: &Cli) -> Result<()> {
    let store = EventLogConfig::new(&cli.data_dir).raw_store();
    let checks = check_raw_store(&store)?;
    print_json(&checks)?;

    let failed = checks.iter().filter(|c| c.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} raw snapshots failed verification", checks.len());
    }
    info!(checked = checks.len(), "Raw snapshots verified");
    Ok(())
}

async fn handle_timeline(cli: &Cli, args: &SourceArgs) -> Result<()> {
    let (session, _) = load_session(cli, args).await?;
    print_json(&serde_json::json!({
        "session": session.state(),
        "steps": session.timeline().len(),
        "first": session.timeline().bounds().and_then(|(first, _)| format_utc(first)),
        "last": session.timeline().bounds().and_then(|(_, last)| format_utc(last)),
    }))
}

async fn handle_snapshot(cli: &Cli, args: &SnapshotArgs) -> Result<()> {
    let (session, _) = load_session(cli, &args.source).await?;
    let config = SnapshotConfig {
        max_age_ms: args.max_age_secs.map(|s| s * 1000),
    };

    if let Some(at) = &args.at {
        let target = parse_time(at)?;
        return print_json(&serde_json::json!({
            "at": target,
            "entries": snapshot_at(session.index(), target, &config),
        }));
    }

    let i = args.index.unwrap_or(0);
    match session.snapshot(i, &config) {
        Some(snapshot) => print_json(&snapshot),
        None => print_json(&serde_json::json!({
            "session": session.state(),
            "timelineIndex": i,
            "snapshot": null,
        })),
    }
}

async fn handle_leaderboard(cli: &Cli, args: &LeaderboardArgs) -> Result<()> {
    let (session, manifest) = load_session(cli, &args.source).await?;
    let step = args.step_mins * 60 * 1000;

    let target = match (&args.at, session.scrub_range(step)) {
        (Some(at), Some(range)) => range.snap(parse_time(at)?),
        (Some(at), None) => parse_time(at)?,
        (None, Some(range)) => range.initial(),
        (None, None) => match session.timeline().bounds() {
            Some((_, last)) => last,
            None => return print_json(&serde_json::json!({ "session": session.state() })),
        },
    };

    let board = session.leaderboard(target, args.top).with_labels(&manifest);
    print_json(&serde_json::json!({
        "time": format_utc(target),
        "leaderboard": board,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tracking").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_time_flags_bounded_to_representable_millis() {
        assert!(parse(&["leaderboard", "--step-mins", "153722867280912"]).is_ok());
        assert!(parse(&["leaderboard", "--step-mins", "153722867280913"]).is_err());
        assert!(parse(&["leaderboard", "--step-mins", "0"]).is_err());
        assert!(parse(&["leaderboard", "--step-mins", "-5"]).is_err());

        assert!(parse(&["snapshot", "--max-age-secs", "9223372036854775"]).is_ok());
        assert!(parse(&["snapshot", "--max-age-secs", "9223372036854776"]).is_err());
        assert!(parse(&["snapshot", "--max-age-secs", "-1"]).is_err());
    }

    #[test]
    fn test_largest_bounds_convert_without_overflow() {
        let cli = parse(&["leaderboard", "--step-mins", "153722867280912"]).unwrap();
        let Command::Leaderboard(args) = cli.command else {
            panic!("expected leaderboard");
        };
        assert!(args.step_mins.checked_mul(60 * 1000).is_some());
        assert!(MAX_AGE_SECS_LIMIT.checked_mul(1000).is_some());
    }

    #[test]
    fn test_import_defaults_to_keep_last() {
        let cli = parse(&["import", "telemetry.csv"]).unwrap();
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.csv, PathBuf::from("telemetry.csv"));
        assert!(!args.keep_all);
    }

    #[test]
    fn test_check_raw_store_reports_tampered_and_unrecorded() {
        let tmp = TempDir::new().unwrap();
        let store = EventLogConfig::new(tmp.path()).raw_store();
        let at = Utc.with_ymd_and_hms(2025, 8, 24, 10, 29, 8).unwrap();
        let body = "<kml><Placemark><name>A</name><coordinates>130.8,-12.4</coordinates></Placemark></kml>";

        let good = store.write(&at, body).unwrap();
        let tampered = store.write(&(at + chrono::Duration::minutes(1)), body).unwrap();
        fs::write(&tampered.path, "<kml/>").unwrap();
        let unrecorded = store.path_for(&(at + chrono::Duration::minutes(2)));
        fs::write(&unrecorded, body).unwrap();

        let checks = check_raw_store(&store).unwrap();
        assert_eq!(checks.len(), 3);

        assert_eq!(checks[0].path, good.path);
        assert_eq!(checks[0].sha256.as_deref(), Some(good.sha256.as_str()));
        assert_eq!(checks[0].records, Some(1));
        assert!(checks[0].error.is_none());

        assert!(checks[1].error.as_deref().unwrap().contains("Integrity check failed"));
        assert!(checks[2].error.as_deref().unwrap().contains("No recorded digest"));
    }
}
