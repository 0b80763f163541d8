mod config_file;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use engine_logging::{engine_info, engine_warn};
use harvester_engine::{
    write_report, EngineHandle, Harvester, HtmlExtractor, LogProgressSink, NoLogin, ProgressSink,
    ReplayFixture, ReplaySource, RunReport, SqliteStore,
};
use log::LevelFilter;

use crate::logging::LogDestination;

/// Incremental record harvester: replays captured item markup into a
/// deduplicating SQLite store.
#[derive(Debug, Parser)]
#[command(name = "harvester", version)]
struct Cli {
    /// RON file with harvest limits, pacing, schema and extraction rules.
    #[arg(long, short)]
    config: PathBuf,
    /// Plain-text group list, added to the configured groups.
    #[arg(long)]
    groups: Option<PathBuf>,
    /// JSON fixture of captured rounds per group.
    #[arg(long)]
    fixture: PathBuf,
    #[arg(long, default_value = "harvest.db")]
    db: PathBuf,
    /// Write a JSON run report here when the run ends.
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    log: LogDestination,
    #[arg(long, default_value = "engine.log")]
    log_file: PathBuf,
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(cli.log, level, &cli.log_file);

    let mut app = config_file::load(&cli.config)?;
    if let Some(path) = &cli.groups {
        config_file::merge_group_file(&mut app, path)?;
    }
    if app.harvest.group_keys().is_empty() {
        bail!("no groups to harvest; set `groups` in the config or pass --groups");
    }

    let schema = app.schema.resolve();
    let store = Arc::new(
        SqliteStore::open(&cli.db, schema)
            .with_context(|| format!("could not open store {}", cli.db.display()))?,
    );
    let extractor = Arc::new(HtmlExtractor::compile(&app.extraction)?);
    let fixture = ReplayFixture::load(&cli.fixture)
        .with_context(|| format!("could not load fixture {}", cli.fixture.display()))?;
    let harvester = Harvester::new(
        &app.harvest,
        NoLogin,
        ReplaySource::new(fixture).with_dating(extractor.clone()),
        extractor,
        store,
    )?;

    let started = Utc::now();
    let handle = EngineHandle::spawn(harvester);
    let sink = LogProgressSink;
    loop {
        let finished = handle.is_finished();
        while let Some(event) = handle.try_recv() {
            sink.emit(event);
        }
        if finished {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    let summaries = handle.join()?;

    let saved: u64 = summaries.iter().map(|s| s.saved_count).sum();
    engine_info!(
        "Harvested {} groups, {} new rows into {:?}",
        summaries.len(),
        saved,
        cli.db
    );

    if let Some(path) = &cli.report {
        let report = RunReport::new(started, Utc::now(), &summaries);
        match write_report(path, &report) {
            Ok(written) => engine_info!("Report written to {:?}", written),
            Err(err) => engine_warn!("Could not write report to {:?}: {}", path, err),
        }
    }
    Ok(())
}
