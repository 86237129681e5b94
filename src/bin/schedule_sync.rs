use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::model::SourceKind;
use hoops_ingest::pipeline::Context as IngestContext;
use hoops_ingest::{args, logging, schedule_sync, store};

fn main() -> Result<()> {
    config::load_env_files();
    logging::init()?;

    let argv = args::cli_args();
    let source = match args::flag_value(&argv, "--source") {
        Some(raw) => SourceKind::parse(&raw).ok_or_else(|| anyhow!("unknown source {raw:?}"))?,
        None => SourceKind::ScheduleApi,
    };
    let today = Utc::now().date_naive();
    let from = args::date_flag(&argv, "--from")?.unwrap_or(today);
    let to = args::date_flag(&argv, "--to")?.unwrap_or(from);
    let dates = args::date_range(from, to)?;

    let config = IngestConfig::from_env();
    let db_path = args::db_path(&argv)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;
    let mut ctx = IngestContext::from_config(&config, conn)?;
    let report = schedule_sync::sync_schedule(&mut ctx, source, &dates)?;

    println!("Schedule sync complete");
    println!("DB: {}", db_path.display());
    println!("Source: {source}  Dates: {from}..={to}");
    println!("Requests: {}  Entries: {}", report.requests, report.entries);
    println!(
        "Created: {}  Linked: {}  Updated: {}  Link conflicts: {}",
        report.created, report.linked, report.updated, report.conflicts
    );
    if !report.unmapped.is_empty() {
        println!("Unmapped team codes: {}", report.unmapped.join(", "));
    }
    for failure in report.failures.iter().take(6) {
        println!("   - {failure}");
    }
    if let Some(wait) = report.halted_wait {
        println!("Halted by rate limit; resume in {}s", wait.as_secs());
        std::process::exit(2);
    }
    Ok(())
}
