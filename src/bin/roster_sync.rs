use anyhow::{Context, Result};
use chrono::Utc;

use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::pipeline::Context as IngestContext;
use hoops_ingest::sources::stats_season;
use hoops_ingest::{args, logging, roster_sync, store};

fn main() -> Result<()> {
    config::load_env_files();
    logging::init()?;

    let argv = args::cli_args();
    let season = args::flag_value(&argv, "--season")
        .unwrap_or_else(|| stats_season(Utc::now().date_naive()));
    let team = args::flag_value(&argv, "--team");

    let config = IngestConfig::from_env();
    let db_path = args::db_path(&argv)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;
    let mut ctx = IngestContext::from_config(&config, conn)?;
    let report = roster_sync::sync_rosters(&mut ctx, &season, team.as_deref())?;

    println!("Roster sync complete");
    println!("DB: {}", db_path.display());
    println!("Season: {season}  Teams: {}  Players: {}", report.teams, report.players);
    println!(
        "Created: {}  Linked: {}  Moved: {}",
        report.created, report.linked, report.moved
    );
    for failure in report.failures.iter().take(6) {
        println!("   - {failure}");
    }
    if let Some(wait) = report.halted_wait {
        println!("Halted by rate limit; resume in {}s", wait.as_secs());
        std::process::exit(2);
    }
    Ok(())
}
