use anyhow::{Context, Result, anyhow};

use hoops_ingest::backfill::{self, BackfillFilter};
use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::model::GameStatus;
use hoops_ingest::pipeline::Context as IngestContext;
use hoops_ingest::{args, logging, store};

fn main() -> Result<()> {
    config::load_env_files();
    logging::init()?;

    let argv = args::cli_args();
    let filter = BackfillFilter {
        from: args::date_flag(&argv, "--from")?,
        to: args::date_flag(&argv, "--to")?,
        team: args::flag_value(&argv, "--team"),
        statuses: parse_statuses(&argv)?,
        only_missing: args::has_flag(&argv, "--missing"),
        max_items: args::usize_flag(&argv, "--max")?,
        dry_run: args::has_flag(&argv, "--dry-run"),
    };

    let config = IngestConfig::from_env();
    let db_path = args::db_path(&argv)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;
    let mut ctx = IngestContext::from_config(&config, conn)?;
    let report = backfill::run_backfill(&mut ctx, &filter)?;

    println!(
        "Backfill complete{}",
        if filter.dry_run { " (dry run)" } else { "" }
    );
    println!("DB: {}", db_path.display());
    println!("Candidates: {}", report.considered);
    println!(
        "Succeeded: {}  Skipped: {}  Failed: {}",
        report.succeeded, report.skipped_absent, report.failed
    );
    println!("Rows written: {}", report.rows_written);
    println!("Unresolved player rows: {}", report.unresolved);
    if !report.failures.is_empty() {
        println!("Failures:");
        for (game_id, reason) in &report.failures {
            println!("   - {game_id}: {reason}");
        }
    }
    if !report.skipped.is_empty() {
        println!("Skipped (showing up to 10):");
        for (game_id, reason) in report.skipped.iter().take(10) {
            println!("   - {game_id}: {reason}");
        }
    }
    if let Some(halt) = &report.halted {
        println!(
            "Halted by rate limit with {} games left; resume in {}s ({})",
            halt.remaining,
            halt.wait.as_secs(),
            halt.reason
        );
        std::process::exit(2);
    }
    Ok(())
}

fn parse_statuses(argv: &[String]) -> Result<Vec<GameStatus>> {
    let Some(raw) = args::flag_value(argv, "--status") else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| GameStatus::parse(s).ok_or_else(|| anyhow!("unknown status {s:?}")))
        .collect()
}
