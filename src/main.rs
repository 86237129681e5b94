use anyhow::{Context, Result, anyhow};

use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::pipeline::{self, GameOutcome};
use hoops_ingest::{args, logging, store};

fn main() -> Result<()> {
    config::load_env_files();
    logging::init()?;

    let argv = args::cli_args();
    let game_id = args::flag_value(&argv, "--game-id")
        .ok_or_else(|| anyhow!("usage: hoops_ingest --game-id=ID [--dry-run] [--db=PATH]"))?;
    let dry_run = args::has_flag(&argv, "--dry-run");

    let config = IngestConfig::from_env();
    let db_path = args::db_path(&argv)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;
    let mut ctx = pipeline::Context::from_config(&config, conn)?;

    let outcome = pipeline::process_game(&mut ctx, &game_id, dry_run)?;
    println!("Game {game_id}{}", if dry_run { " (dry run)" } else { "" });
    println!("DB: {}", db_path.display());
    match &outcome {
        GameOutcome::Succeeded {
            source,
            rows_written,
            unresolved,
        } => {
            println!("Source: {source}");
            println!("Rows written: {rows_written}");
            println!("Unresolved players: {unresolved}");
        }
        GameOutcome::SkippedAbsent { reason } => println!("Skipped: {reason}"),
        GameOutcome::Failed { reason } => println!("Failed: {reason}"),
        GameOutcome::RateLimited { wait, reason } => {
            println!("Rate limited: {reason}");
            println!("Resume in: {}s", wait.as_secs());
        }
    }
    if matches!(outcome, GameOutcome::Failed { .. } | GameOutcome::RateLimited { .. }) {
        std::process::exit(2);
    }
    Ok(())
}
