use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::{args, logging, seed, store};

fn main() -> Result<()> {
    config::load_env_files();
    logging::init()?;

    let argv = args::cli_args();
    let file = args::flag_value(&argv, "--file")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: seed_reference --file=reference.json [--db=PATH]"))?;
    let db_path = args::db_path(&argv)
        .or_else(|| IngestConfig::from_env().db_path)
        .context("unable to resolve sqlite path")?;

    let data = seed::load_seed(&file)?;
    let mut conn = store::open_db(&db_path)?;
    let summary = seed::apply_seed(&mut conn, &data)?;

    println!("Reference data loaded");
    println!("DB: {}", db_path.display());
    println!("Teams: {} (aliases: {})", summary.teams, summary.aliases);
    println!("Players: {}", summary.players);
    Ok(())
}
