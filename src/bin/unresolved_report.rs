use anyhow::{Context, Result};

use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::{args, store};

fn main() -> Result<()> {
    config::load_env_files();

    let argv = args::cli_args();
    let db_path = args::db_path(&argv)
        .or_else(|| IngestConfig::from_env().db_path)
        .context("unable to resolve sqlite path")?;
    let limit = args::usize_flag(&argv, "--max")?.unwrap_or(usize::MAX);
    let conn = store::open_db(&db_path)?;
    let report = store::unresolved_report(&conn)?;

    if args::has_flag(&argv, "--json") {
        let rows: Vec<serde_json::Value> = report
            .iter()
            .take(limit)
            .map(|u| {
                serde_json::json!({
                    "raw_name": u.raw_name,
                    "team_context": u.team_context,
                    "first_seen": u.first_seen,
                    "occurrences": u.occurrences,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Unresolved players: {}", report.len());
    println!("DB: {}", db_path.display());
    for u in report.iter().take(limit) {
        println!(
            "{:>4}  {:<28} {:<5} first seen {}",
            u.occurrences, u.raw_name, u.team_context, u.first_seen
        );
    }
    Ok(())
}
