//! Hand-rolled flag parsing shared by the binaries. Flags take either the
//! `--name=value` or the `--name value` form.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;

/// Longest range a single invocation will expand.
const MAX_RANGE_DAYS: i64 = 400;

pub fn cli_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

pub fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() && !next.starts_with("--") {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

pub fn db_path(args: &[String]) -> Option<PathBuf> {
    flag_value(args, "--db").map(PathBuf::from)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected a YYYY-MM-DD date, got {raw:?}"))
}

pub fn date_flag(args: &[String], name: &str) -> Result<Option<NaiveDate>> {
    flag_value(args, name).map(|raw| parse_date(&raw)).transpose()
}

pub fn usize_flag(args: &[String], name: &str) -> Result<Option<usize>> {
    flag_value(args, name)
        .map(|raw| {
            raw.parse::<usize>()
                .with_context(|| format!("{name} expects a number, got {raw:?}"))
        })
        .transpose()
}

/// Every day from `from` to `to`, inclusive.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>> {
    if to < from {
        return Err(anyhow!("--to {to} is before --from {from}"));
    }
    if (to - from).num_days() > MAX_RANGE_DAYS {
        return Err(anyhow!("date range longer than {MAX_RANGE_DAYS} days"));
    }
    Ok(from.iter_days().take_while(|d| *d <= to).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_flag_forms() {
        let a = args(&["--db=/tmp/x.sqlite", "--game-id", "20251120-NYK-BOS", "--dry-run"]);
        assert_eq!(db_path(&a), Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(flag_value(&a, "--game-id").as_deref(), Some("20251120-NYK-BOS"));
        assert!(has_flag(&a, "--dry-run"));
        assert_eq!(flag_value(&a, "--team"), None);
    }

    #[test]
    fn flag_without_value_is_absent() {
        let a = args(&["--team", "--dry-run"]);
        assert_eq!(flag_value(&a, "--team"), None);
    }

    #[test]
    fn dates_and_ranges() {
        let a = args(&["--from", "2025-11-20", "--max=x"]);
        let from = date_flag(&a, "--from").unwrap().unwrap();
        assert!(usize_flag(&a, "--max").is_err());
        let to = parse_date("2025-11-22").unwrap();
        assert_eq!(date_range(from, to).unwrap().len(), 3);
        assert!(date_range(to, from).is_err());
        assert!(parse_date("11/20/2025").is_err());
    }
}
