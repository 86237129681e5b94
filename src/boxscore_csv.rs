//! CSV box-score exports.
//!
//! Exports arrive with banner lines (`--- BOS ---`), comment lines, and an
//! over-header row before the real header. The header is found by content:
//! a player column plus at least three known stat columns.

use crate::tabular::{
    BoxScoreExtract, PlayerLine, Section, StatColumn, StatLine, TeamTable, dnp_reason,
    is_player_header, is_totals_label,
};

const MIN_STAT_COLUMNS: usize = 3;

/// Parses every team block in `text`. Blocks are separated by banner lines
/// naming the team; a file without banners yields one table with an empty
/// team code.
pub fn extract(text: &str) -> BoxScoreExtract {
    let mut extract = BoxScoreExtract::default();
    let mut code = String::new();
    let mut block = String::new();

    for line in text.lines() {
        if let Some(next) = banner_team(line) {
            if let Some(table) = parse_team_table(&block, &code) {
                extract.teams.push(table);
            }
            block.clear();
            code = next;
            continue;
        }
        block.push_str(line);
        block.push('\n');
    }
    if let Some(table) = parse_team_table(&block, &code) {
        extract.teams.push(table);
    }
    extract
}

/// One team's table. `None` when no header row can be located.
pub fn parse_team_table(text: &str, team_code: &str) -> Option<TeamTable> {
    let mut lines = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !is_noise(l))
        .map(split_record);

    let mut header = None;
    for fields in lines.by_ref() {
        if let Some(h) = Header::detect(&fields) {
            header = Some(h);
            break;
        }
    }
    let header = header?;

    let mut table = TeamTable::new(team_code);
    let mut section = header.opening_section;
    for fields in lines {
        let Some(name) = fields.get(header.player_idx).map(|s| s.trim()) else {
            continue;
        };
        if let Some(next) = Section::from_sentinel(name) {
            section = next;
            continue;
        }
        if name.is_empty() || is_player_header(name) {
            continue;
        }
        let stats = header.read_stats(&fields);
        if is_totals_label(name) {
            table.totals = Some(stats);
            continue;
        }
        if fields
            .iter()
            .enumerate()
            .any(|(i, f)| i != header.player_idx && dnp_reason(f).is_some())
        {
            continue;
        }

        let (name, id_from_name) = split_name_and_id(name);
        let source_player_id = header
            .id_idx
            .and_then(|i| fields.get(i))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or(id_from_name);

        table.players.push(PlayerLine {
            name,
            source_player_id,
            started: section == Section::Starters,
            dnp_reason: None,
            stats,
        });
    }
    Some(table)
}

struct Header {
    player_idx: usize,
    id_idx: Option<usize>,
    columns: Vec<(usize, StatColumn)>,
    opening_section: Section,
}

impl Header {
    fn detect(fields: &[String]) -> Option<Self> {
        let player_idx = fields.iter().position(|f| is_player_header(f))?;
        let mut columns = Vec::new();
        let mut id_idx = None;
        for (i, f) in fields.iter().enumerate() {
            if let Some(col) = StatColumn::from_header(f) {
                // First occurrence wins; some exports repeat MP in advanced blocks.
                if !columns.iter().any(|(_, c)| *c == col) {
                    columns.push((i, col));
                }
            } else if matches!(f.trim(), "-9999" | "Player-additional") {
                id_idx = Some(i);
            }
        }
        if columns.len() < MIN_STAT_COLUMNS {
            return None;
        }
        let opening_section =
            Section::from_sentinel(&fields[player_idx]).unwrap_or(Section::Unknown);
        Some(Self {
            player_idx,
            id_idx,
            columns,
            opening_section,
        })
    }

    fn read_stats(&self, fields: &[String]) -> StatLine {
        let mut stats = StatLine::default();
        for (i, col) in &self.columns {
            if let Some(raw) = fields.get(*i) {
                stats.set(*col, raw);
            }
        }
        stats
    }
}

fn is_noise(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with("---") || t.starts_with('#')
}

/// `--- BOS ---` names the team of the block that follows.
fn banner_team(line: &str) -> Option<String> {
    let inner = line.trim().strip_prefix("---")?.strip_suffix("---")?.trim();
    let valid = (2..=4).contains(&inner.len()) && inner.chars().all(|c| c.is_ascii_uppercase());
    valid.then(|| inner.to_string())
}

/// Some exports append the source id to the name: `Jayson Tatum\tatumja01`.
fn split_name_and_id(raw: &str) -> (String, Option<String>) {
    match raw.split_once('\\') {
        Some((name, id)) if !id.trim().is_empty() => {
            (name.trim().to_string(), Some(id.trim().to_string()))
        }
        _ => (raw.trim().to_string(), None),
    }
}

/// Splits one CSV record, honouring double-quoted fields and `""` escapes.
pub fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if cur.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(ch),
        }
    }
    fields.push(cur);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields() {
        assert_eq!(
            split_record(r#"a,"b, c","say ""hi""",,"#),
            vec!["a", "b, c", r#"say "hi""#, "", ""]
        );
    }

    #[test]
    fn finds_header_after_banner_and_over_header() {
        let text = "\
# exported box score
,,Basic Box Score Stats,,,
Starters,MP,FG,FGA,PTS,+/-
\"Jayson Tatum\",36:12,10,20,30,+8
Reserves,MP,FG,FGA,PTS,+/-
Sam Hauser,12:00,1,3,3,-2
Luke Kornet,Did Not Play,,,,
Team Totals,240,11,23,33,
";
        let table = parse_team_table(text, "BOS").unwrap();
        assert_eq!(table.players.len(), 2);
        assert!(table.players[0].started);
        assert_eq!(table.players[0].stats.minutes, Some(36.2));
        assert_eq!(table.players[0].stats.plus_minus, Some(8));
        assert!(!table.players[1].started);
        assert_eq!(table.totals.as_ref().and_then(|t| t.points), Some(33));
        assert_eq!(table.derived_points(), Some(33));
    }

    #[test]
    fn no_header_means_no_table() {
        assert!(parse_team_table("a,b,c\n1,2,3\n", "BOS").is_none());
    }

    #[test]
    fn banners_split_teams() {
        let text = "\
--- NYK ---
Player,MIN,FGM,FGA,PTS
Jalen Brunson,38:00,11,22,31
--- BOS ---
Player,MIN,FGM,FGA,PTS
Jaylen Brown,35:30,9,18,24
";
        let extract = extract(text);
        assert_eq!(extract.teams.len(), 2);
        assert_eq!(extract.teams[0].team_code, "NYK");
        assert_eq!(extract.teams[1].team_code, "BOS");
        assert!(!extract.teams[1].players[0].started);
    }
}
