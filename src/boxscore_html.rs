//! Reference-site box-score pages.
//!
//! The basic box score for each team lives in `table#box-XXX-game-basic`.
//! Some tables (the line score in particular) ship inside HTML comments and
//! are only unhidden by page scripts, so comment bodies are parsed too.

use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;
use scraper::{ElementRef, Html, Node, Selector};

use crate::boxscore_csv;
use crate::model::GameStatus;
use crate::tabular::{
    BoxScoreExtract, PlayerLine, Section, StatColumn, StatLine, TeamLineScore, TeamTable,
    dnp_reason, is_player_header, is_totals_label, parse_int,
};

struct Selectors {
    table: Selector,
    row: Selector,
    cell: Selector,
    anchor: Selector,
    csv_pre: Selector,
}

fn selectors() -> Result<&'static Selectors> {
    static SELECTORS: OnceCell<Selectors> = OnceCell::new();
    SELECTORS.get_or_try_init(|| {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| anyhow!("failed to create selector {css}: {e}"))
        };
        Ok(Selectors {
            table: parse("table[id]")?,
            row: parse("tr")?,
            cell: parse("th, td")?,
            anchor: parse("a")?,
            csv_pre: parse(r#"pre[id^="csv_box-"]"#)?,
        })
    })
}

pub fn extract(body: &str) -> Result<BoxScoreExtract> {
    let sel = selectors()?;
    let document = Html::parse_document(body);
    let mut out = BoxScoreExtract::default();

    scan_tables(&document, sel, &mut out);
    for node in document.tree.root().descendants() {
        if let Node::Comment(comment) = node.value()
            && comment.contains("<table")
        {
            let hidden = Html::parse_fragment(comment);
            scan_tables(&hidden, sel, &mut out);
        }
    }

    if out.teams.is_empty() {
        for pre in document.select(&sel.csv_pre) {
            let code = pre
                .value()
                .attr("id")
                .and_then(|id| box_table_team(id.trim_start_matches("csv_")))
                .unwrap_or_default();
            let text = pre.text().collect::<String>();
            if let Some(table) = boxscore_csv::parse_team_table(&text, &code) {
                out.teams.push(table);
            }
        }
    }

    // Away first, home second: the page lists the visitors on top.
    if out.teams.len() == 2 {
        out.away_code = Some(out.teams[0].team_code.clone());
        out.home_code = Some(out.teams[1].team_code.clone());
    }
    if !out.is_empty() {
        out.status = Some(GameStatus::Final);
    }
    Ok(out)
}

fn scan_tables(document: &Html, sel: &Selectors, out: &mut BoxScoreExtract) {
    for table in document.select(&sel.table) {
        let Some(id) = table.value().attr("id") else {
            continue;
        };
        if id == "line_score" {
            if out.line_scores.is_empty() {
                out.line_scores = parse_line_score(table, sel);
            }
            continue;
        }
        let Some(code) = box_table_team(id) else {
            continue;
        };
        if out.team(&code).is_some() {
            continue;
        }
        out.teams.push(parse_box_table(table, sel, &code));
    }
}

/// `box-BOS-game-basic` → `BOS`.
fn box_table_team(id: &str) -> Option<String> {
    let code = id.strip_prefix("box-")?.strip_suffix("-game-basic")?;
    let valid = (2..=4).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    valid.then(|| code.to_ascii_uppercase())
}

struct Cell {
    stat: Option<String>,
    text: String,
    append_id: Option<String>,
    href_id: Option<String>,
}

fn read_cells(row: ElementRef<'_>, sel: &Selectors) -> Vec<Cell> {
    row.select(&sel.cell)
        .map(|cell| {
            let href_id = cell
                .select(&sel.anchor)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(player_id_from_href);
            Cell {
                stat: cell.value().attr("data-stat").map(str::to_string),
                text: cell.text().collect::<String>().trim().to_string(),
                append_id: cell.value().attr("data-append-csv").map(str::to_string),
                href_id,
            }
        })
        .collect()
}

/// `/players/t/tatumja01.html` → `tatumja01`.
fn player_id_from_href(href: &str) -> Option<String> {
    if !href.contains("/players/") {
        return None;
    }
    let file = href.rsplit('/').next()?;
    let stem = file.strip_suffix(".html").unwrap_or(file);
    (!stem.is_empty()).then(|| stem.to_string())
}

fn parse_box_table(table: ElementRef<'_>, sel: &Selectors, code: &str) -> TeamTable {
    let mut out = TeamTable::new(code);
    let mut header: Vec<Option<StatColumn>> = Vec::new();
    let mut section = Section::Unknown;

    for row in table.select(&sel.row) {
        if row
            .value()
            .attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == "over_header"))
        {
            continue;
        }
        let cells = read_cells(row, sel);
        let Some(first) = cells.first() else {
            continue;
        };

        if let Some(next) = Section::from_sentinel(&first.text) {
            section = next;
            if cells.len() > 1 {
                header = cells
                    .iter()
                    .map(|c| {
                        c.stat
                            .as_deref()
                            .and_then(StatColumn::from_header)
                            .or_else(|| StatColumn::from_header(&c.text))
                    })
                    .collect();
            }
            continue;
        }
        if is_player_header(&first.text) || first.text.is_empty() {
            continue;
        }

        let stats = read_stat_cells(&cells, &header);
        if is_totals_label(&first.text) {
            out.totals = Some(stats);
            continue;
        }
        let reason = cells
            .iter()
            .skip(1)
            .find(|c| c.stat.as_deref() == Some("reason"))
            .map(|c| c.text.clone())
            .or_else(|| cells.iter().skip(1).find_map(|c| dnp_reason(&c.text)));
        if reason.is_some() {
            continue;
        }

        out.players.push(PlayerLine {
            name: first.text.clone(),
            source_player_id: first.append_id.clone().or_else(|| first.href_id.clone()),
            started: section == Section::Starters,
            dnp_reason: None,
            stats,
        });
    }
    out
}

fn read_stat_cells(cells: &[Cell], header: &[Option<StatColumn>]) -> StatLine {
    let mut stats = StatLine::default();
    for (i, cell) in cells.iter().enumerate().skip(1) {
        let column = cell
            .stat
            .as_deref()
            .and_then(StatColumn::from_header)
            .or_else(|| header.get(i).copied().flatten());
        if let Some(column) = column {
            stats.set(column, &cell.text);
        }
    }
    stats
}

fn parse_line_score(table: ElementRef<'_>, sel: &Selectors) -> Vec<TeamLineScore> {
    let mut out = Vec::new();
    for row in table.select(&sel.row) {
        let cells = read_cells(row, sel);
        let Some(first) = cells.first() else {
            continue;
        };
        let code = first.text.trim();
        if !(2..=4).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_uppercase()) {
            continue;
        }
        let periods: Vec<i32> = cells
            .iter()
            .skip(1)
            .filter(|c| c.stat.as_deref() != Some("T"))
            .filter_map(|c| parse_int(&c.text))
            .collect();
        if periods.len() >= 4 {
            out.push(TeamLineScore {
                team_code: code.to_string(),
                periods,
            });
        }
    }
    out
}
