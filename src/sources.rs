//! Upstream URL layouts.

use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrls {
    pub stats_api: String,
    pub schedule_api: String,
    pub reference_site: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self {
            stats_api: "https://stats.nba.com/stats".to_string(),
            schedule_api: "https://api.balldontlie.io/v1".to_string(),
            reference_site: "https://www.basketball-reference.com".to_string(),
        }
    }
}

impl SourceUrls {
    pub fn stats_boxscore(&self, source_game_id: &str) -> String {
        format!(
            "{}/boxscoretraditionalv3?GameID={source_game_id}&LeagueID=00&endPeriod=0&endRange=28800&rangeType=0&startPeriod=0&startRange=0",
            trim(&self.stats_api)
        )
    }

    pub fn stats_summary(&self, source_game_id: &str) -> String {
        format!(
            "{}/boxscoresummaryv2?GameID={source_game_id}",
            trim(&self.stats_api)
        )
    }

    pub fn stats_scoreboard(&self, date: NaiveDate) -> String {
        format!(
            "{}/scoreboardv2?GameDate={}&LeagueID=00&DayOffset=0",
            trim(&self.stats_api),
            date.format("%Y-%m-%d")
        )
    }

    pub fn stats_roster(&self, stats_team_id: &str, season: &str) -> String {
        format!(
            "{}/commonteamroster?LeagueID=00&Season={season}&TeamID={stats_team_id}",
            trim(&self.stats_api)
        )
    }

    pub fn schedule_games(&self, date: NaiveDate, cursor: Option<&str>) -> String {
        let mut url = format!(
            "{}/games?dates[]={}&per_page=100",
            trim(&self.schedule_api),
            date.format("%Y-%m-%d")
        );
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(cursor);
        }
        url
    }

    pub fn reference_boxscore(&self, key: &str) -> String {
        format!("{}/boxscores/{key}.html", trim(&self.reference_site))
    }

    /// Month pages are filed under the year the season ends.
    pub fn reference_schedule(&self, date: NaiveDate) -> String {
        let season_end = if date.month() >= 8 {
            date.year() + 1
        } else {
            date.year()
        };
        format!(
            "{}/leagues/NBA_{season_end}_games-{}.html",
            trim(&self.reference_site),
            date.format("%B").to_string().to_ascii_lowercase()
        )
    }
}

/// Reference-site box-score key: date, a sequence digit, and the home code.
pub fn reference_boxscore_key(date: NaiveDate, home_code: &str) -> String {
    format!("{}0{}", date.format("%Y%m%d"), home_code.to_ascii_uppercase())
}

/// Stats API season label: `2025-26` for any date from August 2025 through
/// July 2026.
pub fn stats_season(date: NaiveDate) -> String {
    let start = if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{start}-{:02}", (start + 1) % 100)
}

fn trim(base: &str) -> &str {
    base.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reference_urls() {
        let urls = SourceUrls::default();
        assert_eq!(reference_boxscore_key(day(2025, 11, 20), "bos"), "202511200BOS");
        assert_eq!(
            urls.reference_boxscore("202511200BOS"),
            "https://www.basketball-reference.com/boxscores/202511200BOS.html"
        );
        assert_eq!(
            urls.reference_schedule(day(2025, 11, 20)),
            "https://www.basketball-reference.com/leagues/NBA_2026_games-november.html"
        );
        assert_eq!(
            urls.reference_schedule(day(2026, 2, 3)),
            "https://www.basketball-reference.com/leagues/NBA_2026_games-february.html"
        );
    }

    #[test]
    fn season_labels() {
        assert_eq!(stats_season(day(2025, 11, 20)), "2025-26");
        assert_eq!(stats_season(day(2026, 4, 2)), "2025-26");
        assert_eq!(stats_season(day(2099, 10, 1)), "2099-00");
        let urls = SourceUrls::default();
        assert_eq!(
            urls.stats_roster("1610612756", "2025-26"),
            "https://stats.nba.com/stats/commonteamroster?LeagueID=00&Season=2025-26&TeamID=1610612756"
        );
    }

    #[test]
    fn schedule_cursor() {
        let urls = SourceUrls {
            schedule_api: "http://localhost:9/v1/".into(),
            ..SourceUrls::default()
        };
        assert_eq!(
            urls.schedule_games(day(2025, 11, 20), Some("42")),
            "http://localhost:9/v1/games?dates[]=2025-11-20&per_page=100&cursor=42"
        );
    }
}
