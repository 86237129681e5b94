pub mod aggregate;
pub mod args;
pub mod backfill;
pub mod boxscore_csv;
pub mod boxscore_html;
pub mod config;
pub mod error;
pub mod fetch;
pub mod game_resolver;
pub mod http_client;
pub mod logging;
pub mod merge;
pub mod model;
pub mod names;
pub mod pipeline;
pub mod player_resolver;
pub mod rate_limit;
pub mod roster_sync;
pub mod schedule;
pub mod schedule_sync;
pub mod seed;
pub mod sources;
pub mod stats_api;
pub mod store;
pub mod tabular;
pub mod teams;
