#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use rusqlite::Connection;

use hoops_ingest::config::SourceClients;
use hoops_ingest::error::TransportError;
use hoops_ingest::fetch::{FetchClient, FetchPolicy, RawResponse, Sleeper, Transport};
use hoops_ingest::pipeline::Context;
use hoops_ingest::sources::SourceUrls;
use hoops_ingest::{seed, store};

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

/// Answers by the first route whose pattern is a substring of the URL;
/// anything unrouted is a 404.
#[derive(Clone, Default)]
pub struct RoutedTransport {
    routes: Rc<RefCell<Vec<(String, u16, String)>>>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl RoutedTransport {
    pub fn route(&self, pattern: &str, status: u16, body: &str) {
        self.routes
            .borrow_mut()
            .push((pattern.to_string(), status, body.to_string()));
    }

    pub fn route_fixture(&self, pattern: &str, fixture: &str) {
        self.route(pattern, 200, &read_fixture(fixture));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls.borrow().iter().filter(|u| u.contains(pattern)).count()
    }
}

impl Transport for RoutedTransport {
    fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<RawResponse, TransportError> {
        self.calls.borrow_mut().push(url.to_string());
        let (status, body) = self
            .routes
            .borrow()
            .iter()
            .find(|(pattern, _, _)| url.contains(pattern.as_str()))
            .map(|(_, status, body)| (*status, body.clone()))
            .unwrap_or((404, String::new()));
        Ok(RawResponse {
            status,
            retry_after: None,
            content_type: None,
            body,
        })
    }
}

#[derive(Clone, Default)]
pub struct NoSleep {
    pub slept: Rc<RefCell<Vec<Duration>>>,
}

impl Sleeper for NoSleep {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

pub fn test_urls() -> SourceUrls {
    SourceUrls {
        stats_api: "http://stats.test/stats".into(),
        schedule_api: "http://schedule.test/v1".into(),
        reference_site: "http://reference.test".into(),
    }
}

fn client(name: &str, transport: &RoutedTransport, short_limit: u32) -> FetchClient {
    let mut policy = FetchPolicy::polite(short_limit, 10_000);
    policy.base_backoff = Duration::from_millis(1);
    policy.max_backoff = Duration::from_millis(10);
    policy.request_delay = Duration::ZERO;
    FetchClient::new(name, Box::new(transport.clone()), policy)
        .with_sleeper(Box::new(NoSleep::default()))
        .with_seed(11)
}

pub fn seeded_conn() -> Connection {
    let mut conn = store::open_in_memory().expect("in-memory db");
    let data = seed::parse_seed(&read_fixture("seed.json")).expect("seed fixture should parse");
    seed::apply_seed(&mut conn, &data).expect("seed should apply");
    conn
}

/// A context over a seeded in-memory store whose three clients all share
/// `transport`.
pub fn context(transport: &RoutedTransport) -> Context {
    context_with_limit(transport, 100)
}

pub fn context_with_limit(transport: &RoutedTransport, short_limit: u32) -> Context {
    let clients = SourceClients {
        stats: client("stats_api", transport, short_limit),
        schedule: client("schedule_api", transport, short_limit),
        reference: client("reference_site", transport, short_limit),
    };
    Context::new(seeded_conn(), clients, test_urls())
        .expect("context should build")
        .with_sleeper(Box::new(NoSleep::default()))
}
