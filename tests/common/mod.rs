//! Shared utilities for integration tests.

use std::net::SocketAddr;

use flight_stats_api::config::ApiConfig;
use flight_stats_api::http::ApiServer;
use flight_stats_api::lifecycle::{open_store, Shutdown};
use flight_stats_api::store::{BoundValues, Store};
use tokio::net::TcpListener;

const SEED: &str = "
INSERT INTO airports (id, airport_code, airport_name) VALUES
    (1, 'ATL', 'Atlanta, GA: Hartsfield-Jackson Atlanta International'),
    (2, 'BOS', 'Boston, MA: Logan International'),
    (3, 'ORD', 'Chicago, IL: Chicago O''Hare International');
INSERT INTO carriers (id, carrier_code, carrier_name) VALUES
    (1, 'AA', 'American Airlines Inc.'),
    (2, 'DL', 'Delta Air Lines Inc.');
INSERT INTO statistics (id, airport_id, carrier_id, time_label, time_year, time_month) VALUES
    (1, 1, 1, '2004/1', 2004, 1),
    (2, 1, 1, '2004/2', 2004, 2),
    (3, 1, 2, '2004/1', 2004, 1),
    (4, 2, 1, '2004/1', 2004, 1),
    (5, 3, 2, '2005/6', 2005, 6);
INSERT INTO statistics_flights (statistic_id, cancelled, on_time, delayed, diverted, total) VALUES
    (1, 1, 80, 19, 0, 100),
    (2, 2, 70, 28, 0, 100),
    (3, 0, 50, 10, 0, 60),
    (4, 3, 40, 7, 0, 50);
INSERT INTO statistics_delays (statistic_id, late_aircraft, weather, security, national_aviation_system, carrier) VALUES
    (1, 10, 1, 0, 3, 5),
    (2, 20, 2, 0, 4, 6),
    (4, 30, 3, 0, 5, 7);
";

/// A running API server backed by a seeded in-memory store.
pub struct TestApi {
    /// Absolute URL of the API root, e.g. `http://127.0.0.1:41234/api`.
    pub base: String,
    pub store: Store,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestApi {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();

        let mut config = ApiConfig::default();
        config.database.path = ":memory:".to_string();
        config.api.public_host = format!("http://{addr}");
        config.api.root = "/api".to_string();

        let store = open_store(&config.database).unwrap();
        store.with_session(|s| s.execute_batch(SEED)).unwrap();

        let server = ApiServer::new(&config, store.clone()).unwrap();
        let shutdown = Shutdown::new();
        let receiver = shutdown.subscribe();
        tokio::spawn(async move {
            server.run(listener, receiver).await.unwrap();
        });

        Self {
            base: format!("http://{addr}/api"),
            store,
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Single-value query against the backing store.
    #[allow(dead_code)]
    pub fn count(&self, sql: &str) -> i64 {
        self.store
            .with_session(|s| s.count(sql, &BoundValues::new()))
            .unwrap()
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
