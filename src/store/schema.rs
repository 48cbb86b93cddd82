//! Table definitions for the airline statistics store.

use crate::store::{Store, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS airports(
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  airport_code VARCHAR(10) NOT NULL UNIQUE,
  airport_name VARCHAR(254) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS carriers(
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  carrier_code VARCHAR(10) NOT NULL UNIQUE,
  carrier_name VARCHAR(254) NOT NULL
);

CREATE TABLE IF NOT EXISTS statistics(
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  airport_id INTEGER NOT NULL,
  carrier_id INTEGER NOT NULL,
  time_label VARCHAR(254),
  time_year INTEGER NOT NULL,
  time_month INTEGER NOT NULL,
  UNIQUE(airport_id, carrier_id, time_year, time_month),
  FOREIGN KEY (airport_id) REFERENCES airports(id),
  FOREIGN KEY (carrier_id) REFERENCES carriers(id)
);

CREATE TABLE IF NOT EXISTS statistics_flights(
  statistic_id INTEGER PRIMARY KEY,
  cancelled INTEGER NOT NULL DEFAULT 0,
  on_time INTEGER NOT NULL DEFAULT 0,
  delayed INTEGER NOT NULL DEFAULT 0,
  diverted INTEGER NOT NULL DEFAULT 0,
  total INTEGER NOT NULL DEFAULT 0,
  FOREIGN KEY (statistic_id) REFERENCES statistics(id)
);

CREATE TABLE IF NOT EXISTS statistics_delays(
  statistic_id INTEGER PRIMARY KEY,
  late_aircraft INTEGER NOT NULL DEFAULT 0,
  weather INTEGER NOT NULL DEFAULT 0,
  security INTEGER NOT NULL DEFAULT 0,
  national_aviation_system INTEGER NOT NULL DEFAULT 0,
  carrier INTEGER NOT NULL DEFAULT 0,
  FOREIGN KEY (statistic_id) REFERENCES statistics(id)
);

CREATE TABLE IF NOT EXISTS statistics_minutes_delayed(
  statistic_id INTEGER PRIMARY KEY,
  late_aircraft INTEGER NOT NULL DEFAULT 0,
  weather INTEGER NOT NULL DEFAULT 0,
  carrier INTEGER NOT NULL DEFAULT 0,
  security INTEGER NOT NULL DEFAULT 0,
  total INTEGER NOT NULL DEFAULT 0,
  national_aviation_system INTEGER NOT NULL DEFAULT 0,
  FOREIGN KEY (statistic_id) REFERENCES statistics(id)
);

CREATE TABLE IF NOT EXISTS users(
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  address TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS user_requests(
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  occurred_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
  endpoint_uri TEXT NOT NULL,
  request_type INTEGER NOT NULL DEFAULT 0,
  FOREIGN KEY (user_id) REFERENCES users(id)
    ON UPDATE CASCADE
    ON DELETE CASCADE
);
"#;

/// Create any missing tables. Safe to run on every startup.
pub fn bootstrap(store: &Store) -> StoreResult<()> {
    store.with_session(|session| session.execute_batch(SCHEMA))?;
    tracing::info!("Schema ready");
    Ok(())
}
