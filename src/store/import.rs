//! Bulk loading of the published airline dataset.
//!
//! The dataset is a JSON array of monthly entries, one per airport/carrier
//! pair. Every entry becomes one `statistics` row plus its three detail rows.

use std::io::Read;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::store::{bind, Session, Store, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct Entry {
    airport: Named,
    carrier: Named,
    time: Period,
    statistics: Figures,
}

#[derive(Debug, Deserialize)]
struct Named {
    code: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Period {
    label: String,
    year: i64,
    month: i64,
}

#[derive(Debug, Deserialize)]
struct Figures {
    flights: FlightCounts,
    #[serde(rename = "# of delays")]
    delays: DelayCounts,
    #[serde(rename = "minutes delayed")]
    minutes_delayed: MinutesDelayed,
}

#[derive(Debug, Deserialize)]
struct FlightCounts {
    cancelled: i64,
    #[serde(rename = "on time")]
    on_time: i64,
    total: i64,
    delayed: i64,
    diverted: i64,
}

#[derive(Debug, Deserialize)]
struct DelayCounts {
    #[serde(rename = "late aircraft")]
    late_aircraft: i64,
    weather: i64,
    security: i64,
    #[serde(rename = "national aviation system")]
    national_aviation_system: i64,
    carrier: i64,
}

#[derive(Debug, Deserialize)]
struct MinutesDelayed {
    #[serde(rename = "late aircraft")]
    late_aircraft: i64,
    weather: i64,
    carrier: i64,
    security: i64,
    total: i64,
    #[serde(rename = "national aviation system")]
    national_aviation_system: i64,
}

/// Counts of what an import touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub entries: usize,
    pub new_statistics: usize,
}

/// Load a dataset into the store inside a single transaction.
pub fn import_dataset(store: &Store, reader: impl Read) -> Result<ImportSummary, ImportError> {
    let entries: Vec<Entry> = serde_json::from_reader(reader)?;
    let summary = store.with_session(|session| {
        session.transaction(|tx| {
            let mut summary = ImportSummary::default();
            for entry in &entries {
                if import_entry(tx, entry)? {
                    summary.new_statistics += 1;
                }
                summary.entries += 1;
            }
            Ok::<_, StoreError>(summary)
        })
    })?;

    tracing::info!(
        entries = summary.entries,
        new_statistics = summary.new_statistics,
        "Dataset imported"
    );
    Ok(summary)
}

fn import_entry(tx: &Session<'_>, entry: &Entry) -> Result<bool, StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO airports (airport_code, airport_name) VALUES (:code, :name)",
        &bind([(":code", json!(entry.airport.code)), (":name", json!(entry.airport.name))]),
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO carriers (carrier_code, carrier_name) VALUES (:code, :name)",
        &bind([(":code", json!(entry.carrier.code)), (":name", json!(entry.carrier.name))]),
    )?;

    let created = tx.execute(
        "INSERT INTO statistics (airport_id, carrier_id, time_label, time_year, time_month)
         VALUES (
           (SELECT id FROM airports WHERE airport_code = :airport_code),
           (SELECT id FROM carriers WHERE carrier_code = :carrier_code),
           :label, :year, :month)
         ON CONFLICT (airport_id, carrier_id, time_year, time_month) DO NOTHING",
        &bind([
            (":airport_code", json!(entry.airport.code)),
            (":carrier_code", json!(entry.carrier.code)),
            (":label", json!(entry.time.label)),
            (":year", json!(entry.time.year)),
            (":month", json!(entry.time.month)),
        ]),
    )? == 1;

    let statistic_id = tx.count(
        "SELECT statistics.id FROM statistics
         JOIN airports ON airport_id = airports.id
         JOIN carriers ON carrier_id = carriers.id
         WHERE airport_code = :airport_code AND carrier_code = :carrier_code
           AND time_year = :year AND time_month = :month",
        &bind([
            (":airport_code", json!(entry.airport.code)),
            (":carrier_code", json!(entry.carrier.code)),
            (":year", json!(entry.time.year)),
            (":month", json!(entry.time.month)),
        ]),
    )?;

    let flights = &entry.statistics.flights;
    tx.execute(
        "INSERT OR REPLACE INTO statistics_flights (statistic_id, cancelled, on_time, total, delayed, diverted)
         VALUES (:id, :cancelled, :on_time, :total, :delayed, :diverted)",
        &bind([
            (":id", json!(statistic_id)),
            (":cancelled", json!(flights.cancelled)),
            (":on_time", json!(flights.on_time)),
            (":total", json!(flights.total)),
            (":delayed", json!(flights.delayed)),
            (":diverted", json!(flights.diverted)),
        ]),
    )?;

    let delays = &entry.statistics.delays;
    tx.execute(
        "INSERT OR REPLACE INTO statistics_delays (statistic_id, late_aircraft, weather, security, national_aviation_system, carrier)
         VALUES (:id, :late_aircraft, :weather, :security, :nas, :carrier)",
        &bind([
            (":id", json!(statistic_id)),
            (":late_aircraft", json!(delays.late_aircraft)),
            (":weather", json!(delays.weather)),
            (":security", json!(delays.security)),
            (":nas", json!(delays.national_aviation_system)),
            (":carrier", json!(delays.carrier)),
        ]),
    )?;

    let minutes = &entry.statistics.minutes_delayed;
    tx.execute(
        "INSERT OR REPLACE INTO statistics_minutes_delayed (statistic_id, late_aircraft, weather, carrier, security, total, national_aviation_system)
         VALUES (:id, :late_aircraft, :weather, :carrier, :security, :total, :nas)",
        &bind([
            (":id", json!(statistic_id)),
            (":late_aircraft", json!(minutes.late_aircraft)),
            (":weather", json!(minutes.weather)),
            (":carrier", json!(minutes.carrier)),
            (":security", json!(minutes.security)),
            (":total", json!(minutes.total)),
            (":nas", json!(minutes.national_aviation_system)),
        ]),
    )?;

    Ok(created)
}
