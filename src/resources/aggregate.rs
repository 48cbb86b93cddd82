//! Descriptive statistics over the delay causes of two airports.

use serde_json::{json, Value};

use crate::endpoint::{Endpoint, RequestContext};
use crate::http::response::{ApiError, ApiResponse, ApiResult};
use crate::pagination::{ConditionBuilder, Conjunct};
use crate::routing::{RegistryBuilder, RegistryError};

pub const TEMPLATE: &str = "/aggregate_carrier_statistics/{airport_1_code}/{airport_2_code}";

/// Delay-cause columns summarized by this endpoint.
const MEASURES: [&str; 2] = ["carrier", "late_aircraft"];

/// Mean, sample standard deviation and median of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub average: f64,
    /// `None` with fewer than two samples.
    pub standard_deviation: Option<f64>,
    pub median: f64,
}

impl Summary {
    /// Summarize `values`; `None` when empty.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let average = values.iter().sum::<f64>() / n;

        let standard_deviation = (values.len() > 1).then(|| {
            let squares: f64 = values.iter().map(|v| (v - average).powi(2)).sum();
            (squares / (n - 1.0)).sqrt()
        });

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            average,
            standard_deviation,
            median,
        })
    }

    fn to_json(self) -> Value {
        json!({
            "average": self.average,
            "standard_deviation": self.standard_deviation,
            "median": self.median,
        })
    }
}

fn aggregate_carrier_statistics(request: &RequestContext<'_>) -> ApiResult {
    let airport_1 = request.path_arg("airport_1_code")?;
    let airport_2 = request.path_arg("airport_2_code")?;

    let mut conditions = ConditionBuilder::new();
    conditions.add_conjunct(Conjunct::new(
        "(airports.airport_code = :airport_1_code OR airports.airport_code = :airport_2_code)",
        [("airport_1_code", json!(airport_1)), ("airport_2_code", json!(airport_2))],
    ));
    let carrier_code = request
        .args
        .get("carrier_code")
        .filter(|code| code.as_str() != Some(""))
        .cloned();
    if let Some(code) = &carrier_code {
        conditions.add_conjunct(Conjunct::new(
            "carriers.carrier_code = :carrier_code",
            [("carrier_code", code.clone())],
        ));
    }

    let sql = format!(
        "SELECT statistics_delays.carrier, statistics_delays.late_aircraft FROM statistics_delays \
         JOIN statistics ON statistics_delays.statistic_id = statistics.id \
         JOIN airports ON statistics.airport_id = airports.id \
         JOIN carriers ON statistics.carrier_id = carriers.id{}",
        conditions.where_clause()
    );
    let rows = request
        .store
        .with_session(|s| s.fetch_all(&sql, &conditions.build_bound_values()))?;

    let mut content = serde_json::Map::new();
    for measure in MEASURES {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(measure).and_then(Value::as_f64))
            .collect();
        let Some(summary) = Summary::of(&values) else {
            return Err(ApiError::not_found("No delay statistics for these airports.")
                .with_context("airport_1_code", airport_1)
                .with_context("airport_2_code", airport_2)
                .with_context("carrier_code", carrier_code.unwrap_or(Value::Null)));
        };
        content.insert(measure.to_string(), summary.to_json());
    }
    content.insert("sample_size".to_string(), json!(rows.len()));

    tracing::debug!(airport_1, airport_2, samples = rows.len(), "Aggregated carrier statistics");
    Ok(ApiResponse::ok(Value::Object(content))
        .with_link("airport_1", format!("/airports/{airport_1}"))
        .with_link("airport_2", format!("/airports/{airport_2}")))
}

pub(crate) fn register(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register(Endpoint::at(TEMPLATE)?.get(aggregate_carrier_statistics));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Args;
    use crate::http::response::ErrorKind;
    use crate::routing::PathArgs;
    use crate::store::{schema, Store};

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        schema::bootstrap(&store).unwrap();
        store
            .with_session(|s| {
                s.execute_batch(
                    "INSERT INTO airports (id, airport_code, airport_name) VALUES
                        (1, 'ATL', 'Atlanta'), (2, 'BOS', 'Boston'), (3, 'ORD', 'Chicago');
                     INSERT INTO carriers (id, carrier_code, carrier_name) VALUES (1, 'AA', 'American'), (2, 'DL', 'Delta');
                     INSERT INTO statistics (id, airport_id, carrier_id, time_year, time_month) VALUES
                        (1, 1, 1, 2004, 1), (2, 2, 1, 2004, 1), (3, 2, 2, 2004, 1), (4, 3, 1, 2004, 1);
                     INSERT INTO statistics_delays (statistic_id, carrier, late_aircraft) VALUES
                        (1, 2, 10), (2, 4, 20), (3, 9, 30), (4, 100, 100);",
                )
            })
            .unwrap();
        store
    }

    fn run(store: &Store, args: &Args) -> ApiResult {
        let path_args: PathArgs = [("airport_1_code", "ATL"), ("airport_2_code", "BOS")]
            .into_iter()
            .collect();
        aggregate_carrier_statistics(&RequestContext {
            raw_uri: "/aggregate_carrier_statistics/ATL/BOS",
            path_args: &path_args,
            args,
            store,
        })
    }

    #[test]
    fn test_summary_of_even_and_odd_series() {
        let even = Summary::of(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(even.average, 2.5);
        assert_eq!(even.median, 2.5);

        let odd = Summary::of(&[2.0, 4.0, 9.0]).unwrap();
        assert_eq!(odd.median, 4.0);
        assert_eq!(odd.average, 5.0);
        assert!((odd.standard_deviation.unwrap() - 13.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_has_no_deviation() {
        let single = Summary::of(&[7.0]).unwrap();
        assert_eq!(single.standard_deviation, None);
        assert_eq!(single.median, 7.0);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn test_aggregates_both_airports() {
        let response = run(&store(), &Args::new()).unwrap();
        assert_eq!(response.payload["sample_size"], 3);
        assert_eq!(response.payload["carrier"]["median"], 4.0);
        assert_eq!(response.payload["late_aircraft"]["average"], 20.0);
        assert_eq!(response.links["airport_2"], "/airports/BOS");
    }

    #[test]
    fn test_carrier_filter_narrows_samples() {
        let args: Args = [("carrier_code".to_string(), json!("DL"))].into_iter().collect();
        let response = run(&store(), &args).unwrap();
        assert_eq!(response.payload["sample_size"], 1);
        assert_eq!(response.payload["carrier"]["standard_deviation"], Value::Null);
    }

    #[test]
    fn test_empty_carrier_code_is_ignored() {
        let args: Args = [("carrier_code".to_string(), json!(""))].into_iter().collect();
        let response = run(&store(), &args).unwrap();
        assert_eq!(response.payload["sample_size"], 3);
    }

    #[test]
    fn test_no_data_is_not_found() {
        let args: Args = [("carrier_code".to_string(), json!("UA"))].into_iter().collect();
        let err = run(&store(), &args).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
