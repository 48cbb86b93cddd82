//! Per-client request history.

use serde_json::json;

use crate::endpoint::Verb;
use crate::store::{bind, Store, StoreResult};

/// Sink notified once for every request that resolved to an endpoint.
pub trait RequestLog: Send + Sync {
    fn record(&self, client_address: &str, endpoint_uri: &str, verb: Verb) -> StoreResult<()>;
}

/// Writes request history into the `users` / `user_requests` tables.
#[derive(Debug, Clone)]
pub struct SqliteRequestLog {
    store: Store,
}

impl SqliteRequestLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl RequestLog for SqliteRequestLog {
    fn record(&self, client_address: &str, endpoint_uri: &str, verb: Verb) -> StoreResult<()> {
        self.store.with_session(|session| {
            session.transaction(|tx| {
                let address = bind([(":address", json!(client_address))]);
                tx.execute("INSERT OR IGNORE INTO users (address) VALUES (:address)", &address)?;
                tx.execute(
                    "INSERT INTO user_requests (user_id, endpoint_uri, request_type)
                     VALUES ((SELECT id FROM users WHERE address = :address), :endpoint_uri, :request_type)",
                    &bind([
                        (":address", json!(client_address)),
                        (":endpoint_uri", json!(endpoint_uri)),
                        (":request_type", json!(verb.code())),
                    ]),
                )?;
                Ok(())
            })
        })
    }
}
