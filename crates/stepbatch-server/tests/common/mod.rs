//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stepbatch_domain::{
    BatchError, BatchExecutor, BatchOutcome, BatchQuery, BatchResult, RequestDescriptor,
    ResultCache, ResultCacheConfig,
};
use stepbatch_server::Scheduler;

/// Data source and sequence group used by the geolocation scenarios.
pub const GEO_BATCH: &str = "GeoBatch";

/// Simulated location record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub ip: String,
    pub country: String,
    /// Executor call that produced this record.
    pub generation: usize,
}

/// Executor that answers from an in-memory table and counts its calls.
pub struct TableExecutor {
    table: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<Vec<String>>>,
    fail_next: Mutex<Option<BatchError>>,
    counter: AtomicUsize,
}

impl TableExecutor {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            table: Mutex::new(
                entries
                    .iter()
                    .map(|(ip, country)| (ip.to_string(), country.to_string()))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn fail_next_batch(&self, err: BatchError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }
}

/// Query understood by [`TableExecutor`].
#[derive(Debug, Clone)]
pub enum TableQuery {
    Lookup(String),
    Assign { ip: String, country: String },
}

#[async_trait]
impl BatchExecutor for TableExecutor {
    type Identity = String;
    type Query = TableQuery;
    type Value = Location;

    async fn execute(
        &self,
        queries: Vec<BatchQuery<String, TableQuery>>,
    ) -> BatchResult<BatchOutcome<String, Location>> {
        let generation = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls
            .lock()
            .unwrap()
            .push(queries.iter().map(|q| q.identity.clone()).collect());
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }

        let mut table = self.table.lock().unwrap();
        let mut outcome = HashMap::new();
        for BatchQuery { identity, query } in queries {
            let result = match query {
                TableQuery::Lookup(ip) => table
                    .get(&ip)
                    .map(|country| Location {
                        ip: ip.clone(),
                        country: country.clone(),
                        generation,
                    })
                    .ok_or_else(|| BatchError::provider(format!("unknown address {ip}"))),
                TableQuery::Assign { ip, country } => {
                    table.insert(ip.clone(), country.clone());
                    Ok(Location {
                        ip,
                        country,
                        generation,
                    })
                }
            };
            outcome.insert(identity, result);
        }
        Ok(outcome)
    }
}

pub fn geo_scheduler(entries: &[(&str, &str)]) -> (Arc<TableExecutor>, Scheduler<TableExecutor>) {
    let executor = Arc::new(TableExecutor::new(entries));
    let cache = Arc::new(ResultCache::new(ResultCacheConfig::default()));
    (Arc::clone(&executor), Scheduler::new(executor, cache))
}

/// Deferred query builder handed to `Scheduler::submit`.
pub type MakeQuery = Box<dyn FnOnce() -> TableQuery + Send>;

pub fn lookup(ip: &str) -> (RequestDescriptor<String>, MakeQuery) {
    let ip = ip.to_string();
    (
        RequestDescriptor::read(ip.clone(), GEO_BATCH, GEO_BATCH),
        Box::new(move || TableQuery::Lookup(ip)),
    )
}

pub fn assign(ip: &str, country: &str) -> (RequestDescriptor<String>, MakeQuery) {
    let ip = ip.to_string();
    let country = country.to_string();
    (
        RequestDescriptor::mutation(format!("assign:{ip}"), GEO_BATCH, GEO_BATCH),
        Box::new(move || TableQuery::Assign { ip, country }),
    )
}
