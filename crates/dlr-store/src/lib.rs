//! Uniform delivery-report storage contract (spec.md §4.3 / C3) over
//! heterogeneous back-ends. A [`DlrEntry`] is keyed by `(smsc, timestamp)`
//! with `destination` as an optional disambiguating suffix match; at most
//! one record is ever read, updated, or removed per call.

mod mongo;
mod sql;

pub use mongo::MongoDlrStore;
pub use sql::{SqlDlrStore, SqlFields};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DlrError {
    #[error("back-end connection pool exhausted or unavailable")]
    PoolUnavailable,
    #[error("back-end driver error: {0}")]
    Driver(String),
}

/// A single delivery-report row. Mirrors `gw/dlr_mongodb.c`'s document
/// shape, with `boxc_id` carried so more than one smsbox instance can
/// share a table/collection without colliding on ownership.
#[derive(Debug, Clone, PartialEq)]
pub struct DlrEntry {
    pub smsc: String,
    pub timestamp: String,
    pub source: String,
    pub destination: String,
    pub service: String,
    pub url: String,
    pub mask: u32,
    pub boxc_id: String,
    pub status: i32,
}

/// Capability interface implemented by each back-end. Errors are absorbed
/// at this boundary per spec.md §4.3: callers never see back-end
/// exceptions, only log-and-no-match behavior, so every method returns a
/// plain value rather than a `Result` — failures are logged by the
/// implementation and reported as "no match"/`-1`.
pub trait DlrDriver: Send + Sync {
    fn add(&self, entry: DlrEntry);
    fn get(&self, smsc: &str, ts: &str, dst: Option<&str>) -> Option<DlrEntry>;
    fn update(&self, smsc: &str, ts: &str, dst: Option<&str>, status: i32);
    fn remove(&self, smsc: &str, ts: &str, dst: Option<&str>);
    /// Non-negative row count, or `-1` on a back-end error.
    fn messages(&self) -> i64;
    fn flush(&self);
}

/// Owns a concrete driver and dispatches the uniform contract to it. This
/// is the `DlrStore` value spec.md's Design Notes calls for in place of
/// the original's process-wide statics: constructed once at startup and
/// shared by reference thereafter.
pub struct DlrStore {
    driver: Box<dyn DlrDriver>,
}

impl DlrStore {
    pub fn new(driver: Box<dyn DlrDriver>) -> Self {
        DlrStore { driver }
    }

    pub fn add(&self, entry: DlrEntry) {
        self.driver.add(entry);
    }

    pub fn get(&self, smsc: &str, ts: &str, dst: Option<&str>) -> Option<DlrEntry> {
        self.driver.get(smsc, ts, dst)
    }

    pub fn update(&self, smsc: &str, ts: &str, dst: Option<&str>, status: i32) {
        self.driver.update(smsc, ts, dst, status);
    }

    pub fn remove(&self, smsc: &str, ts: &str, dst: Option<&str>) {
        self.driver.remove(smsc, ts, dst);
    }

    pub fn messages(&self) -> i64 {
        self.driver.messages()
    }

    pub fn flush(&self) {
        self.driver.flush();
    }
}

/// `suffix LIKE %dst` matching rule shared by every driver: `dst = None`
/// always matches, `Some(d)` matches rows whose destination ends with `d`.
fn destination_matches(row_dst: &str, dst: Option<&str>) -> bool {
    match dst {
        None => true,
        Some(d) => row_dst.ends_with(d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_matches_is_suffix_or_wildcard() {
        assert!(destination_matches("441234567", None));
        assert!(destination_matches("441234567", Some("4567")));
        assert!(!destination_matches("441234567", Some("9999")));
    }
}
