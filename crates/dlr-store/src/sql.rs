//! SQL-backed DLR driver, generic over any back-end `rusqlite` can reach.
//! Stands in for the "MSSQL, etc." family `gw/dlr_mssql.c` and friends
//! cover in the original: the schema is externally provisioned and
//! column names are configurable via [`SqlFields`], matching the
//! `fields.field_*` configuration spec.md §6 describes.

use crate::{destination_matches, DlrDriver, DlrEntry};
use db_pool::{ConnOps, DbPool, DbPoolError};
use rusqlite::Connection;
use tracing::warn;

/// Column-name overrides for the DLR table. Defaults match the names the
/// rest of this crate uses internally.
#[derive(Debug, Clone)]
pub struct SqlFields {
    pub table: String,
    pub field_smsc: String,
    pub field_ts: String,
    pub field_src: String,
    pub field_dst: String,
    pub field_serv: String,
    pub field_url: String,
    pub field_mask: String,
    pub field_boxc: String,
    pub field_status: String,
}

impl Default for SqlFields {
    fn default() -> Self {
        SqlFields {
            table: "dlr".to_string(),
            field_smsc: "smsc".to_string(),
            field_ts: "ts".to_string(),
            field_src: "source".to_string(),
            field_dst: "destination".to_string(),
            field_serv: "service".to_string(),
            field_url: "url".to_string(),
            field_mask: "mask".to_string(),
            field_boxc: "boxc_id".to_string(),
            field_status: "status".to_string(),
        }
    }
}

/// Either a file path or Kannel's `:memory:` convention for a throwaway
/// store (used by tests).
#[derive(Debug, Clone)]
pub enum SqlTarget {
    File(String),
    Memory,
}

struct SqliteOps {
    target: SqlTarget,
}

impl ConnOps for SqliteOps {
    type Conn = Connection;

    fn open(&self) -> Result<Self::Conn, DbPoolError> {
        let conn = match &self.target {
            SqlTarget::File(path) => Connection::open(path),
            SqlTarget::Memory => Connection::open_in_memory(),
        };
        conn.map_err(|e| DbPoolError::Open(e.to_string()))
    }

    fn check(&self, conn: &mut Self::Conn) -> bool {
        conn.execute_batch("SELECT 1").is_ok()
    }
}

pub struct SqlDlrStore {
    pool: DbPool<SqliteOps>,
    fields: SqlFields,
}

impl SqlDlrStore {
    pub fn open(target: SqlTarget, fields: SqlFields, max_conns: usize) -> Result<Self, DbPoolError> {
        let pool = DbPool::create(SqliteOps { target }, max_conns)?;
        Ok(SqlDlrStore { pool, fields })
    }

    /// Creates the backing table if it does not already exist. The
    /// uniform contract assumes an externally provisioned schema; this
    /// is a convenience for tests and first-run bootstrapping, not part
    /// of the driver's normal operation.
    pub fn create_schema_if_missing(&self) -> Result<(), rusqlite::Error> {
        let conn = self.pool.consume();
        let f = &self.fields;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {smsc} TEXT NOT NULL,
                {ts} TEXT NOT NULL,
                {src} TEXT NOT NULL,
                {dst} TEXT NOT NULL,
                {serv} TEXT NOT NULL,
                {url} TEXT NOT NULL,
                {mask} INTEGER NOT NULL,
                {boxc} TEXT NOT NULL,
                {status} INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_smsc_ts ON {table}({smsc}, {ts});",
            table = f.table,
            smsc = f.field_smsc,
            ts = f.field_ts,
            src = f.field_src,
            dst = f.field_dst,
            serv = f.field_serv,
            url = f.field_url,
            mask = f.field_mask,
            boxc = f.field_boxc,
            status = f.field_status,
        ))
    }

    fn select_rowid(
        conn: &Connection,
        f: &SqlFields,
        smsc: &str,
        ts: &str,
        dst: Option<&str>,
    ) -> rusqlite::Result<Option<i64>> {
        let sql = format!(
            "SELECT rowid FROM {table} WHERE {smsc}=?1 AND {ts}=?2 {dst_clause} LIMIT 1",
            table = f.table,
            smsc = f.field_smsc,
            ts = f.field_ts,
            dst_clause = if dst.is_some() {
                format!("AND {} LIKE ?3", f.field_dst)
            } else {
                String::new()
            },
        );
        let mut stmt = conn.prepare(&sql)?;
        let row = if let Some(d) = dst {
            stmt.query_row(rusqlite::params![smsc, ts, format!("%{d}")], |r| r.get(0))
        } else {
            stmt.query_row(rusqlite::params![smsc, ts], |r| r.get(0))
        };
        match row {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl DlrDriver for SqlDlrStore {
    fn add(&self, entry: DlrEntry) {
        let conn = self.pool.consume();
        let f = &self.fields;
        let sql = format!(
            "INSERT INTO {table} ({smsc},{ts},{src},{dst},{serv},{url},{mask},{boxc},{status})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            table = f.table,
            smsc = f.field_smsc,
            ts = f.field_ts,
            src = f.field_src,
            dst = f.field_dst,
            serv = f.field_serv,
            url = f.field_url,
            mask = f.field_mask,
            boxc = f.field_boxc,
            status = f.field_status,
        );
        if let Err(e) = conn.execute(
            &sql,
            rusqlite::params![
                entry.smsc,
                entry.timestamp,
                entry.source,
                entry.destination,
                entry.service,
                entry.url,
                entry.mask,
                entry.boxc_id,
                entry.status,
            ],
        ) {
            warn!(error = %e, "dlr add failed");
        }
        // entry is caller-owned and dropped here, matching the original's
        // "caller-owned entry destroyed" side-effect.
    }

    fn get(&self, smsc: &str, ts: &str, dst: Option<&str>) -> Option<DlrEntry> {
        let conn = self.pool.consume();
        let f = &self.fields;
        let sql = format!(
            "SELECT {smsc},{ts},{src},{dst},{serv},{url},{mask},{boxc},{status}
             FROM {table} WHERE {smsc}=?1 AND {ts}=?2 {dst_clause} LIMIT 1",
            table = f.table,
            smsc = f.field_smsc,
            ts = f.field_ts,
            src = f.field_src,
            dst = f.field_dst,
            serv = f.field_serv,
            url = f.field_url,
            mask = f.field_mask,
            boxc = f.field_boxc,
            status = f.field_status,
            dst_clause = if dst.is_some() {
                format!("AND {} LIKE ?3", f.field_dst)
            } else {
                String::new()
            },
        );
        let mapper = |row: &rusqlite::Row| -> rusqlite::Result<DlrEntry> {
            Ok(DlrEntry {
                smsc: row.get(0)?,
                timestamp: row.get(1)?,
                source: row.get(2)?,
                destination: row.get(3)?,
                service: row.get(4)?,
                url: row.get(5)?,
                mask: row.get(6)?,
                boxc_id: row.get(7)?,
                status: row.get(8)?,
            })
        };
        let result = (|| -> rusqlite::Result<Option<DlrEntry>> {
            let mut stmt = conn.prepare(&sql)?;
            let row = if let Some(d) = dst {
                stmt.query_row(rusqlite::params![smsc, ts, format!("%{d}")], mapper)
            } else {
                stmt.query_row(rusqlite::params![smsc, ts], mapper)
            };
            match row {
                Ok(entry) => Ok(Some(entry)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })();
        match result {
            Ok(entry) => entry.filter(|e| destination_matches(&e.destination, dst)),
            Err(e) => {
                warn!(error = %e, "dlr get failed");
                None
            }
        }
    }

    fn update(&self, smsc: &str, ts: &str, dst: Option<&str>, status: i32) {
        let conn = self.pool.consume();
        let f = &self.fields;
        match Self::select_rowid(&conn, f, smsc, ts, dst) {
            Ok(Some(rowid)) => {
                let sql = format!("UPDATE {} SET {}=?1 WHERE rowid=?2", f.table, f.field_status);
                if let Err(e) = conn.execute(&sql, rusqlite::params![status, rowid]) {
                    warn!(error = %e, "dlr update failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "dlr update lookup failed"),
        }
    }

    fn remove(&self, smsc: &str, ts: &str, dst: Option<&str>) {
        let conn = self.pool.consume();
        let f = &self.fields;
        match Self::select_rowid(&conn, f, smsc, ts, dst) {
            Ok(Some(rowid)) => {
                let sql = format!("DELETE FROM {} WHERE rowid=?1", f.table);
                if let Err(e) = conn.execute(&sql, rusqlite::params![rowid]) {
                    warn!(error = %e, "dlr remove failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "dlr remove lookup failed"),
        }
    }

    fn messages(&self) -> i64 {
        let conn = self.pool.consume();
        let sql = format!("SELECT COUNT(*) FROM {}", self.fields.table);
        match conn.query_row(&sql, [], |r| r.get::<_, i64>(0)) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "dlr messages count failed");
                -1
            }
        }
    }

    fn flush(&self) {
        let conn = self.pool.consume();
        let sql = format!("DELETE FROM {}", self.fields.table);
        if let Err(e) = conn.execute(&sql, []) {
            warn!(error = %e, "dlr flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqlDlrStore {
        let store = SqlDlrStore::open(SqlTarget::Memory, SqlFields::default(), 1).unwrap();
        store.create_schema_if_missing().unwrap();
        store
    }

    fn entry() -> DlrEntry {
        DlrEntry {
            smsc: "S".into(),
            timestamp: "T".into(),
            source: "1000".into(),
            destination: "441234567".into(),
            service: "svc".into(),
            url: "http://example.com".into(),
            mask: 31,
            boxc_id: "box1".into(),
            status: 0,
        }
    }

    #[test]
    fn add_get_update_remove_round_trip() {
        let store = store();
        store.add(entry());
        assert_eq!(store.messages(), 1);

        let fetched = store.get("S", "T", Some("4567")).expect("row present");
        assert_eq!(fetched.status, 0);

        store.update("S", "T", Some("4567"), 2);
        let fetched = store.get("S", "T", None).unwrap();
        assert_eq!(fetched.status, 2);

        store.remove("S", "T", None);
        assert_eq!(store.messages(), 0);
    }

    #[test]
    fn suffix_mismatch_does_not_match() {
        let store = store();
        store.add(entry());
        assert!(store.get("S", "T", Some("9999")).is_none());
    }

    #[test]
    fn flush_clears_all_rows() {
        let store = store();
        store.add(entry());
        let mut other = entry();
        other.timestamp = "T2".into();
        store.add(other);
        assert_eq!(store.messages(), 2);
        store.flush();
        assert_eq!(store.messages(), 0);
    }
}
