//! MongoDB-backed DLR driver (mirrors `gw/dlr_mongodb.c`). The `mongodb`
//! crate is async-only; since the rest of the DLR contract is a plain
//! blocking trait (see spec.md §5's OS-thread concurrency model), each
//! call bridges through a small dedicated single-thread runtime owned by
//! the store.

use crate::{destination_matches, DlrDriver, DlrEntry};
use bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tokio::runtime::Runtime;
use tracing::warn;

pub struct MongoDlrStore {
    runtime: Runtime,
    collection: Collection<Document>,
}

impl MongoDlrStore {
    /// Connects and creates the compound `(smsc, ts)` index spec.md §6
    /// requires on init.
    pub fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, mongodb::error::Error> {
        let runtime = Runtime::new().expect("failed to start mongo bridge runtime");
        let collection = runtime.block_on(async {
            let client = Client::with_uri_str(uri).await?;
            let coll: Collection<Document> = client.database(database).collection(collection);
            let index = IndexModel::builder()
                .keys(doc! { "smsc": 1, "ts": 1 })
                .options(IndexOptions::builder().build())
                .build();
            coll.create_index(index, None).await?;
            Ok::<_, mongodb::error::Error>(coll)
        })?;
        Ok(MongoDlrStore { runtime, collection })
    }

    fn filter(smsc: &str, ts: &str, dst: Option<&str>) -> Document {
        let mut f = doc! { "smsc": smsc, "ts": ts };
        if let Some(d) = dst {
            f.insert(
                "destination",
                bson::Regex {
                    pattern: format!("{}$", regex_escape(d)),
                    options: String::new(),
                },
            );
        }
        f
    }
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn doc_to_entry(doc: Document) -> Option<DlrEntry> {
    Some(DlrEntry {
        smsc: doc.get_str("smsc").ok()?.to_string(),
        timestamp: doc.get_str("ts").ok()?.to_string(),
        source: doc.get_str("source").unwrap_or_default().to_string(),
        destination: doc.get_str("destination").unwrap_or_default().to_string(),
        service: doc.get_str("service").unwrap_or_default().to_string(),
        url: doc.get_str("url").unwrap_or_default().to_string(),
        mask: doc.get_i64("mask").unwrap_or(0) as u32,
        boxc_id: doc.get_str("boxc_id").unwrap_or_default().to_string(),
        status: doc.get_i32("status").unwrap_or(0),
    })
}

impl DlrDriver for MongoDlrStore {
    fn add(&self, entry: DlrEntry) {
        let doc = doc! {
            "smsc": &entry.smsc,
            "ts": &entry.timestamp,
            "source": &entry.source,
            "destination": &entry.destination,
            "service": &entry.service,
            "url": &entry.url,
            "mask": entry.mask as i64,
            "boxc_id": &entry.boxc_id,
            "status": entry.status,
        };
        if let Err(e) = self.runtime.block_on(self.collection.insert_one(doc, None)) {
            warn!(error = %e, "dlr add (mongo) failed");
        }
    }

    fn get(&self, smsc: &str, ts: &str, dst: Option<&str>) -> Option<DlrEntry> {
        let filter = Self::filter(smsc, ts, dst);
        match self.runtime.block_on(self.collection.find_one(filter, None)) {
            Ok(Some(doc)) => doc_to_entry(doc).filter(|e| destination_matches(&e.destination, dst)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "dlr get (mongo) failed");
                None
            }
        }
    }

    fn update(&self, smsc: &str, ts: &str, dst: Option<&str>, status: i32) {
        let filter = Self::filter(smsc, ts, dst);
        let update = doc! { "$set": { "status": status } };
        if let Err(e) = self
            .runtime
            .block_on(self.collection.update_one(filter, update, None))
        {
            warn!(error = %e, "dlr update (mongo) failed");
        }
    }

    fn remove(&self, smsc: &str, ts: &str, dst: Option<&str>) {
        let filter = Self::filter(smsc, ts, dst);
        if let Err(e) = self.runtime.block_on(self.collection.delete_one(filter, None)) {
            warn!(error = %e, "dlr remove (mongo) failed");
        }
    }

    fn messages(&self) -> i64 {
        match self.runtime.block_on(self.collection.count_documents(None, None)) {
            Ok(n) => n as i64,
            Err(e) => {
                warn!(error = %e, "dlr messages (mongo) failed");
                -1
            }
        }
    }

    fn flush(&self) {
        if let Err(e) = self
            .runtime
            .block_on(self.collection.delete_many(doc! {}, None))
        {
            warn!(error = %e, "dlr flush (mongo) failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_escape_handles_dots_in_msisdn_like_strings() {
        assert_eq!(regex_escape("44.1234"), "44\\.1234");
    }

    #[test]
    fn doc_to_entry_requires_smsc_and_ts() {
        let d = doc! { "source": "1000" };
        assert!(doc_to_entry(d).is_none());
    }
}
