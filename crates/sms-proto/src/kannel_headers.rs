//! `X-Kannel-*` request/reply header encoding and decoding (spec.md §6).
//!
//! Header names are matched case-insensitively; values are applied to a
//! [`Message`] skeleton. Decoding is tolerant: an individual header that
//! fails to parse is dropped (and the caller is expected to log it), it
//! never aborts the whole set.

use crate::Message;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;

/// A case-insensitive view over a response's header map, keyed by the
/// bare suffix after `X-Kannel-` (e.g. `"from"`, `"dlr-id"`).
pub struct KannelHeaders(HashMap<String, String>);

impl KannelHeaders {
    /// Build from an iterator of raw `(name, value)` pairs (as returned by
    /// an HTTP response). Non-`X-Kannel-*` headers are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = HashMap::new();
        for (name, value) in pairs {
            if let Some(rest) = strip_prefix_ci(name, "x-kannel-") {
                map.insert(rest.to_ascii_lowercase(), value.to_string());
            }
        }
        KannelHeaders(map)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Applies every recognized header onto `msg`. Returns the list of
    /// header names that were present but failed to parse (dropped).
    pub fn apply(&self, msg: &mut Message) -> Vec<&'static str> {
        let mut dropped = Vec::new();

        if let Some(v) = self.get("from") {
            msg.sender = v.to_string();
        }
        if let Some(v) = self.get("to") {
            msg.receiver = v.to_string();
        }
        if let Some(v) = self.get("udh") {
            match decode_udh_hex(v) {
                Ok(udh) => {
                    msg.udhdata = Some(udh);
                    msg.flag_udh = true;
                }
                Err(()) => dropped.push("udh"),
            }
        }
        if let Some(v) = self.get("dlr-id") {
            msg.dlr_id = Some(v.to_string());
        }
        if let Some(v) = self.get("dlr-mask") {
            match v.parse::<u32>() {
                Ok(m) => msg.dlr_mask = m,
                Err(_) => dropped.push("dlr-mask"),
            }
        }
        if let Some(v) = self.get("flash") {
            match v.parse::<u8>() {
                Ok(0) => msg.flag_flash = false,
                Ok(1) => msg.flag_flash = true,
                _ => dropped.push("flash"),
            }
        }
        if let Some(v) = self.get("mwi") {
            match v.parse::<u8>() {
                Ok(n) if n <= 8 => msg.flag_mwi = n,
                _ => dropped.push("mwi"),
            }
        }
        if let Some(v) = self.get("mwi-messages") {
            match v.parse::<u8>() {
                Ok(n) => msg.mwimessages = n,
                Err(_) => dropped.push("mwi-messages"),
            }
        }
        if let Some(v) = self.get("unicode") {
            match v.parse::<u8>() {
                Ok(0) => msg.flag_unicode = false,
                Ok(1) => msg.flag_unicode = true,
                _ => dropped.push("unicode"),
            }
        }
        if let Some(v) = self.get("validity") {
            match v.parse::<u32>() {
                Ok(n) => msg.validity = n,
                Err(_) => dropped.push("validity"),
            }
        }
        if let Some(v) = self.get("deferred") {
            match v.parse::<u32>() {
                Ok(n) => msg.deferred = n,
                Err(_) => dropped.push("deferred"),
            }
        }

        dropped
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Decodes an `X-Kannel-UDH` hex string. Invalid hex is rejected rather
/// than panicking; the caller drops the header on `Err`.
pub fn decode_udh_hex(hex_str: &str) -> Result<Vec<u8>, ()> {
    hex::decode(hex_str.trim()).map_err(|_| ())
}

/// Encodes UDH bytes as the lowercase hex form used on the wire.
pub fn encode_udh_hex(udh: &[u8]) -> String {
    hex::encode(udh)
}

/// Formats `time` (seconds since epoch) as the `X-Kannel-Time` wire format:
/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_kannel_time(time: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(time, 0).unwrap_or_else(|| DateTime::<Utc>::from_naive_utc_and_offset(NaiveDateTime::default(), Utc));
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
