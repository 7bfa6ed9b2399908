//! Shared wire/data-model types for the smsbox gateway: the [`Message`]
//! record, `X-Kannel-*` header codec, OTA provisioning bytecode, and the
//! process-wide counters used for catenation references and in-flight
//! request tracking.

mod counter;
mod kannel_headers;
mod message;
pub mod ota;

pub use counter::Counter;
pub use kannel_headers::{decode_udh_hex, encode_udh_hex, format_kannel_time, KannelHeaders};
pub use message::{dlr_mask, Message, MessageError, SmsType};
