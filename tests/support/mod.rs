//! Shared harness for the end-to-end scenario tests (spec.md §8): a
//! loopback stand-in for the bearerbox plus an in-memory DLR back-end,
//! wired into a real `AppState`.

use dlr_store::{DlrStore, SqlDlrStore, SqlFields, SqlTarget};
use smsbox::bearerbox::{BearerboxFrame, BearerboxLink};
use smsbox::state::AppState;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use urltrans::UrlTransTable;

pub fn read_frame(stream: &mut TcpStream) -> BearerboxFrame {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).expect("bearerbox stream closed before a frame arrived");
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Builds an `AppState` backed by a real loopback TCP connection standing
/// in for the bearerbox, and an in-memory SQLite DLR store. Returns the
/// state plus the bearerbox-side end of the socket, so a test can read
/// whatever the obey/http-result workers write to it.
pub fn test_state(translations_toml: &str) -> (Arc<AppState>, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = std::thread::spawn(move || listener.accept().unwrap().0);

    let bearerbox = BearerboxLink::connect(&addr.ip().to_string(), addr.port()).unwrap();
    let fake_bearerbox = accept.join().unwrap();

    let translations = UrlTransTable::from_toml_str(translations_toml).unwrap();

    let sql = SqlDlrStore::open(SqlTarget::Memory, SqlFields::default(), 1).unwrap();
    sql.create_schema_if_missing().unwrap();
    let dlr = DlrStore::new(Box::new(sql));

    let state = Arc::new(AppState::new(translations, dlr, bearerbox, None, 1000, Vec::new()));
    (state, fake_bearerbox)
}

/// Starts a one-shot raw HTTP server on a loopback port: accepts a single
/// connection, discards the request, writes back `response_bytes`
/// verbatim, then exits. Returns the port to embed in a `get-url`
/// translation pattern.
pub fn spawn_http_stub(response_bytes: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        stream.write_all(&response_bytes).unwrap();
    });
    port
}
