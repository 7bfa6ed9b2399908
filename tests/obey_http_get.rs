//! End-to-end scenario 3 (spec.md §8): a GET service reply whose
//! `X-Kannel-From` response header overrides the reply's sender.

mod support;

use sms_proto::{Message, SmsType};
use smsbox::bearerbox::BearerboxFrame;
use support::{read_frame, spawn_http_stub, test_state};

#[test]
fn get_service_reply_honors_x_kannel_from_override() {
    let body = b"hello";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Kannel-From: SERVICE\r\nContent-Length: {}\r\nConnection: close\r\n\r\nhello",
        body.len()
    );
    let port = spawn_http_stub(response.into_bytes());

    let (state, mut fake_bearerbox) = test_state(&format!(
        r#"
        [[translation]]
        name = "echo"
        type = "get-url"
        pattern = "http://127.0.0.1:{port}/?text=%a"
        accept_x_kannel_headers = true
        "#
    ));

    let obey_state = state.clone();
    std::thread::spawn(move || smsbox::workers::obey::run(obey_state));
    let result_state = state.clone();
    std::thread::spawn(move || smsbox::workers::http_result::run(result_state));

    let mut mo = Message::new(SmsType::Mo, "+1", "+2");
    mo.msgdata = b"echo".to_vec();
    state.mo_queue.0.send(mo).unwrap();

    match read_frame(&mut fake_bearerbox) {
        BearerboxFrame::Ack(_) => {}
        other => panic!("expected an ack frame, got {other:?}"),
    }

    match read_frame(&mut fake_bearerbox) {
        BearerboxFrame::Sms(m) => {
            assert_eq!(m.sender, "SERVICE");
            assert_eq!(m.msgdata, b"hello");
        }
        other => panic!("expected an sms frame, got {other:?}"),
    }
}
