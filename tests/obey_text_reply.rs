//! End-to-end scenario 1 (spec.md §8): a fixed-text translation replies
//! to an MO and the MO itself is acked, both written to the bearerbox.

mod support;

use sms_proto::{Message, SmsType};
use smsbox::bearerbox::BearerboxFrame;
use support::{read_frame, test_state};

#[test]
fn fixed_text_service_replies_and_acks_the_mo() {
    let (state, mut fake_bearerbox) = test_state(
        r#"
        [[translation]]
        name = "ping"
        type = "text"
        pattern = "pong"
        "#,
    );

    let obey_state = state.clone();
    std::thread::spawn(move || smsbox::workers::obey::run(obey_state));

    let mut mo = Message::new(SmsType::Mo, "+1", "+2");
    mo.id = Some("mo-1".to_string());
    mo.msgdata = b"ping".to_vec();
    state.mo_queue.0.send(mo).unwrap();

    match read_frame(&mut fake_bearerbox) {
        BearerboxFrame::Ack(m) => assert_eq!(m.id.as_deref(), Some("mo-1")),
        other => panic!("expected an ack frame, got {other:?}"),
    }

    match read_frame(&mut fake_bearerbox) {
        BearerboxFrame::Sms(m) => {
            assert_eq!(m.sender, "+2");
            assert_eq!(m.receiver, "+1");
            assert_eq!(m.msgdata, b"pong");
        }
        other => panic!("expected an sms frame, got {other:?}"),
    }
}

#[test]
fn self_loop_mo_is_discarded_without_a_reply() {
    let (state, mut fake_bearerbox) = test_state(
        r#"
        [[translation]]
        name = "ping"
        type = "text"
        pattern = "pong"
        "#,
    );

    let obey_state = state.clone();
    std::thread::spawn(move || smsbox::workers::obey::run(obey_state));

    let mut loop_mo = Message::new(SmsType::Mo, "+1", "+1");
    loop_mo.msgdata = b"ping".to_vec();
    state.mo_queue.0.send(loop_mo).unwrap();

    // Follow it with a normal MO; if the self-loop had produced an ack or
    // reply it would show up here first.
    let mut mo = Message::new(SmsType::Mo, "+3", "+4");
    mo.msgdata = b"ping".to_vec();
    state.mo_queue.0.send(mo).unwrap();

    match read_frame(&mut fake_bearerbox) {
        BearerboxFrame::Ack(m) => assert_eq!((m.sender, m.receiver), ("+4".to_string(), "+3".to_string())),
        other => panic!("expected the second MO's ack, got {other:?}"),
    }
}
