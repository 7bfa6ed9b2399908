//! MO request-obey loop (spec.md §4.6 / C6). One or more worker threads
//! drain the shared MO queue; each message is an independent transaction
//! that never unwinds into its neighbors (spec.md §7).

use super::send_message;
use crate::bearerbox::BearerboxFrame;
use crate::state::{AppState, Correlation};
use sms_proto::{Message, SmsType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use urltrans::{expand_pattern, TransType, UrlTranslation};

/// Runs until the MO queue is closed (bearerbox reader shut down) or the
/// program enters shutdown.
pub fn run(state: Arc<AppState>) {
    loop {
        if state.is_shutting_down() {
            break;
        }
        let receiver = state.mo_queue.1.clone();
        match receiver.recv() {
            Ok(m) => handle_mo(&state, m),
            Err(_) => break,
        }
    }
    debug!("obey worker exiting");
}

fn handle_mo(state: &AppState, m: Message) {
    if m.sender.is_empty() || m.receiver.is_empty() {
        warn!("MO with empty sender or receiver, discarding");
        return;
    }
    if m.sender == m.receiver {
        debug!(sender = %m.sender, "self-loop MO, discarding");
        return;
    }
    if state.is_suspended() {
        debug!(sender = %m.sender, "program suspended, discarding MO");
        return;
    }

    let mut ack = Message::new(SmsType::Ack, m.receiver.clone(), m.sender.clone());
    ack.id = m.id.clone();
    ack.time = m.time;
    if let Err(e) = state.bearerbox.write_message(&BearerboxFrame::Ack(ack)) {
        warn!(error = %e, "failed to write ack to bearerbox");
    }

    let translation = state.find_translation(&m.msgdata, m.smsc_id.as_deref()).cloned();

    // Address swap happens before any error path, so a "Request failed"
    // reply (no translation found) is still addressed correctly -- see
    // the obey-loop error-path note in the design notes.
    let new_sender = translation
        .as_ref()
        .and_then(|t| t.faked_sender.clone())
        .or_else(|| state.global_sender.clone())
        .unwrap_or_else(|| m.receiver.clone());
    let mut reply = Message::new(SmsType::MtReply, new_sender, m.sender.clone());
    reply.smsc_id = m.smsc_id.clone();
    reply.time = m.time;
    reply.service = translation.as_ref().map(|t| t.name.clone());

    let Some(t) = translation else {
        reply.msgdata = b"Request failed".to_vec();
        send_message(state, None, reply);
        return;
    };

    match t.kind {
        TransType::Text => {
            reply.msgdata = expand_pattern(&t.pattern, &m).into_bytes();
            send_message(state, Some(&t), reply);
        }
        TransType::File => {
            let path = expand_pattern(&t.pattern, &m);
            match std::fs::read(&path) {
                Ok(contents) => {
                    reply.msgdata = contents;
                    send_message(state, Some(&t), reply);
                }
                Err(e) => {
                    warn!(error = %e, path = %path, "failed to read file translation");
                    reply.msgdata = b"Request failed".to_vec();
                    send_message(state, Some(&t), reply);
                }
            }
        }
        TransType::GetUrl => fire_get(state, &t, &m, reply),
        TransType::PostUrl => fire_post(state, &t, &m, reply),
        TransType::Sendsms => {
            warn!("MO routed to a sendsms-only translation; rejecting");
            reply.msgdata = b"Request failed".to_vec();
            send_message(state, Some(&t), reply);
        }
    }
}

fn correlation_id(state: &AppState) -> String {
    format!("req-{}", state.counters.request_ids.increase())
}

/// Fires the service HTTP call on a throwaway thread so the obey worker
/// never blocks on the network; the response is handed to the HTTP
/// result loop (C7) over `state.http_completions`.
fn fire_get(state: &AppState, t: &UrlTranslation, m: &Message, reply: Message) {
    let url = expand_pattern(&t.pattern, m);
    let id = correlation_id(state);
    state.remember_correlation(
        id.clone(),
        Correlation {
            skeleton: reply,
            translation: t.clone(),
        },
    );

    let client = state.http_client.clone();
    let completions = state.http_completions.0.clone();
    state.counters.num_outstanding_requests.increase();
    let from_header = t.send_sender.then(|| m.sender.clone());

    std::thread::spawn(move || {
        let mut req = client.get(&url).header("User-Agent", "smsbox/1.0");
        if let Some(from) = &from_header {
            req = req.header("X-Kannel-From", from);
        }
        push_completion(completions, id, req.send());
    });
}

fn fire_post(state: &AppState, t: &UrlTranslation, m: &Message, reply: Message) {
    let url = expand_pattern(&t.pattern, m);
    let id = correlation_id(state);
    state.remember_correlation(
        id.clone(),
        Correlation {
            skeleton: reply,
            translation: t.clone(),
        },
    );

    let client = state.http_client.clone();
    let completions = state.http_completions.0.clone();
    state.counters.num_outstanding_requests.increase();

    let content_type = if m.flag_8bit {
        "application/octet-stream"
    } else {
        "text/plain"
    };
    let body = m.msgdata.clone();
    let mut headers = kannel_request_headers(m);
    headers.insert("Content-Type".to_string(), content_type.to_string());

    std::thread::spawn(move || {
        let mut req = client.post(&url).body(body);
        for (k, v) in &headers {
            req = req.header(k, v);
        }
        push_completion(completions, id, req.send());
    });
}

fn kannel_request_headers(m: &Message) -> HashMap<String, String> {
    let mut h = HashMap::new();
    h.insert("X-Kannel-From".to_string(), m.sender.clone());
    h.insert("X-Kannel-To".to_string(), m.receiver.clone());
    if let Some(udh) = &m.udhdata {
        h.insert("X-Kannel-UDH".to_string(), hex::encode(udh));
    }
    if let Some(id) = &m.dlr_id {
        h.insert("X-Kannel-DLR-ID".to_string(), id.clone());
    }
    if m.dlr_mask != 0 {
        h.insert("X-Kannel-DLR-Mask".to_string(), m.dlr_mask.to_string());
    }
    if m.flag_flash {
        h.insert("X-Kannel-Flash".to_string(), "1".to_string());
    }
    if m.flag_mwi != 0 {
        h.insert("X-Kannel-MWI".to_string(), m.flag_mwi.to_string());
        h.insert("X-Kannel-MWI-Messages".to_string(), m.mwimessages.to_string());
    }
    if m.flag_unicode {
        h.insert("X-Kannel-Unicode".to_string(), "1".to_string());
    }
    if m.validity != 0 {
        h.insert("X-Kannel-Validity".to_string(), m.validity.to_string());
    }
    if m.deferred != 0 {
        h.insert("X-Kannel-Deferred".to_string(), m.deferred.to_string());
    }
    h
}

fn push_completion(
    completions: crossbeam_channel::Sender<crate::state::HttpCompletion>,
    id: String,
    result: Result<reqwest::blocking::Response, reqwest::Error>,
) {
    let completion = match result {
        Ok(resp) => {
            let status = Some(resp.status().as_u16());
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let headers = resp
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();
            let body = resp.bytes().map(|b| b.to_vec()).unwrap_or_default();
            crate::state::HttpCompletion {
                correlation_id: id,
                status,
                headers,
                body,
                content_type,
            }
        }
        Err(e) => {
            warn!(error = %e, "service HTTP call failed");
            crate::state::HttpCompletion {
                correlation_id: id,
                status: None,
                headers: HashMap::new(),
                body: Vec::new(),
                content_type: None,
            }
        }
    };
    let _ = completions.send(completion);
}
