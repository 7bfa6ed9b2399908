//! `/sendsms` and `/cgi-bin/sendsms` ingress (spec.md §4.8, §6).

use super::auth::{authenticate, AuthError};
use super::{ConnectInfoAddr, HttpState};
use crate::workers::send_message;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use sms_proto::{decode_udh_hex, Message, MessageError, SmsType};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize, Default)]
pub struct SendSmsParams {
    pub username: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub pass: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub text: Option<String>,
    pub udh: Option<String>,
    pub smsc: Option<String>,
    pub flash: Option<u8>,
    pub mwi: Option<u8>,
    pub mwimessages: Option<u8>,
    pub unicode: Option<u8>,
    pub validity: Option<u32>,
    pub deferred: Option<u32>,
    pub charset: Option<String>,
    pub dlrid: Option<String>,
    pub dlrmask: Option<u32>,
}

pub async fn sendsms_get(
    State(state): State<HttpState>,
    Query(params): Query<SendSmsParams>,
    headers: HeaderMap,
    ConnectInfoAddr(addr): ConnectInfoAddr,
) -> impl IntoResponse {
    process(&state, params, None, &headers, addr.ip())
}

pub async fn sendsms_post(
    State(state): State<HttpState>,
    Query(params): Query<SendSmsParams>,
    headers: HeaderMap,
    ConnectInfoAddr(addr): ConnectInfoAddr,
    body: Bytes,
) -> impl IntoResponse {
    if body.is_empty() {
        return process(&state, params, None, &headers, addr.ip());
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or(s).trim().to_ascii_lowercase());
    match content_type.as_deref() {
        Some("text/plain") | None => {
            let text = String::from_utf8_lossy(&body).to_string();
            process(&state, SendSmsParams { text: Some(text), ..params }, None, &headers, addr.ip())
        }
        Some("application/octet-stream") => {
            process(&state, params, Some(body.to_vec()), &headers, addr.ip())
        }
        Some(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported Content-Type".to_string()),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn process(
    state: &HttpState,
    params: SendSmsParams,
    binary_body: Option<Vec<u8>>,
    headers: &HeaderMap,
    client_ip: std::net::IpAddr,
) -> (StatusCode, String) {
    let username = params
        .username
        .clone()
        .or(params.user.clone())
        .or_else(|| header_str(headers, "X-Kannel-Username"));
    let password = params
        .password
        .clone()
        .or(params.pass.clone())
        .or_else(|| header_str(headers, "X-Kannel-Password"));

    let (username, password) = match (username, password) {
        (Some(u), Some(p)) => (u, p),
        _ => return (StatusCode::FORBIDDEN, "Authorization failed".to_string()),
    };

    let entries = state.app.translations.entries();
    let t = match authenticate(entries, state.validator.as_ref(), &username, &password, client_ip) {
        Ok(t) => t,
        Err(AuthError::UnknownUser | AuthError::BadPassword) => {
            return (StatusCode::FORBIDDEN, "Authorization failed".to_string())
        }
        Err(AuthError::IpDenied) => return (StatusCode::FORBIDDEN, "Access denied".to_string()),
    };

    let to = match &params.to {
        Some(to) if !to.is_empty() => to,
        _ => return (StatusCode::BAD_REQUEST, "Missing 'to' field".to_string()),
    };
    let allowed_chars = &state.app.translations.sendsms_number_chars;
    if !to.chars().all(|c| allowed_chars.contains(c)) {
        return (StatusCode::BAD_REQUEST, "Garbage 'to' field".to_string());
    }
    let trans = &state.app.translations;
    if list_blocks(to, &trans.white_list, &trans.black_list) || list_blocks(to, &t.white_list, &t.black_list) {
        return (StatusCode::FORBIDDEN, "Number rejected by white/black list".to_string());
    }

    if let Some(f) = params.flash {
        if f > 1 {
            return (StatusCode::BAD_REQUEST, "Flash field misformed".to_string());
        }
    }
    if let Some(m) = params.mwi {
        if m > 8 {
            return (StatusCode::BAD_REQUEST, "MWI field misformed".to_string());
        }
    }
    if params.flash == Some(1) && params.mwi.is_some_and(|m| m != 0) {
        return (StatusCode::BAD_REQUEST, "Flash and MWI are mutually exclusive".to_string());
    }
    if let Some(u) = params.unicode {
        if u > 1 {
            return (StatusCode::BAD_REQUEST, "Unicode field misformed".to_string());
        }
    }

    let udh = match &params.udh {
        Some(hex) => match decode_udh_hex(hex) {
            Ok(bytes) => Some(bytes),
            Err(()) => return (StatusCode::BAD_REQUEST, "Garbage 'udh' field".to_string()),
        },
        None => None,
    };

    let sender = t
        .faked_sender
        .clone()
        .or_else(|| params.from.clone().filter(|f| !f.is_empty()))
        .or_else(|| state.app.global_sender.clone());
    let Some(sender) = sender else {
        return (StatusCode::BAD_REQUEST, "Sender missing".to_string());
    };

    let smsc_id = t.forced_smsc.clone().or(params.smsc.clone()).or(t.default_smsc.clone());

    let binary = (udh.is_some() && params.charset.is_none()) || params.unicode == Some(1);

    let mut msg = Message::new(SmsType::MtPush, sender, to.clone());
    msg.smsc_id = smsc_id;
    msg.service = Some(t.name.clone());
    msg.msgdata = binary_body.unwrap_or_else(|| params.text.clone().unwrap_or_default().into_bytes());
    if let Some(udh) = udh {
        msg.flag_udh = true;
        msg.udhdata = Some(udh);
    }
    msg.flag_8bit = binary || msg.flag_8bit;
    msg.flag_flash = params.flash == Some(1);
    msg.flag_mwi = params.mwi.unwrap_or(0);
    msg.mwimessages = params.mwimessages.unwrap_or(0);
    msg.flag_unicode = params.unicode == Some(1);
    if msg.flag_unicode {
        msg.flag_8bit = true;
    }
    msg.validity = params.validity.unwrap_or(0);
    msg.deferred = params.deferred.unwrap_or(0);
    msg.dlr_id = params.dlrid.clone();
    msg.dlr_mask = params.dlrmask.unwrap_or(0);
    msg.time = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);

    if let Err(e) = msg.validate() {
        return (StatusCode::BAD_REQUEST, format_validation_error(e));
    }

    record_dlr_if_requested(state, &msg);
    send_message(&state.app, Some(t), msg);

    (StatusCode::ACCEPTED, "Sent.".to_string())
}

fn list_blocks(to: &str, white_list: &[String], black_list: &[String]) -> bool {
    if black_list.iter().any(|p| to == p) {
        return true;
    }
    if !white_list.is_empty() && !white_list.iter().any(|p| to == p) {
        return true;
    }
    false
}

fn format_validation_error(e: MessageError) -> String {
    match e {
        MessageError::FlashMwiConflict => "Flash and MWI are mutually exclusive".to_string(),
        MessageError::UdhFlagMismatch | MessageError::UdhLengthMismatch { .. } => {
            "Garbage 'udh' field".to_string()
        }
        MessageError::UnicodeRequires8Bit => "Unicode field requires 8-bit".to_string(),
        MessageError::MwiOutOfRange(_) => "MWI field misformed".to_string(),
    }
}

fn record_dlr_if_requested(state: &HttpState, msg: &Message) {
    if msg.dlr_mask == 0 {
        return;
    }
    let Some(smsc_id) = &msg.smsc_id else { return };
    state.app.dlr.add(dlr_store::DlrEntry {
        smsc: smsc_id.clone(),
        timestamp: msg.time.to_string(),
        source: msg.sender.clone(),
        destination: msg.receiver.clone(),
        service: msg.service.clone().unwrap_or_default(),
        url: String::new(),
        mask: msg.dlr_mask,
        boxc_id: msg.boxc_id.clone().unwrap_or_default(),
        status: 0,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_blocks_rejects_blacklisted_numbers() {
        assert!(list_blocks("+1", &[], &["+1".to_string()]));
    }

    #[test]
    fn list_blocks_rejects_numbers_absent_from_nonempty_whitelist() {
        assert!(list_blocks("+1", &["+2".to_string()], &[]));
        assert!(!list_blocks("+2", &["+2".to_string()], &[]));
    }
}
