//! `/cgi-bin/sendota` ingress (spec.md §4.8/§6): ships one fixed WAP-OTA
//! provisioning payload, selected by the `otaid` query parameter, as an
//! 8-bit UDH-bearing MT message.

use super::auth::AuthError;
use super::{ConnectInfoAddr, HttpState};
use crate::workers::send_message;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use sms_proto::{ota::build_ota_bytecode, Message, SmsType};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize, Default)]
pub struct SendOtaParams {
    pub username: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub pass: Option<String>,
    pub to: Option<String>,
    pub otaid: Option<String>,
}

pub async fn sendota_get(
    State(state): State<HttpState>,
    Query(params): Query<SendOtaParams>,
    ConnectInfoAddr(addr): ConnectInfoAddr,
) -> impl IntoResponse {
    process(&state, params, addr.ip())
}

pub async fn sendota_post(
    State(state): State<HttpState>,
    Query(params): Query<SendOtaParams>,
    ConnectInfoAddr(addr): ConnectInfoAddr,
) -> impl IntoResponse {
    process(&state, params, addr.ip())
}

fn process(state: &HttpState, params: SendOtaParams, client_ip: std::net::IpAddr) -> (StatusCode, String) {
    let username = params.username.or(params.user);
    let password = params.password.or(params.pass);
    let (username, password) = match (username, password) {
        (Some(u), Some(p)) => (u, p),
        _ => return (StatusCode::FORBIDDEN, "Authorization failed".to_string()),
    };

    let entries = state.app.translations.entries();
    let t = match super::auth::authenticate(entries, state.validator.as_ref(), &username, &password, client_ip) {
        Ok(t) => t,
        Err(AuthError::UnknownUser | AuthError::BadPassword) => {
            return (StatusCode::FORBIDDEN, "Authorization failed".to_string())
        }
        Err(AuthError::IpDenied) => return (StatusCode::FORBIDDEN, "Access denied".to_string()),
    };

    let to = match &params.to {
        Some(to) if !to.is_empty() => to.clone(),
        _ => return (StatusCode::BAD_REQUEST, "Missing 'to' field".to_string()),
    };

    let otaid = params.otaid.clone().unwrap_or_default();
    let Some(ota) = state.app.find_ota_config(&otaid) else {
        return (StatusCode::BAD_REQUEST, format!("Unknown otaid {otaid:?}"));
    };

    let sender = t
        .faked_sender
        .clone()
        .or_else(|| state.app.global_sender.clone());
    let Some(sender) = sender else {
        return (StatusCode::BAD_REQUEST, "Sender missing".to_string());
    };

    let bytecode = build_ota_bytecode(&ota.profile);
    let udh_len = bytecode[0] as usize + 1;
    let (udh, body) = bytecode.split_at(udh_len);

    let mut msg = Message::new(SmsType::MtPush, sender, to);
    msg.smsc_id = t.forced_smsc.clone().or(t.default_smsc.clone());
    msg.service = Some(t.name.clone());
    msg.msgdata = body.to_vec();
    msg.flag_8bit = true;
    msg.flag_udh = true;
    msg.udhdata = Some(udh.to_vec());
    msg.time = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);

    send_message(&state.app, Some(t), msg);

    (StatusCode::ACCEPTED, "Sent.".to_string())
}
