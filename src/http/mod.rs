pub mod auth;
pub mod sendota;
pub mod sendsms;

use crate::state::AppState;
use auth::CredentialValidator;
use axum::extract::connect_info::ConnectInfo;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Combines the shared application state with the pluggable PAM-delegate
/// validator (spec.md §4.8's `pam` translations).
#[derive(Clone)]
pub struct HttpState {
    pub app: Arc<AppState>,
    pub validator: Arc<dyn CredentialValidator>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/cgi-bin/sendsms", get(sendsms::sendsms_get).post(sendsms::sendsms_post))
        .route("/sendsms", get(sendsms::sendsms_get).post(sendsms::sendsms_post))
        .route("/cgi-bin/sendota", get(sendota::sendota_get).post(sendota::sendota_post))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK"
}

pub type ConnectInfoAddr = ConnectInfo<SocketAddr>;
