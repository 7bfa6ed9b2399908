use clap::Parser;
use dlr_store::{DlrStore, MongoDlrStore, SqlDlrStore, SqlFields, SqlTarget};
use smsbox::bearerbox::{BearerboxFrame, BearerboxLink};
use smsbox::config::{self, DlrBackendConfig};
use smsbox::http::auth::{CredentialValidator, StaticTableValidator};
use smsbox::http::{build_router, HttpState};
use smsbox::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use urltrans::UrlTransTable;

/// Runs one smsbox instance: connects to the bearerbox, loads the
/// url-translation table, and serves `/sendsms`/`/sendota` over HTTP.
#[derive(Parser, Debug)]
#[command(name = "smsbox")]
struct Cli {
    /// Path to the smsbox configuration file.
    #[arg(default_value = "smsbox.toml")]
    config: PathBuf,

    /// Treat a failure to bind the sendsms HTTP port as non-fatal (spec.md §6).
    #[arg(short = 'H', long)]
    tryhttp: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .init();

    if let Err(e) = run(cli) {
        error!(error = %e, "smsbox exited with an error");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), smsbox::SmsboxError> {
    let cfg = config::load_from_path(&cli.config)?;
    info!(path = %cli.config.display(), "configuration loaded");

    let translations_toml = std::fs::read_to_string(&cfg.translations_path).map_err(|e| {
        smsbox::SmsboxError::Io(format!(
            "failed to read translations file {:?}: {e}",
            cfg.translations_path
        ))
    })?;
    let translations = UrlTransTable::from_toml_str(&translations_toml)?;
    info!(count = translations.entries().len(), "url-translations loaded");

    let dlr_driver: Box<dyn dlr_store::DlrDriver> = match &cfg.dlr {
        DlrBackendConfig::Sqlite { path, max_conns } => {
            let store = SqlDlrStore::open(SqlTarget::File(path.clone()), SqlFields::default(), *max_conns)
                .map_err(|e| smsbox::SmsboxError::Dlr(e.to_string()))?;
            if let Err(e) = store.create_schema_if_missing() {
                warn!(error = %e, "dlr schema creation failed (may already exist)");
            }
            Box::new(store)
        }
        DlrBackendConfig::Mongo { uri, database, collection } => {
            let store = MongoDlrStore::connect(uri, database, collection)
                .map_err(|e| smsbox::SmsboxError::Dlr(e.to_string()))?;
            Box::new(store)
        }
    };
    let dlr = DlrStore::new(dlr_driver);
    info!("dlr back-end ready");

    let bearerbox = BearerboxLink::connect(&cfg.bearerbox.host, cfg.bearerbox.port)
        .map_err(|e| smsbox::SmsboxError::Bearerbox(e.to_string()))?;
    info!(host = %cfg.bearerbox.host, port = cfg.bearerbox.port, "connected to bearerbox");

    let state = Arc::new(AppState::new(
        translations,
        dlr,
        bearerbox,
        cfg.sendsms_http.global_sender.clone(),
        cfg.core.max_octets,
        cfg.ota_configs.clone(),
    ));

    for n in 0..cfg.core.obey_workers.max(1) {
        let worker_state = Arc::clone(&state);
        std::thread::Builder::new()
            .name(format!("obey-{n}"))
            .spawn(move || smsbox::workers::obey::run(worker_state))
            .expect("failed to spawn obey worker");
    }

    let result_state = Arc::clone(&state);
    std::thread::Builder::new()
        .name("http-result".to_string())
        .spawn(move || smsbox::workers::http_result::run(result_state))
        .expect("failed to spawn http result worker");

    let reader_state = Arc::clone(&state);
    std::thread::Builder::new()
        .name("bearerbox-reader".to_string())
        .spawn(move || bearerbox_reader_loop(reader_state))
        .expect("failed to spawn bearerbox reader");

    let deferred_state = Arc::clone(&state);
    std::thread::Builder::new()
        .name("deferred".to_string())
        .spawn(move || smsbox::workers::deferred::run(deferred_state))
        .expect("failed to spawn deferred-send worker");

    let validator: Arc<dyn CredentialValidator> = Arc::new(StaticTableValidator::new(Default::default()));
    let http_state = HttpState {
        app: Arc::clone(&state),
        validator,
    };
    let bind = cfg.sendsms_http.bind.clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start async runtime");
    runtime.block_on(async move {
        match tokio::net::TcpListener::bind(&bind).await {
            Ok(listener) => {
                info!(addr = %bind, "sendsms http listening");
                let router = build_router(http_state).into_make_service_with_connect_info::<SocketAddr>();
                if let Err(e) = axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown_signal())
                    .await
                {
                    error!(error = %e, "sendsms http server error");
                }
            }
            Err(e) if cli.tryhttp => {
                warn!(error = %e, addr = %bind, "failed to bind sendsms http port; continuing without it (--tryhttp)");
                shutdown_signal().await;
            }
            Err(e) => {
                error!(error = %e, addr = %bind, "failed to bind sendsms http port");
                std::process::exit(1);
            }
        }
    });

    state.begin_shutdown();
    info!("smsbox shut down gracefully");
    Ok(())
}

/// Reads frames off the bearerbox link until it closes, routing MOs onto
/// the shared queue and reacting to admin control frames (spec.md §4.9).
fn bearerbox_reader_loop(state: Arc<AppState>) {
    loop {
        match state.bearerbox.read_message() {
            Some(BearerboxFrame::Sms(m)) => {
                if state.mo_queue.0.send(m).is_err() {
                    break;
                }
            }
            Some(BearerboxFrame::Ack(_)) => {
                warn!("unexpected ack frame received on the bearerbox read side; dropping");
            }
            Some(BearerboxFrame::AdminShutdown) => {
                info!("bearerbox requested shutdown");
                state.begin_shutdown();
                break;
            }
            Some(BearerboxFrame::AdminSuspend) => {
                info!("bearerbox requested suspend; obey workers will discard until resumed");
                state.suspend();
            }
            Some(BearerboxFrame::AdminResume) => {
                info!("bearerbox requested resume");
                state.resume();
            }
            None => {
                warn!("bearerbox link closed");
                state.begin_shutdown();
                break;
            }
        }
        if state.is_shutting_down() {
            break;
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
