//! VEN binary: registers with the VTN and polls for events until stopped.

use std::sync::Arc;

use openadr_contract::{ContractCodec, ContractSchema};
use openadr_ven::{
    build_client, load_config, HttpLedger, HttpLookupResolver, HttpVtn, Ports, VenClient,
    VenSettings,
};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("OPENADR_VEN_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("ven.toml"));

    let config = load_config(selected_config_path)
        .expect("failed to load configuration, the VEN cannot start without ven_id and program_id");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let schema = match &config.contract.artifact_path {
        Some(path) => ContractSchema::from_artifact_file(path)
            .expect("failed to load contract artifact, check contract.artifact_path"),
        None => ContractSchema::default(),
    };

    let http = build_client(config.http.timeout()).expect("failed to build HTTP client");
    let retry = config.http.retry_policy();
    let endpoints = &config.endpoints;
    let ports = Ports::new(
        Arc::new(HttpVtn::new(http.clone(), endpoints.vtn_url.as_str(), retry)),
        Arc::new(HttpLookupResolver::new(http.clone(), &endpoints.overlay_url, retry)),
        Arc::new(HttpLedger::new(
            http,
            endpoints.node_url.as_str(),
            endpoints.wallet_url.as_str(),
            retry,
        )),
    );

    let client = VenClient::new(
        VenSettings::from_config(&config),
        ContractCodec::new(schema),
        ports,
    );

    if let Err(e) = client.initialize().await {
        tracing::error!("VEN failed to start: {}", e);
        std::process::exit(1);
    }

    shutdown_signal().await;
    client.shutdown().await;

    let pending = client.pending_reports();
    if pending > 0 {
        tracing::warn!(pending, "exiting with ledger updates still pending");
    }
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        () = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}
