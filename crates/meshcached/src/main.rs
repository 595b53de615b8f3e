//! meshcached — cooperative LAN proxy cache daemon.
//!
//! One CLI argument: the proxy's listening port. Peers find each other
//! over multicast; point a browser at `<ip>:<port>/<url>`.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use meshcache_core::config::MeshConfig;
use meshcache_services::{new_peer_set, CacheStore};

use meshcached::discovery::{announce, listener};
use meshcached::proxy::{self, ProxyState};

fn parse_args() -> u16 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [port_arg] = args.as_slice() else {
        eprintln!("Usage: meshcached <cache_port>");
        std::process::exit(2);
    };
    match port_arg.parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("Port number must be an integer: {port_arg}");
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port = parse_args();

    // Load config
    if let Err(e) = MeshConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MeshConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MeshConfig::default()
    });
    let config = Arc::new(config);

    let local_ip = local_ip(&config).context("unable to determine host ip address")?;
    let local_endpoint = format!("{local_ip}:{port}");
    tracing::info!(
        endpoint = %local_endpoint,
        "meshcached starting — browse to http://{local_endpoint}/<url>"
    );

    // Shared state
    let peers = new_peer_set(&local_endpoint);
    let store = CacheStore::new(&config.cache.storage_path)
        .context("failed to initialize cache store")?;
    tracing::info!(root = %config.cache.storage_path.display(), "cache store initialized");

    // Bind the proxy port up front — failure here is fatal, before any
    // discovery traffic goes out.
    let proxy_listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("unable to bind proxy port {port}, please try another"))?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let announce_task = tokio::spawn(announce::announce_loop(
        local_endpoint.clone(),
        config.clone(),
        shutdown_tx.subscribe(),
    ));

    let membership_task = tokio::spawn(listener::listener_loop(
        peers.clone(),
        local_endpoint.clone(),
        config.clone(),
    ));

    let proxy_task = tokio::spawn(proxy::serve(
        proxy_listener,
        ProxyState {
            local_endpoint,
            peers,
            store,
            config,
        },
        shutdown_tx.subscribe(),
    ));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = announce_task      => tracing::error!("announce task exited: {:?}", r),
        r = membership_task    => tracing::error!("membership listener exited: {:?}", r),
        r = proxy_task         => tracing::error!("proxy server exited: {:?}", r),
    }

    Ok(())
}

/// This host's outbound IP: the source address the OS picks for a probe
/// socket aimed at the multicast group. Nothing is sent.
fn local_ip(config: &MeshConfig) -> Result<IpAddr> {
    let group: Ipv4Addr = config
        .network
        .multicast_group
        .parse()
        .with_context(|| format!("invalid multicast group: {}", config.network.multicast_group))?;
    let probe = std::net::UdpSocket::bind("0.0.0.0:0").context("probe socket")?;
    probe
        .connect((group, config.network.multicast_port))
        .context("probe connect")?;
    Ok(probe.local_addr().context("probe local_addr")?.ip())
}
