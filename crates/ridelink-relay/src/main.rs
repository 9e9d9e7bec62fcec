//! `RideLink` Relay Server
//!
//! Location channel hub and ride-offer API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use ridelink_core::config::load_config;
use ridelink_core::tracing_init::{Component, init_tracing};
use ridelink_crypto::FieldCipher;
use ridelink_relay::hub::RoomHub;
use ridelink_relay::server::{self, AppState};
use ridelink_relay::store::{MemoryTripStore, TripStore};
use ridelink_relay::sweep::{spawn_offer_sweep, spawn_poll_reaper};

const DEV_FIELD_SECRET: &str = "dev-field-secret-change-me";

#[derive(Parser, Debug)]
#[command(name = "ridelink-relay")]
#[command(version, about = "RideLink relay - live location hub and ride-offer API")]
struct Args {
    /// Path to a settings.json file (defaults to the global config path).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on. Overrides the configured listen address.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Secret used to derive the field-encryption key.
    #[arg(long, env = "RIDELINK_FIELD_SECRET", default_value = DEV_FIELD_SECRET, hide_env_values = true)]
    field_secret: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_tracing(Component::Relay, &config.relay.log_level, args.log_json)?;

    let addr: SocketAddr = match args.addr {
        Some(addr) => addr,
        None => config.relay.listen_addr.parse()?,
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        "Starting ridelink-relay"
    );

    if args.field_secret == DEV_FIELD_SECRET {
        warn!("RIDELINK_FIELD_SECRET not set; using the development secret");
    }
    let cipher = FieldCipher::from_secret(&args.field_secret)?;

    let hub = Arc::new(RoomHub::new(config.relay.outbound_capacity));
    let store: Arc<dyn TripStore> = Arc::new(MemoryTripStore::new(cipher));
    let state = AppState::new(hub.clone(), store.clone(), config.relay.long_poll_window());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = spawn_offer_sweep(
        store,
        config.relay.offer_sweep_interval(),
        shutdown_rx.clone(),
    );
    let reaper = spawn_poll_reaper(
        state.polls.clone(),
        config.relay.poll_idle_timeout() / 2,
        config.relay.poll_idle_timeout(),
        shutdown_rx,
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Relay listening");

    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(sweep, reaper);
    hub.log_stats();
    info!("Relay stopped");
    Ok(())
}
