//! `RideLink` Driver CLI
//!
//! Polls for ride offers as a driver, responds to them, or follows live
//! locations over the channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use ridelink_core::Room;
use ridelink_core::config::load_config;
use ridelink_core::tracing_init::{Component, init_tracing};
use ridelink_driver::api::HttpOfferApi;
use ridelink_driver::channel::{ChannelClient, ChannelConfig, TransportPreference};
use ridelink_driver::offers::{LoggingOfferEvents, OfferPoller};
use ridelink_driver::retry::RetryPolicy;

#[derive(Parser, Debug)]
#[command(name = "ridelink-driver")]
#[command(version, about = "RideLink driver client - ride offers and live locations")]
struct Cli {
    /// Path to a settings.json file (defaults to the global config path).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Relay base URL. Overrides the configured relay URL.
    #[arg(long, global = true)]
    relay_url: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll for pending ride offers until interrupted.
    Offers {
        #[arg(long, env = "RIDELINK_DRIVER_ID")]
        driver_id: String,
    },
    /// Accept or decline a ride offer.
    Respond {
        #[arg(long, env = "RIDELINK_DRIVER_ID")]
        driver_id: String,
        #[arg(long)]
        offer_id: String,
        #[arg(value_enum)]
        decision: Decision,
    },
    /// Follow live locations until interrupted.
    Track {
        /// Rooms to join: `driver:<id>`, `trip:<id>` or `token:<public token>`.
        #[arg(required = true, value_name = "KIND:KEY")]
        rooms: Vec<Room>,
        #[arg(long, value_enum, default_value_t = Transport::Auto)]
        transport: Transport,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Decision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    Auto,
    Websocket,
    LongPoll,
}

impl From<Transport> for TransportPreference {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Auto => Self::Auto,
            Transport::Websocket => Self::WebSocket,
            Transport::LongPoll => Self::LongPoll,
        }
    }
}

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.relay_url {
        config.driver.relay_url = url;
    }

    init_tracing(Component::Driver, &config.relay.log_level, cli.log_json)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        relay = %config.driver.relay_url,
        "Starting ridelink-driver"
    );

    let settings = config.driver;
    match cli.command {
        Command::Offers { driver_id } => {
            let api = HttpOfferApi::new(&settings.relay_url, &driver_id)?;
            let poller = Arc::new(OfferPoller::new(
                Arc::new(api),
                Arc::new(LoggingOfferEvents),
                RetryPolicy::from_settings(&settings.retry),
                settings.offer_poll_interval().max(MIN_POLL_INTERVAL),
            ));

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn({
                let poller = Arc::clone(&poller);
                async move { poller.run(shutdown_rx).await }
            });
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
                _ = shutdown_tx.closed() => {}
            }
            let _ = shutdown_tx.send(true);
            task.await?;
            if let Some(offer_id) = poller.last_known_offer_id() {
                info!(%offer_id, "Last offer seen");
            }
        }
        Command::Respond {
            driver_id,
            offer_id,
            decision,
        } => {
            let api = HttpOfferApi::new(&settings.relay_url, &driver_id)?;
            let poller = OfferPoller::new(
                Arc::new(api),
                Arc::new(LoggingOfferEvents),
                RetryPolicy::from_settings(&settings.retry),
                settings.offer_poll_interval().max(MIN_POLL_INTERVAL),
            );
            let outcome = match decision {
                Decision::Accept => poller.accept(&offer_id).await.map(|assignment| {
                    info!(trip_id = %assignment.trip_id, "Offer accepted");
                }),
                Decision::Decline => poller.decline(&offer_id).await.map(|()| {
                    info!("Offer declined");
                }),
            };
            if let Err(e) = outcome {
                warn!(error = %e, category = ?e.category(), "{}", e.user_message());
                return Err(e.into());
            }
        }
        Command::Track { rooms, transport } => {
            track(&settings.relay_url, &rooms, transport).await?;
        }
    }
    Ok(())
}

async fn track(relay_url: &str, rooms: &[Room], transport: Transport) -> anyhow::Result<()> {
    let client = ChannelClient::new(ChannelConfig::new(relay_url).with_transport(transport.into()));
    let mut locations = client.on_driver_location();
    let mut rejected = client.on_token_invalid();

    for room in rooms {
        match room {
            Room::Driver(id) => client.join_driver(id)?,
            Room::Trip(id) => client.join_trip(id)?,
            Room::Token(token) => client.join_public_token(token)?,
        }
    }

    loop {
        tokio::select! {
            Some(location) = locations.recv() => {
                let update = &location.update;
                info!(
                    driver_id = %location.driver_id,
                    lat = update.latitude,
                    lng = update.longitude,
                    heading = ?update.heading,
                    speed = ?update.speed,
                    updated_at = %update.updated_at,
                    "Driver location"
                );
            }
            Some(token) = rejected.recv() => {
                warn!(%token, "Tracking link is invalid or expired");
                if client.memberships().is_empty() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
    client.disconnect();
    Ok(())
}
