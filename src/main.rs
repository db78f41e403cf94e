//! CLI for vizrelay
//!
//! Subcommands:
//! - `serve`: run the relay and its WebSocket server
//! - `client`: subscribe to one topic through a relay and print its frames

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use vizrelay::catalog::{ChannelCatalog, NeedKind};
use vizrelay::client::{InboundFrame, RelayClient};
use vizrelay::config::{Settings, load_config};
use vizrelay::middleware::{InMemoryMiddleware, demo};
use vizrelay::relay::Relay;
use vizrelay::transport::websocket::start_websocket_server;
use vizrelay::utils::logging;

#[derive(Parser)]
#[command(name = "vizrelay")]
enum Command {
    /// Start the relay's WebSocket server
    Serve {
        /// Publish synthetic camera and lidar topics
        #[arg(long)]
        demo: bool,
    },
    /// Connect to a relay and print the frames of one topic
    Client {
        /// Relay URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Need kind, e.g. Camera or Lidar
        #[arg(long)]
        need: NeedKind,
        #[arg(long)]
        topic: String,
        /// Slot id, defaults to the need kind's name
        #[arg(long)]
        slot: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&settings.log.level);

    match cmd {
        Command::Serve { demo } => {
            if let Err(e) = run_server(settings, demo).await {
                error!("Server failed: {}", e);
            }
        }
        Command::Client {
            url,
            need,
            topic,
            slot,
        } => {
            if let Err(e) = run_client(&url, need, &topic, slot).await {
                error!("Client failed: {}", e);
            }
        }
    }
}

async fn run_server(settings: Settings, with_demo: bool) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let middleware = Arc::new(InMemoryMiddleware::new());
    if with_demo {
        demo::advertise(&middleware, &addr);
        tokio::spawn(demo::publish_loop(
            middleware.clone(),
            settings.relay.period(),
        ));
    } else {
        warn!("no middleware adapter configured, serving an empty in-process bus");
    }

    let (relay, events) = Relay::new(
        Arc::new(ChannelCatalog::builtin()),
        middleware,
        &settings.relay,
    );
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();

    tokio::select! {
        result = relay.run(transport_rx, events) => {
            result?;
            error!("Relay stopped unexpectedly.");
        }
        result = start_websocket_server(addr, transport_tx, settings.relay.clone()) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(
    url: &str,
    need: NeedKind,
    topic: &str,
    slot: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = RelayClient::connect(url, Arc::new(ChannelCatalog::builtin())).await?;
    let topics = client.wait_for_topics().await?;
    info!("relay reports {} topics", topics.len());

    let slot = slot.unwrap_or_else(|| need.name().to_string());
    client.resolver().mount(&slot, need)?;
    for candidate in client.resolver().candidates(&slot)? {
        info!("candidate for {need}: {}", candidate.topic);
    }
    let selection = client.resolver().select(&slot, topic)?;
    info!(
        "slot {slot} bound to {} at {}",
        selection.topic, selection.endpoint
    );

    loop {
        tokio::select! {
            frame = client.next_frame() => match frame? {
                InboundFrame::Data(frame) => {
                    let data = frame.data.to_string();
                    println!(
                        "[{}] {} {}",
                        frame.topic,
                        frame.type_name,
                        data.chars().take(120).collect::<String>()
                    );
                }
                InboundFrame::SubscriptionFailed { topic, reason, .. } => {
                    error!("subscription to {topic} failed: {reason}");
                    break;
                }
                other => debug!("{other:?}"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    client.close().await?;
    Ok(())
}
