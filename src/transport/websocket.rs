//! WebSocket transport
//!
//! Accepts browser connections and turns each one into three things:
//! - a `Connected` event carrying a bounded outbound queue for the relay
//! - a writer task draining that queue into the socket, with a write timeout
//! - a reader loop forwarding every text frame as a `Control` event
//!
//! The transport never touches relay state. Whichever side notices the
//! connection is gone first (reader EOF, write failure, write timeout) emits
//! `Disconnected`; a shared flag makes sure it is emitted once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::config::RelaySettings;
use crate::relay::TransportEvent;
use crate::utils::error::RelayError;

/// Bind `addr` and serve connections until the relay stops listening.
pub async fn start_websocket_server(
    addr: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    settings: RelaySettings,
) -> Result<(), RelayError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, events, settings).await
}

/// Serve connections from an already bound listener.
pub async fn serve(
    listener: TcpListener,
    events: mpsc::UnboundedSender<TransportEvent>,
    settings: RelaySettings,
) -> Result<(), RelayError> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        if events.is_closed() {
            info!("relay stopped, closing WebSocket server");
            return Ok(());
        }
        spawn(handle_connection(stream, peer, events.clone(), settings.clone()));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<TransportEvent>,
    settings: RelaySettings,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error from {peer}: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(settings.connection_queue_depth.max(1));
    let conn_id = format!("conn-{}", Uuid::new_v4());

    if events
        .send(TransportEvent::Connected {
            id: conn_id.clone(),
            sender: tx,
        })
        .is_err()
    {
        return;
    }
    debug!("{conn_id} accepted from {peer}");

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let events = events.clone();
        let conn_id = conn_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                let _ = events.send(TransportEvent::Disconnected {
                    id: conn_id.clone(),
                });
            }
        }
    };

    {
        let conn_id = conn_id.clone();
        let do_cleanup = do_cleanup.clone();
        let write_timeout = settings.write_timeout();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                match timeout(write_timeout, ws_sender.send(msg)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("failed to send to {conn_id}: {e}");
                        break;
                    }
                    Err(_) => {
                        warn!("write to {conn_id} timed out after {write_timeout:?}");
                        break;
                    }
                }
            }

            let _ = ws_sender.close().await;
            do_cleanup();
            debug!("send loop closed for {conn_id}");
        });
    }

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let event = TransportEvent::Control {
                    id: conn_id.clone(),
                    text: text.as_str().to_owned(),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(_)) => debug!("ignoring binary frame from {conn_id}"),
            Ok(_) => {}
            Err(e) => {
                debug!("read error on {conn_id}: {e}");
                break;
            }
        }
    }

    do_cleanup();
    info!("{conn_id} closed");
}
