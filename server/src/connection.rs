//! Per-connection lifecycle: admission, update handling, teardown.
//!
//! Each accepted socket gets one task running [`handle_connection`]. The
//! task admits the connection (or refuses it without touching any shared
//! state), then turns inbound lines into presence commands until the peer
//! goes away. A separate writer task drains the connection's outbound
//! queue, so broadcasting to a slow client never blocks anyone else.

use crate::auth::{Identity, TokenVerifier};
use crate::geocode::Geocoder;
use crate::presence::PresenceCommand;
use log::{debug, info, warn};
use shared::{valid_coordinates, ClientMessage, ServerMessage, HANDSHAKE_TIMEOUT_SECS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Runs one connection from accept to teardown.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    serial: u64,
    verifier: Arc<TokenVerifier>,
    geocoder: Arc<Geocoder>,
    commands: mpsc::UnboundedSender<PresenceCommand>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Admission gate: the first line must be a handshake whose token
    // verifies. Anything else refuses the connection before it reaches
    // the roster.
    let identity = match admit(&mut lines, &verifier).await {
        Ok(identity) => identity,
        Err(reason) => {
            warn!("Refusing connection from {}: {}", addr, reason);
            let refusal = ServerMessage::Disconnected { reason };
            let _ = write_line(&mut write_half, &refusal).await;
            return;
        }
    };

    info!(
        "Client {} connected from {} as {}",
        identity.id, addr, identity.username
    );

    let (sender, mut outbound) = mpsc::unbounded_channel::<ServerMessage>();

    // Confirm admission before the join broadcast can reach the queue.
    let _ = sender.send(ServerMessage::Connected {
        id: identity.id.clone(),
        username: identity.username.clone(),
    });

    if commands
        .send(PresenceCommand::Join {
            id: identity.id.clone(),
            username: identity.username.clone(),
            serial,
            sender,
        })
        .is_err()
    {
        // The presence loop is gone; the server is shutting down.
        return;
    }

    // Writer task: drains this connection's outbound queue. Exits when the
    // socket fails or when the presence loop drops our sender (displaced
    // by a newer connection with the same identity).
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if write_line(&mut write_half, &message).await.is_err() {
                break;
            }
        }
    });

    let mut enrichment: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(&line, &identity.id, &geocoder, &commands, &mut enrichment) {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Read error from {}: {}", identity.id, e);
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    // Teardown: any in-flight lookup dies with the connection, and the
    // roster entry goes away exactly once (the serial protects a newer
    // connection that displaced this one).
    if let Some(task) = enrichment.take() {
        task.abort();
    }
    let _ = commands.send(PresenceCommand::Leave {
        id: identity.id.clone(),
        serial,
    });
    writer.abort();

    info!("Client {} disconnected", identity.id);
}

/// Waits for the handshake line and verifies its token. Every failure is
/// reduced to a refusal reason for the peer; details go to the log only.
async fn admit(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    verifier: &TokenVerifier,
) -> Result<Identity, String> {
    let handshake = Duration::from_secs(HANDSHAKE_TIMEOUT_SECS);

    let line = match timeout(handshake, lines.next_line()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Err("connection closed before handshake".to_string()),
        Ok(Err(e)) => return Err(format!("handshake read failed: {}", e)),
        Err(_) => return Err("handshake timed out".to_string()),
    };

    let token = match serde_json::from_str::<ClientMessage>(&line) {
        Ok(ClientMessage::Connect { token }) => token,
        _ => return Err("authentication required".to_string()),
    };

    match verifier.verify(&token) {
        Ok(identity) => Ok(identity),
        Err(e) => {
            debug!("Token verification failed: {}", e);
            Err("authentication failed".to_string())
        }
    }
}

/// Handles one inbound line from an admitted connection. Returns false
/// when the connection should close.
fn handle_line(
    line: &str,
    id: &str,
    geocoder: &Arc<Geocoder>,
    commands: &mpsc::UnboundedSender<PresenceCommand>,
    enrichment: &mut Option<JoinHandle<()>>,
) -> bool {
    match serde_json::from_str::<ClientMessage>(line) {
        Ok(ClientMessage::UpdateLocation {
            latitude,
            longitude,
        }) => {
            if !valid_coordinates(latitude, longitude) {
                warn!(
                    "Dropping out-of-range location update from {}: ({}, {})",
                    id, latitude, longitude
                );
                return true;
            }

            // A newer report makes any pending lookup for the previous
            // coordinates irrelevant.
            if let Some(task) = enrichment.take() {
                task.abort();
            }

            if commands
                .send(PresenceCommand::UpdateLocation {
                    id: id.to_string(),
                    latitude,
                    longitude,
                })
                .is_err()
            {
                return false;
            }

            if geocoder.enabled() {
                let geocoder = Arc::clone(geocoder);
                let commands = commands.clone();
                let id = id.to_string();
                *enrichment = Some(tokio::spawn(async move {
                    if let Some(address) = geocoder.reverse(latitude, longitude).await {
                        let _ = commands.send(PresenceCommand::SetAddress {
                            id,
                            latitude,
                            longitude,
                            address,
                        });
                    }
                }));
            }

            true
        }

        Ok(ClientMessage::Disconnect) => false,

        Ok(ClientMessage::Connect { .. }) => {
            warn!("Ignoring repeated handshake from {}", id);
            true
        }

        Err(e) => {
            warn!("Dropping malformed message from {}: {}", id, e);
            true
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, message: &ServerMessage) -> std::io::Result<()> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}
