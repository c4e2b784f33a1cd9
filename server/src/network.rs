//! TCP listener wiring the presence loop and per-connection tasks together.

use crate::auth::TokenVerifier;
use crate::connection;
use crate::geocode::Geocoder;
use crate::presence::{run_presence_loop, PresenceCommand};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Accepts connections and hands each one to its own lifecycle task, all
/// of them feeding the single presence loop.
pub struct Server {
    listener: TcpListener,
    verifier: Arc<TokenVerifier>,
    geocoder: Arc<Geocoder>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        verifier: TokenVerifier,
        geocoder: Geocoder,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            verifier: Arc::new(verifier),
            geocoder: Arc::new(geocoder),
        })
    }

    /// The address actually bound, for callers that asked for port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the presence loop, then accepts connections until the
    /// process exits. Each connection gets a serial so a close signal from
    /// a displaced connection can be told apart from its successor's.
    pub async fn run(self) -> std::io::Result<()> {
        let (commands, command_rx) = mpsc::unbounded_channel::<PresenceCommand>();
        tokio::spawn(run_presence_loop(command_rx));

        let serials = AtomicU64::new(1);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let serial = serials.fetch_add(1, Ordering::Relaxed);
                    let verifier = Arc::clone(&self.verifier);
                    let geocoder = Arc::clone(&self.geocoder);
                    let commands = commands.clone();

                    tokio::spawn(async move {
                        connection::handle_connection(
                            stream, addr, serial, verifier, geocoder, commands,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
