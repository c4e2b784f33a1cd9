//! Client-side connection handling and update scheduling.

use crate::roster::format_roster;
use log::{error, info, warn};
use rand::Rng;
use shared::{ClientMessage, PresenceEntry, ServerMessage};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{interval, Duration};

/// How far one wander step may drift, in degrees.
const WANDER_STEP: f64 = 0.001;

pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    id: String,
    latitude: f64,
    longitude: f64,
    wander: bool,
    update_interval: Duration,
}

impl Client {
    /// Connects, performs the authentication handshake, and returns a
    /// client ready to run. Fails if the server refuses the token.
    pub async fn connect(
        server: &str,
        token: &str,
        latitude: f64,
        longitude: f64,
        update_secs: u64,
        wander: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server).await?;
        let (read_half, writer) = stream.into_split();
        let lines = BufReader::new(read_half).lines();

        let mut client = Client {
            lines,
            writer,
            id: String::new(),
            latitude,
            longitude,
            wander,
            update_interval: Duration::from_secs(update_secs.max(1)),
        };

        client
            .send(&ClientMessage::Connect {
                token: token.to_string(),
            })
            .await?;

        match client.read_message().await? {
            Some(ServerMessage::Connected { id, username }) => {
                info!("Connected as {} ({})", username, id);
                client.id = id;
            }
            Some(ServerMessage::Disconnected { reason }) => {
                return Err(format!("connection refused: {}", reason).into());
            }
            Some(other) => {
                return Err(format!("unexpected handshake reply: {:?}", other).into());
            }
            None => {
                return Err("server closed the connection during handshake".into());
            }
        }

        Ok(client)
    }

    /// Reports a position on the configured cadence and prints every
    /// roster snapshot, until the server goes away or we are displaced.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut update_interval = interval(self.update_interval);

        loop {
            tokio::select! {
                line = self.lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            match serde_json::from_str::<ServerMessage>(&line) {
                                Ok(message) => {
                                    if !self.handle_message(message) {
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("Ignoring unreadable server message: {}", e),
                            }
                        }
                        Ok(None) => {
                            info!("Server closed the connection");
                            return Ok(());
                        }
                        Err(e) => {
                            error!("Error reading from server: {}", e);
                            return Ok(());
                        }
                    }
                }

                _ = update_interval.tick() => {
                    let (latitude, longitude) = self.next_position();
                    let update = ClientMessage::UpdateLocation { latitude, longitude };
                    if let Err(e) = self.send(&update).await {
                        error!("Error sending location update: {}", e);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sends the polite goodbye; dropping the connection works too.
    pub async fn disconnect(&mut self) {
        let _ = self.send(&ClientMessage::Disconnect).await;
    }

    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Locations { users } => {
                self.print_roster(&users);
                true
            }
            ServerMessage::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                false
            }
            ServerMessage::Connected { .. } => true,
        }
    }

    fn print_roster(&self, users: &HashMap<String, PresenceEntry>) {
        println!("{} online:", users.len());
        print!("{}", format_roster(users, &self.id));
    }

    /// The next position to report. In wander mode the client drifts a
    /// little each tick, clamped to valid coordinates.
    fn next_position(&mut self) -> (f64, f64) {
        if self.wander {
            let mut rng = rand::thread_rng();
            self.latitude = (self.latitude + rng.gen_range(-WANDER_STEP..WANDER_STEP))
                .clamp(shared::LATITUDE_MIN, shared::LATITUDE_MAX);
            self.longitude = (self.longitude + rng.gen_range(-WANDER_STEP..WANDER_STEP))
                .clamp(shared::LONGITUDE_MIN, shared::LONGITUDE_MAX);
        }
        (self.latitude, self.longitude)
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<Option<ServerMessage>, Box<dyn std::error::Error>> {
        loop {
            match self.lines.next_line().await? {
                Some(line) => match serde_json::from_str::<ServerMessage>(&line) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => warn!("Ignoring unreadable server message: {}", e),
                },
                None => return Ok(None),
            }
        }
    }
}
