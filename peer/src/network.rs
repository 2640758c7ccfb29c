//! UDP token ring passing the authority token from peer to peer

use crate::config::PeerConfig;
use crate::error::PeerResult;
use crate::handoff::HostHandoff;
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, ChangeRecord, Packet, Token, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Messages sent from the receiver task to the ring loop
#[derive(Debug)]
pub enum RingMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Shutdown,
}

/// Ring position and timing of one peer
#[derive(Debug, Clone)]
pub struct RingSettings {
    pub player_id: u32,
    pub next: SocketAddr,
    pub hold: Duration,
    pub token_timeout: Duration,
    /// The initiator injects the first token and re-sends it when lost
    pub initiator: bool,
}

impl From<&PeerConfig> for RingSettings {
    fn from(config: &PeerConfig) -> Self {
        Self {
            player_id: config.player_id,
            next: config.next,
            hold: config.hold,
            token_timeout: config.token_timeout,
            initiator: config.initiator,
        }
    }
}

pub struct TokenRing {
    socket: Arc<UdpSocket>,
    settings: RingSettings,
    handoff: HostHandoff,
    last_seen: Instant,
    last_sent: Option<(u64, Token)>,
    /// Highest token sequence handed off so far
    last_sequence: Option<u64>,
    tokens_handled: u64,

    ring_tx: mpsc::UnboundedSender<RingMessage>,
    ring_rx: mpsc::UnboundedReceiver<RingMessage>,
}

impl TokenRing {
    pub async fn bind(config: &PeerConfig, handoff: HostHandoff) -> PeerResult<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        Ok(Self::with_socket(socket, RingSettings::from(config), handoff))
    }

    pub fn with_socket(socket: UdpSocket, settings: RingSettings, handoff: HostHandoff) -> Self {
        let (ring_tx, ring_rx) = mpsc::unbounded_channel();
        Self {
            socket: Arc::new(socket),
            settings,
            handoff,
            last_seen: Instant::now(),
            last_sent: None,
            last_sequence: None,
            tokens_handled: 0,
            ring_tx,
            ring_rx,
        }
    }

    pub fn local_addr(&self) -> PeerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that can stop the ring loop from another task
    pub fn control(&self) -> mpsc::UnboundedSender<RingMessage> {
        self.ring_tx.clone()
    }

    pub fn tokens_handled(&self) -> u64 {
        self.tokens_handled
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let ring_tx = self.ring_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            let message = RingMessage::PacketReceived { packet, addr };
                            if let Err(e) = ring_tx.send(message) {
                                error!("Failed to send packet to ring loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn send_packet(&self, packet: &Packet) -> PeerResult<()> {
        let data = encode_packet(packet)?;
        self.socket.send_to(&data, self.settings.next).await?;
        Ok(())
    }

    /// Runs the hand-off for a received token and passes the result on
    async fn handle_token(&mut self, sequence: u64, holder: u32, records: &[ChangeRecord]) {
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                warn!(
                    "Dropping stale token #{} from player {}, already handled #{}",
                    sequence, holder, last
                );
                return;
            }
        }
        self.last_sequence = Some(sequence);
        self.last_seen = Instant::now();
        debug!(
            "Token #{} from player {} with {} changes",
            sequence,
            holder,
            records.len()
        );

        let incoming = Token::from_records(records);
        let outgoing = self.handoff.on_token_received(&incoming).await;
        self.tokens_handled += 1;

        if !self.settings.hold.is_zero() {
            tokio::time::sleep(self.settings.hold).await;
        }

        let next_sequence = sequence + 1;
        self.emit(next_sequence, &outgoing).await;
        self.last_sent = Some((next_sequence, outgoing));
    }

    async fn emit(&self, sequence: u64, token: &Token) {
        let packet = Packet::token(sequence, self.settings.player_id, token);
        if let Err(e) = self.send_packet(&packet).await {
            error!(
                "Failed to pass token #{} to {}: {}",
                sequence, self.settings.next, e
            );
        }
    }

    /// Re-sends the last emitted token when the ring has gone quiet
    async fn check_token_timeout(&mut self) {
        if self.last_seen.elapsed() <= self.settings.token_timeout {
            return;
        }

        warn!(
            "No token seen for {:.1}s",
            self.last_seen.elapsed().as_secs_f32()
        );
        self.last_seen = Instant::now();

        if !self.settings.initiator {
            return;
        }
        if let Some((sequence, token)) = &self.last_sent {
            info!("Re-sending token #{} to {}", sequence, self.settings.next);
            self.emit(*sequence, token).await;
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Token {
                sequence,
                holder,
                changes,
            } => {
                self.handle_token(sequence, holder, &changes).await;
            }
            Packet::Leave { player_id } => {
                info!("Player {} at {} left the ring", player_id, addr);
            }
        }
    }

    /// Tells the next peer that this one is leaving
    pub async fn leave(&self) -> PeerResult<()> {
        self.send_packet(&Packet::Leave {
            player_id: self.settings.player_id,
        })
        .await
    }

    /// Main ring loop
    pub async fn run(&mut self) -> PeerResult<()> {
        self.spawn_network_receiver();
        info!(
            "Player {} listening on {}, passing token to {}",
            self.settings.player_id,
            self.local_addr()?,
            self.settings.next
        );

        if self.settings.initiator {
            info!("Injecting initial token");
            self.handle_token(0, self.settings.player_id, &[]).await;
        }

        let mut watchdog = interval(self.settings.token_timeout.max(Duration::from_millis(10)));

        loop {
            tokio::select! {
                message = self.ring_rx.recv() => {
                    match message {
                        Some(RingMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(RingMessage::Shutdown) | None => {
                            info!("Token ring shutting down");
                            break;
                        }
                    }
                }

                _ = watchdog.tick() => {
                    self.check_token_timeout().await;
                }
            }
        }

        Ok(())
    }
}
