use serde::{Deserialize, Serialize};

pub mod change;
pub mod grid;
pub mod pathfinding;
pub mod token;

pub use change::{Change, ChangeKind, ChangeRecord};
pub use grid::{GridError, TerrainType, Tile, TileGrid};
pub use pathfinding::{Path, PathFinder};
pub use token::Token;

pub const DEFAULT_TICK_RATE: u32 = 20;
pub const MAX_PACKET_SIZE: usize = 65_536;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Token {
        sequence: u64,
        holder: u32,
        changes: Vec<ChangeRecord>,
    },
    Leave {
        player_id: u32,
    },
}

impl Packet {
    pub fn token(sequence: u64, holder: u32, token: &Token) -> Self {
        Packet::Token {
            sequence,
            holder,
            changes: token.to_records(),
        }
    }
}

pub fn encode_packet(packet: &Packet) -> bincode::Result<Vec<u8>> {
    bincode::serialize(packet)
}

pub fn decode_packet(bytes: &[u8]) -> bincode::Result<Packet> {
    bincode::deserialize(bytes)
}
