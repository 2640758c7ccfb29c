//! Validated peer configuration and deterministic world setup
//!
//! Every peer in a ring must start from the same map and the same creatures,
//! so both are derived purely from the configuration.

use crate::error::PeerResult;
use crate::world::{Creature, World};
use shared::{TerrainType, TileGrid};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Map used when no map file is given
pub const DEFAULT_MAP: &str = "
................
....##..........
....##....~~~...
..........~~~...
..ff............
..ff......##....
..........##....
................
";

/// Creature ids are `player_id * CREATURE_ID_STRIDE + index + 1`
pub const CREATURE_ID_STRIDE: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick rate must be greater than zero")]
    ZeroTickRate,

    #[error("player {0} is not part of the player list")]
    UnknownPlayer(u32),

    #[error("player list is empty")]
    NoPlayers,

    #[error("bind address {0} is also the next peer address")]
    SelfLoop(SocketAddr),

    #[error("at most {max} creatures per player, {requested} requested")]
    TooManyCreatures { max: u32, requested: u32 },

    #[error("player id {0} is too large to derive creature ids from")]
    PlayerIdTooLarge(u32),

    #[error("map has room for {available} creatures, {requested} requested")]
    MapTooSmall { available: usize, requested: usize },
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub bind: SocketAddr,
    pub next: SocketAddr,
    pub player_id: u32,
    pub players: Vec<u32>,
    pub creatures_per_player: u32,
    pub map: Option<PathBuf>,
    pub tick_rate: u32,
    /// How long a peer holds the token before passing it on
    pub hold: Duration,
    pub token_timeout: Duration,
    pub history_window: u64,
    pub initiator: bool,
    pub autopilot: bool,
    pub seed: u64,
}

impl PeerConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.players.is_empty() {
            return Err(ConfigError::NoPlayers);
        }
        if !self.players.contains(&self.player_id) {
            return Err(ConfigError::UnknownPlayer(self.player_id));
        }
        if self.bind == self.next {
            return Err(ConfigError::SelfLoop(self.bind));
        }
        check_creature_ids(&self.players, self.creatures_per_player)?;
        Ok(self)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate))
    }

    /// Loads the configured map file, or the built-in map
    pub fn load_grid(&self) -> PeerResult<TileGrid> {
        let text = match &self.map {
            Some(path) => std::fs::read_to_string(path)?,
            None => DEFAULT_MAP.to_string(),
        };
        Ok(TileGrid::parse(&text)?)
    }

    /// Builds the starting world shared by every peer
    pub fn build_world(&self, grid: TileGrid) -> Result<World, ConfigError> {
        spawn_world(grid, self.player_id, &self.players, self.creatures_per_player)
    }
}

/// Rejects layouts whose creature ids would collide or overflow
fn check_creature_ids(players: &[u32], creatures_per_player: u32) -> Result<(), ConfigError> {
    if creatures_per_player >= CREATURE_ID_STRIDE {
        return Err(ConfigError::TooManyCreatures {
            max: CREATURE_ID_STRIDE - 1,
            requested: creatures_per_player,
        });
    }
    let max_player = (u32::MAX - CREATURE_ID_STRIDE) / CREATURE_ID_STRIDE;
    if let Some(&player) = players.iter().find(|&&p| p > max_player) {
        return Err(ConfigError::PlayerIdTooLarge(player));
    }
    Ok(())
}

/// Places creatures on walkable tiles in scan order, player by player.
///
/// Creature ids are derived from the player id and the spawn index, so they
/// are identical on every peer.
pub fn spawn_world(
    grid: TileGrid,
    local_player: u32,
    players: &[u32],
    creatures_per_player: u32,
) -> Result<World, ConfigError> {
    check_creature_ids(players, creatures_per_player)?;

    let mut players = players.to_vec();
    players.sort_unstable();
    players.dedup();

    let spawn_points: Vec<(u32, u32)> = grid
        .tiles()
        .filter(|t| t.terrain == TerrainType::Plain)
        .map(|t| t.position())
        .collect();

    let requested = players.len() * creatures_per_player as usize;
    if requested > spawn_points.len() {
        return Err(ConfigError::MapTooSmall {
            available: spawn_points.len(),
            requested,
        });
    }

    // Spread players over the map instead of packing them in one corner
    let stride = (spawn_points.len() / requested.max(1)).max(1);
    let mut world = World::new(grid, local_player);
    let mut slot = 0;
    for player in players {
        for index in 0..creatures_per_player {
            let (x, y) = spawn_points[(slot * stride) % spawn_points.len()];
            let id = player * CREATURE_ID_STRIDE + index + 1;
            world.spawn_creature(Creature::new(id, player, x, y));
            slot += 1;
        }
    }

    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PeerConfig {
        PeerConfig {
            bind: "127.0.0.1:9000".parse().unwrap(),
            next: "127.0.0.1:9001".parse().unwrap(),
            player_id: 1,
            players: vec![1, 2],
            creatures_per_player: 2,
            map: None,
            tick_rate: 20,
            hold: Duration::from_millis(5),
            token_timeout: Duration::from_secs(2),
            history_window: 0,
            initiator: false,
            autopilot: false,
            seed: 7,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = config().validate().unwrap();
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_configs() {
        let mut zero = config();
        zero.tick_rate = 0;
        assert_eq!(zero.validate().unwrap_err(), ConfigError::ZeroTickRate);

        let mut stranger = config();
        stranger.player_id = 3;
        assert_eq!(stranger.validate().unwrap_err(), ConfigError::UnknownPlayer(3));

        let mut alone = config();
        alone.players.clear();
        assert_eq!(alone.validate().unwrap_err(), ConfigError::NoPlayers);

        let mut looped = config();
        looped.next = looped.bind;
        assert!(matches!(looped.validate(), Err(ConfigError::SelfLoop(_))));
    }

    #[test]
    fn test_default_map_loads() {
        let grid = config().load_grid().unwrap();
        assert_eq!(grid.width(), 16);
        assert_eq!(grid.height(), 8);
    }

    #[test]
    fn test_world_setup_is_identical_across_peers() {
        let one = config();
        let mut two = config();
        two.player_id = 2;
        two.players = vec![2, 1];

        let a = one.build_world(one.load_grid().unwrap()).unwrap();
        let b = two.build_world(two.load_grid().unwrap()).unwrap();

        let layout = |w: &World| -> Vec<(u32, u32, (u32, u32))> {
            w.creatures().map(|c| (c.id, c.player_id, c.position())).collect()
        };
        assert_eq!(layout(&a), layout(&b));
        assert_eq!(a.creatures().count(), 4);
        assert_eq!(a.own_creatures().map(|c| c.id).collect::<Vec<_>>(), vec![101, 102]);
        assert_eq!(b.own_creatures().map(|c| c.id).collect::<Vec<_>>(), vec![201, 202]);
    }

    #[test]
    fn test_creature_ids_cannot_collide() {
        let mut crowded = config();
        crowded.creatures_per_player = 100;
        assert_eq!(
            crowded.validate().unwrap_err(),
            ConfigError::TooManyCreatures {
                max: 99,
                requested: 100
            }
        );

        let mut huge = config();
        huge.players = vec![1, u32::MAX];
        assert_eq!(huge.validate().unwrap_err(), ConfigError::PlayerIdTooLarge(u32::MAX));

        let grid = TileGrid::new(40, 40, TerrainType::Plain);
        assert!(matches!(
            spawn_world(grid.clone(), 1, &[1, 2], 150),
            Err(ConfigError::TooManyCreatures { .. })
        ));

        let world = spawn_world(grid, 1, &[1, 2], 99).unwrap();
        assert_eq!(world.creatures().count(), 198);
        assert!(world.creature(199).is_some());
        assert!(world.creature(299).is_some());
    }

    #[test]
    fn test_map_too_small() {
        let grid = TileGrid::new(1, 1, TerrainType::Plain);
        let err = spawn_world(grid, 1, &[1, 2], 1).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MapTooSmall {
                available: 1,
                requested: 2
            }
        );
    }
}
