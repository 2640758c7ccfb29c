//! Local simulation state read and written by the hand-off protocol
//!
//! The world is deliberately small: creatures on a tile grid with a position,
//! a route, two scalars and an optional attack link. Local player commands do
//! not touch this state directly. They are queued as [`Change`]s and only
//! take effect once reconciliation accepts them, which makes rolling back a
//! rejected command a matter of dropping it.

use log::{debug, info};
use shared::pathfinding::PathFinder;
use shared::{Change, TerrainType, Tile, TileGrid};
use std::collections::{BTreeMap, HashSet, VecDeque};

pub const DEFAULT_HEALTH: f32 = 100.0;
pub const DEFAULT_ENERGY: f32 = 100.0;

/// Source of changes produced by the local simulation since the last drain
pub trait ChangeSource {
    /// Returns every pending change and leaves none behind
    fn drain_local_changes(&mut self) -> Vec<Change>;

    fn current_tick(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct Creature {
    pub id: u32,
    pub player_id: u32,
    pub x: u32,
    pub y: u32,
    pub health: f32,
    pub energy: f32,
    /// Creature currently being attacked, if any
    pub attacking: Option<u32>,
    /// Terrain this creature can walk on
    pub allowed: HashSet<TerrainType>,
    path_target: Option<Tile>,
    route: VecDeque<Tile>,
}

impl Creature {
    pub fn new(id: u32, player_id: u32, x: u32, y: u32) -> Self {
        Self {
            id,
            player_id,
            x,
            y,
            health: DEFAULT_HEALTH,
            energy: DEFAULT_ENERGY,
            attacking: None,
            allowed: HashSet::from([TerrainType::Plain, TerrainType::Forest]),
            path_target: None,
            route: VecDeque::new(),
        }
    }

    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Destination of the current route
    pub fn path_target(&self) -> Option<Tile> {
        self.path_target
    }

    /// Next tile this creature will step onto
    pub fn next_step(&self) -> Option<Tile> {
        self.route.front().copied()
    }

    pub fn remaining_steps(&self) -> usize {
        self.route.len()
    }
}

#[derive(Debug, Clone)]
pub struct World {
    tick: u64,
    grid: TileGrid,
    creatures: BTreeMap<u32, Creature>,
    pending: VecDeque<Change>,
    local_player: u32,
}

impl World {
    pub fn new(grid: TileGrid, local_player: u32) -> Self {
        Self {
            tick: 0,
            grid,
            creatures: BTreeMap::new(),
            pending: VecDeque::new(),
            local_player,
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn local_player(&self) -> u32 {
        self.local_player
    }

    pub fn spawn_creature(&mut self, creature: Creature) {
        debug!(
            "Spawned creature {} for player {} at ({}, {})",
            creature.id, creature.player_id, creature.x, creature.y
        );
        self.creatures.insert(creature.id, creature);
    }

    pub fn creature(&self, id: u32) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    /// Creatures owned by the local player
    pub fn own_creatures(&self) -> impl Iterator<Item = &Creature> {
        let player = self.local_player;
        self.creatures.values().filter(move |c| c.player_id == player)
    }

    pub fn resolve_tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.grid.tile_at(i64::from(x), i64::from(y))
    }

    pub fn resolve_creature(&self, id: u32) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn resolve_creature_mut(&mut self, id: u32) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    /// Routes a creature towards `tile`.
    ///
    /// Returns false when the creature is unknown or no route exists under
    /// its terrain rules; the creature then keeps standing where it is.
    pub fn set_creature_path_target(&mut self, id: u32, tile: Tile) -> bool {
        let Some(creature) = self.creatures.get(&id) else {
            return false;
        };
        let Some(source) = self.grid.tile(creature.x, creature.y) else {
            return false;
        };

        let path = PathFinder::new(&self.grid).find_path(source, tile, &creature.allowed);

        let Some(creature) = self.creatures.get_mut(&id) else {
            return false;
        };
        if path.is_empty() {
            debug!(
                "No route for creature {} to ({}, {}), movement denied",
                id, tile.x, tile.y
            );
            creature.path_target = None;
            creature.route.clear();
            return false;
        }

        creature.path_target = Some(tile);
        // The first tile is where the creature already stands
        creature.route = path.into_iter().skip(1).collect();
        true
    }

    /// Advances the simulation by one tick, moving every routed creature one step
    pub fn advance(&mut self) -> u64 {
        self.tick += 1;

        for creature in self.creatures.values_mut() {
            if let Some(step) = creature.route.pop_front() {
                creature.x = step.x;
                creature.y = step.y;
                if creature.route.is_empty() {
                    creature.path_target = None;
                }
            }
        }

        self.tick
    }

    /// Queues a move order for one of the local player's creatures
    pub fn order_move(&mut self, creature_id: u32, x: i32, y: i32) {
        self.queue(Change::move_creature(self.tick, self.local_player, creature_id, x, y));
    }

    pub fn order_health(&mut self, creature_id: u32, value: f32) {
        self.queue(Change::health(self.tick, self.local_player, creature_id, value));
    }

    pub fn order_energy(&mut self, creature_id: u32, value: f32) {
        self.queue(Change::energy(self.tick, self.local_player, creature_id, value));
    }

    pub fn order_attack(&mut self, creature_id: u32, target: Option<u32>) {
        self.queue(Change::attacking(self.tick, self.local_player, creature_id, target));
    }

    fn queue(&mut self, change: Change) {
        debug!("Queued local change {:?}", change);
        self.pending.push_back(change);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl ChangeSource for World {
    fn drain_local_changes(&mut self) -> Vec<Change> {
        let drained: Vec<Change> = self.pending.drain(..).collect();
        if !drained.is_empty() {
            info!("Drained {} local changes at tick {}", drained.len(), self.tick);
        }
        drained
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }
}
