//! Deterministic A* search over the tile grid
//!
//! Every peer in the ring re-applies movement changes by running this search
//! locally, so identical inputs must yield identical tile sequences:
//! - all costs are integers (Euclidean distance scaled by [`DIST`])
//! - frontier ties pop in insertion order
//! - an equal-cost relaxation replaces the stored route (latest discovery wins)

use crate::grid::{TerrainType, Tile, TileGrid};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Cost of one orthogonal step
pub const DIST: u64 = 1000;

/// Ordered tiles from source to target, inclusive. Empty when unreachable.
pub type Path = Vec<Tile>;

/// Best-known route to a tile that is still open
#[derive(Debug, Clone, Copy)]
struct NodeRecord {
    g: u64,
    prev: Option<(u32, u32)>,
}

/// Scaled Euclidean distance between two tiles, `floor(DIST * sqrt(dx² + dy²))`
pub fn distance(a: &Tile, b: &Tile) -> u64 {
    let dx = u64::from(a.x.abs_diff(b.x));
    let dy = u64::from(a.y.abs_diff(b.y));
    integer_sqrt((dx * dx + dy * dy) * DIST * DIST)
}

/// Floor square root without going through floating point
fn integer_sqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

pub struct PathFinder<'a> {
    grid: &'a TileGrid,
}

impl<'a> PathFinder<'a> {
    pub fn new(grid: &'a TileGrid) -> Self {
        Self { grid }
    }

    /// Finds the cheapest route from `source` to `target` using only tiles
    /// whose terrain is in `allowed`.
    ///
    /// The source tile itself is not checked against `allowed`, a creature
    /// may always leave the tile it stands on. No route is not an error, the
    /// returned path is simply empty.
    pub fn find_path(&self, source: Tile, target: Tile, allowed: &HashSet<TerrainType>) -> Path {
        if self.grid.tile(source.x, source.y).is_none()
            || self.grid.tile(target.x, target.y).is_none()
        {
            return Vec::new();
        }

        let mut closed: HashSet<(u32, u32)> = HashSet::new();
        let mut open: HashMap<(u32, u32), NodeRecord> = HashMap::new();
        let mut finished: HashMap<(u32, u32), NodeRecord> = HashMap::new();
        let mut frontier: BinaryHeap<Reverse<(u64, u64, (u32, u32))>> = BinaryHeap::new();
        let mut seq = 0u64;

        open.insert(source.position(), NodeRecord { g: 0, prev: None });
        frontier.push(Reverse((distance(&source, &target), seq, source.position())));

        while let Some(Reverse((_, _, position))) = frontier.pop() {
            // Stale heap entry for a tile that was already finalised
            if closed.contains(&position) {
                continue;
            }
            let Some(current) = open.remove(&position) else {
                continue;
            };
            closed.insert(position);
            finished.insert(position, current);

            if position == target.position() {
                return self.reconstruct(&finished, position);
            }

            let Some(current_tile) = self.grid.tile(position.0, position.1) else {
                continue;
            };

            for neighbour in self.grid.neighbours(&current_tile) {
                if closed.contains(&neighbour.position()) || !allowed.contains(&neighbour.terrain) {
                    continue;
                }
                if self.cuts_corner(&current_tile, &neighbour, allowed) {
                    continue;
                }

                let tentative = current.g + distance(&current_tile, &neighbour);
                let known = open.get(&neighbour.position()).map_or(u64::MAX, |n| n.g);

                if tentative <= known {
                    open.insert(
                        neighbour.position(),
                        NodeRecord {
                            g: tentative,
                            prev: Some(position),
                        },
                    );
                    seq += 1;
                    let f = tentative + distance(&neighbour, &target);
                    frontier.push(Reverse((f, seq, neighbour.position())));
                }
            }
        }

        Vec::new()
    }

    /// A diagonal step is refused when either orthogonal tile it squeezes
    /// between is not walkable.
    fn cuts_corner(&self, from: &Tile, to: &Tile, allowed: &HashSet<TerrainType>) -> bool {
        if from.x == to.x || from.y == to.y {
            return false;
        }
        let walkable = |x: u32, y: u32| {
            self.grid
                .tile(x, y)
                .map_or(false, |t| allowed.contains(&t.terrain))
        };
        !walkable(to.x, from.y) || !walkable(from.x, to.y)
    }

    fn reconstruct(&self, finished: &HashMap<(u32, u32), NodeRecord>, end: (u32, u32)) -> Path {
        let mut path = Vec::new();
        let mut cursor = Some(end);
        while let Some(position) = cursor {
            let Some(tile) = self.grid.tile(position.0, position.1) else {
                break;
            };
            path.push(tile);
            cursor = finished.get(&position).and_then(|n| n.prev);
        }
        path.reverse();
        path
    }
}
