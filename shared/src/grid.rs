//! Static tile map shared by every peer in the ring.
//!
//! The grid is built once at startup and never mutated afterwards, so all
//! peers that load the same map compute identical paths.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terrain of a single tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TerrainType {
    Plain,
    Forest,
    Water,
    Wall,
}

impl TerrainType {
    /// Character used for this terrain in text maps
    pub fn glyph(self) -> char {
        match self {
            TerrainType::Plain => '.',
            TerrainType::Forest => 'f',
            TerrainType::Water => '~',
            TerrainType::Wall => '#',
        }
    }

    pub fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '.' => Some(TerrainType::Plain),
            'f' => Some(TerrainType::Forest),
            '~' => Some(TerrainType::Water),
            '#' => Some(TerrainType::Wall),
            _ => None,
        }
    }
}

/// A single map cell. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub terrain: TerrainType,
}

impl Tile {
    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// True when `other` lies in this tile's Moore neighbourhood
    pub fn is_adjacent(&self, other: &Tile) -> bool {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("map has no tiles")]
    Empty,

    #[error("row {row} has {actual} tiles, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("unknown terrain glyph {glyph:?} at ({x}, {y})")]
    UnknownGlyph { glyph: char, x: usize, y: usize },
}

/// Rectangular tile matrix stored in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Creates a grid where every tile has the same terrain
    pub fn new(width: u32, height: u32, fill: TerrainType) -> Self {
        let tiles = (0..height)
            .flat_map(|y| (0..width).map(move |x| Tile { x, y, terrain: fill }))
            .collect();

        Self {
            width,
            height,
            tiles,
        }
    }

    /// Builds a grid from rows of terrain, `rows[y][x]`
    pub fn from_terrain(rows: Vec<Vec<TerrainType>>) -> Result<Self, GridError> {
        let expected = rows.first().map(Vec::len).unwrap_or(0);
        if expected == 0 {
            return Err(GridError::Empty);
        }

        let mut tiles = Vec::with_capacity(expected * rows.len());
        for (y, row) in rows.iter().enumerate() {
            if row.len() != expected {
                return Err(GridError::Ragged {
                    row: y,
                    expected,
                    actual: row.len(),
                });
            }
            for (x, terrain) in row.iter().enumerate() {
                tiles.push(Tile {
                    x: x as u32,
                    y: y as u32,
                    terrain: *terrain,
                });
            }
        }

        Ok(Self {
            width: expected as u32,
            height: rows.len() as u32,
            tiles,
        })
    }

    /// Parses a text map, one row per line. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, GridError> {
        let mut rows = Vec::new();
        for (y, line) in text.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
            let mut row = Vec::with_capacity(line.len());
            for (x, glyph) in line.chars().enumerate() {
                let terrain =
                    TerrainType::from_glyph(glyph).ok_or(GridError::UnknownGlyph { glyph, x, y })?;
                row.push(terrain);
            }
            rows.push(row);
        }
        Self::from_terrain(rows)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Looks up a tile, returning None outside the grid
    pub fn tile(&self, x: u32, y: u32) -> Option<Tile> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles.get((y * self.width + x) as usize).copied()
    }

    /// Signed lookup used by wire decoding where coordinates may be negative
    pub fn tile_at(&self, x: i64, y: i64) -> Option<Tile> {
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        self.tile(x, y)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    /// Moore neighbourhood of `tile`, scanned row by row.
    ///
    /// The scan order is fixed so that searches expanding neighbours are
    /// reproducible on every peer.
    pub fn neighbours(&self, tile: &Tile) -> impl Iterator<Item = Tile> + '_ {
        let (cx, cy) = (i64::from(tile.x), i64::from(tile.y));
        (-1i64..=1)
            .flat_map(move |dy| (-1i64..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| (dx, dy) != (0, 0))
            .filter_map(move |(dx, dy)| self.tile_at(cx + dx, cy + dy))
    }

    /// Renders the grid back into the text map format
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(((self.width + 1) * self.height) as usize);
        for row in self.tiles.chunks(self.width as usize) {
            out.extend(row.iter().map(|t| t.terrain.glyph()));
            out.push('\n');
        }
        out
    }
}
