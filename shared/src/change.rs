//! State mutations exchanged between peers

use serde::{Deserialize, Serialize};

pub const MOVE_CREATURE: u32 = 0;
pub const HEALTH: u32 = 1;
pub const ENERGY: u32 = 2;
pub const ATTACKING_CREATURE: u32 = 3;

/// What a change does to its creature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChangeKind {
    MoveCreature { x: i32, y: i32 },
    Health { value: f32 },
    Energy { value: f32 },
    AttackingCreature { target: Option<u32> },
    /// A type code this build does not know. Carried through the token
    /// unchanged and ignored when applied.
    Unsupported { code: u32 },
}

/// One discrete state mutation, tagged with the tick it was produced at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub tick: u64,
    pub player_id: u32,
    pub creature_id: u32,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(tick: u64, player_id: u32, creature_id: u32, kind: ChangeKind) -> Self {
        Self {
            tick,
            player_id,
            creature_id,
            kind,
        }
    }

    pub fn move_creature(tick: u64, player_id: u32, creature_id: u32, x: i32, y: i32) -> Self {
        Self::new(tick, player_id, creature_id, ChangeKind::MoveCreature { x, y })
    }

    pub fn health(tick: u64, player_id: u32, creature_id: u32, value: f32) -> Self {
        Self::new(tick, player_id, creature_id, ChangeKind::Health { value })
    }

    pub fn energy(tick: u64, player_id: u32, creature_id: u32, value: f32) -> Self {
        Self::new(tick, player_id, creature_id, ChangeKind::Energy { value })
    }

    pub fn attacking(tick: u64, player_id: u32, creature_id: u32, target: Option<u32>) -> Self {
        Self::new(
            tick,
            player_id,
            creature_id,
            ChangeKind::AttackingCreature { target },
        )
    }

    /// Wire type code of this change
    pub fn type_code(&self) -> u32 {
        match self.kind {
            ChangeKind::MoveCreature { .. } => MOVE_CREATURE,
            ChangeKind::Health { .. } => HEALTH,
            ChangeKind::Energy { .. } => ENERGY,
            ChangeKind::AttackingCreature { .. } => ATTACKING_CREATURE,
            ChangeKind::Unsupported { code } => code,
        }
    }

    /// Scalar sets can be applied twice with the same outcome
    pub fn is_state_set(&self) -> bool {
        matches!(
            self.kind,
            ChangeKind::Health { .. } | ChangeKind::Energy { .. }
        )
    }
}

/// Flat wire record of a change. Fields a variant does not use are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub change_type: u32,
    pub tick: u64,
    pub player_id: u32,
    pub creature_id: u32,
    pub x: i32,
    pub y: i32,
    pub new_value: f32,
    /// Attack target, 0 when the creature stops attacking
    pub other_creature_id: u32,
}

impl From<&Change> for ChangeRecord {
    fn from(change: &Change) -> Self {
        let mut record = ChangeRecord {
            change_type: change.type_code(),
            tick: change.tick,
            player_id: change.player_id,
            creature_id: change.creature_id,
            ..Default::default()
        };

        match change.kind {
            ChangeKind::MoveCreature { x, y } => {
                record.x = x;
                record.y = y;
            }
            ChangeKind::Health { value } | ChangeKind::Energy { value } => {
                record.new_value = value;
            }
            ChangeKind::AttackingCreature { target } => {
                record.other_creature_id = target.unwrap_or(0);
            }
            ChangeKind::Unsupported { .. } => {}
        }

        record
    }
}

impl From<&ChangeRecord> for Change {
    fn from(record: &ChangeRecord) -> Self {
        let kind = match record.change_type {
            MOVE_CREATURE => ChangeKind::MoveCreature {
                x: record.x,
                y: record.y,
            },
            HEALTH => ChangeKind::Health {
                value: record.new_value,
            },
            ENERGY => ChangeKind::Energy {
                value: record.new_value,
            },
            ATTACKING_CREATURE => ChangeKind::AttackingCreature {
                target: (record.other_creature_id != 0).then_some(record.other_creature_id),
            },
            code => ChangeKind::Unsupported { code },
        };

        Change::new(record.tick, record.player_id, record.creature_id, kind)
    }
}
