//! Merging local changes with the token history
//!
//! The token is the agreed history: every change it carries above the local
//! watermark is applied unconditionally. Local changes survive only if no
//! token change conflicts with them; rejected ones are rolled back. The
//! output is the consolidated sequence written into the outgoing token.
//!
//! Conflict detection and rollback are strategies injected into the engine
//! so alternative policies can be swapped in and tested on their own.

use crate::world::World;
use log::{debug, warn};
use shared::{Change, ChangeKind, Token};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("change references unknown creature {0}")]
    UnknownCreature(u32),
}

/// Decides whether a local change and a token change can both stand
pub trait ConflictPolicy: Send + Sync {
    fn conflicts(&self, world: &World, local: &Change, token: &Change)
        -> Result<bool, ReconcileError>;
}

/// Two changes conflict when they touch the same creature in the same tick,
/// unless both set the same scalar to the same value.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameCreatureSameTick;

impl ConflictPolicy for SameCreatureSameTick {
    fn conflicts(
        &self,
        world: &World,
        local: &Change,
        token: &Change,
    ) -> Result<bool, ReconcileError> {
        if world.resolve_creature(local.creature_id).is_none() {
            return Err(ReconcileError::UnknownCreature(local.creature_id));
        }

        if local.creature_id != token.creature_id || local.tick != token.tick {
            return Ok(false);
        }

        let identical_set =
            local.is_state_set() && token.is_state_set() && local.kind == token.kind;
        Ok(!identical_set)
    }
}

/// Accepts every local change
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConflicts;

impl ConflictPolicy for NoConflicts {
    fn conflicts(
        &self,
        _world: &World,
        _local: &Change,
        _token: &Change,
    ) -> Result<bool, ReconcileError> {
        Ok(false)
    }
}

/// How local changes are undone when rejected and made effective when accepted
pub trait RollbackStrategy: Send + Sync {
    fn roll_back(&mut self, world: &mut World, change: &Change);

    fn commit(&mut self, world: &mut World, change: &Change);
}

/// Local changes are never applied before reconciliation, so rolling one
/// back only means dropping it. Accepted changes are applied on commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredRollback;

impl RollbackStrategy for DeferredRollback {
    fn roll_back(&mut self, _world: &mut World, change: &Change) {
        debug!(
            "Rolled back local change for creature {} at tick {}",
            change.creature_id, change.tick
        );
    }

    fn commit(&mut self, world: &mut World, change: &Change) {
        apply_change(world, change);
    }
}

/// Token changes that have not been folded into local state yet
pub fn extract_new(token: &Token, watermark: u64) -> Vec<Change> {
    token
        .changes()
        .iter()
        .filter(|c| c.tick > watermark)
        .copied()
        .collect()
}

/// Applies the effect of a change to the world.
///
/// Changes that cannot be applied (unknown creature, tile outside the map,
/// unsupported type) are logged and ignored.
pub fn apply_change(world: &mut World, change: &Change) {
    if world.resolve_creature(change.creature_id).is_none() {
        warn!(
            "Ignoring change for unknown creature {} at tick {}",
            change.creature_id, change.tick
        );
        return;
    }

    match change.kind {
        ChangeKind::MoveCreature { x, y } => {
            let Some(tile) = world.resolve_tile(x, y) else {
                warn!(
                    "Ignoring move of creature {} to ({}, {}) outside the map",
                    change.creature_id, x, y
                );
                return;
            };
            world.set_creature_path_target(change.creature_id, tile);
        }
        ChangeKind::Health { value } => {
            if let Some(creature) = world.resolve_creature_mut(change.creature_id) {
                creature.health = value;
            }
        }
        ChangeKind::Energy { value } => {
            if let Some(creature) = world.resolve_creature_mut(change.creature_id) {
                creature.energy = value;
            }
        }
        ChangeKind::AttackingCreature { target } => {
            let target = target.filter(|id| world.resolve_creature(*id).is_some());
            if let Some(creature) = world.resolve_creature_mut(change.creature_id) {
                creature.attacking = target;
            }
        }
        ChangeKind::Unsupported { code } => {
            warn!("Ignoring unsupported change type {} at tick {}", code, change.tick);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Token,
    Local,
}

/// Counters describing the most recent merge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub accepted_local: usize,
    pub rolled_back: usize,
    pub applied_token: usize,
}

pub struct ReconciliationEngine {
    policy: Box<dyn ConflictPolicy>,
    rollback: Box<dyn RollbackStrategy>,
    last_stats: MergeStats,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(Box::new(SameCreatureSameTick), Box::new(DeferredRollback))
    }
}

impl ReconciliationEngine {
    pub fn new(policy: Box<dyn ConflictPolicy>, rollback: Box<dyn RollbackStrategy>) -> Self {
        Self {
            policy,
            rollback,
            last_stats: MergeStats::default(),
        }
    }

    pub fn last_stats(&self) -> MergeStats {
        self.last_stats
    }

    /// Merges local changes with new token changes, updating `world`.
    ///
    /// Returns the consolidated sequence ordered by tick. Within a tick the
    /// token changes come first, then the accepted local changes in the
    /// order they were drained. The world is updated in that same order.
    pub fn merge(
        &mut self,
        world: &mut World,
        local: Vec<Change>,
        token_changes: Vec<Change>,
    ) -> Vec<Change> {
        let mut stats = MergeStats::default();
        let mut accepted = Vec::with_capacity(local.len());

        for change in local {
            if self.is_rejected(world, &change, &token_changes) {
                self.rollback.roll_back(world, &change);
                stats.rolled_back += 1;
            } else {
                accepted.push(change);
            }
        }

        stats.applied_token = token_changes.len();
        stats.accepted_local = accepted.len();

        // Stable sort keeps the token-first order within a tick
        let mut ordered: Vec<(Change, Origin)> = token_changes
            .into_iter()
            .map(|c| (c, Origin::Token))
            .chain(accepted.into_iter().map(|c| (c, Origin::Local)))
            .collect();
        ordered.sort_by_key(|(c, _)| c.tick);

        // Applied in emitted order so every peer replaying the token ends up
        // with the same state as the holder
        for (change, origin) in &ordered {
            match origin {
                Origin::Token => apply_change(world, change),
                Origin::Local => self.rollback.commit(world, change),
            }
        }

        let merged: Vec<Change> = ordered.into_iter().map(|(c, _)| c).collect();

        debug!(
            "Merged {} changes ({} local accepted, {} rolled back, {} from token)",
            merged.len(),
            stats.accepted_local,
            stats.rolled_back,
            stats.applied_token
        );
        self.last_stats = stats;
        merged
    }

    fn is_rejected(&self, world: &World, local: &Change, token_changes: &[Change]) -> bool {
        if world.resolve_creature(local.creature_id).is_none() {
            warn!(
                "Rejecting local change for unknown creature {} at tick {}",
                local.creature_id, local.tick
            );
            return true;
        }

        token_changes.iter().any(|token| {
            self.policy.conflicts(world, local, token).unwrap_or_else(|e| {
                warn!("Conflict check failed, rejecting local change: {}", e);
                true
            })
        })
    }
}
