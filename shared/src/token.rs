//! The circulating record of agreed changes

use crate::change::{Change, ChangeRecord};
use serde::{Deserialize, Serialize};

/// Ordered change history held by whichever peer is currently authoritative.
///
/// Tokens are plain values: a peer that receives one clones it before making
/// any modification, so the sender's copy is never aliased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    changes: Vec<Change>,
}

impl Token {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_changes(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn from_records(records: &[ChangeRecord]) -> Self {
        Self {
            changes: records.iter().map(Change::from).collect(),
        }
    }

    pub fn to_records(&self) -> Vec<ChangeRecord> {
        self.changes.iter().map(ChangeRecord::from).collect()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Highest tick present in the history
    pub fn newest_tick(&self) -> Option<u64> {
        self.changes.iter().map(|c| c.tick).max()
    }

    /// Changes already folded in at `watermark`, in token order
    pub fn historical(&self, watermark: u64) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.tick <= watermark)
    }

    /// Keeps the history at or below `watermark` and appends `merged` after it.
    ///
    /// Changes above the watermark are exactly the ones the merge consumed,
    /// so they are replaced rather than duplicated.
    pub fn replace_after(&mut self, watermark: u64, merged: Vec<Change>) {
        self.changes = self.historical(watermark).copied().chain(merged).collect();
    }

    /// Drops changes older than `tick`. Returns how many were removed.
    pub fn prune_before(&mut self, tick: u64) -> usize {
        let before = self.changes.len();
        self.changes.retain(|c| c.tick >= tick);
        before - self.changes.len()
    }
}
