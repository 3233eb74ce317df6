//! Roster of tracked entities.
//!
//! Loaded once at startup and shared read-only for the whole run. Declared
//! order is kept because snapshots and reports follow it.

use crate::error::RollcallError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Stable identifier reported by scanning agents (beacon minor number).
pub type EntityId = u32;

/// One tracked entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: EntityId,
    pub name: String,
}

impl RosterEntry {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    index: HashMap<EntityId, usize>,
}

impl Roster {
    /// Build a roster, rejecting duplicate ids.
    pub fn new(entries: Vec<RosterEntry>) -> Result<Self, RollcallError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            if index.insert(entry.id, pos).is_some() {
                return Err(RollcallError::roster(format!(
                    "duplicate entity id {}",
                    entry.id
                )));
            }
        }
        Ok(Self { entries, index })
    }

    /// Load a YAML list of `{id, name}` records.
    pub fn load(path: &Path) -> Result<Self, RollcallError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RollcallError::roster(format!("failed to read {}: {}", path.display(), e))
        })?;
        let entries: Vec<RosterEntry> = serde_yml::from_str(&content).map_err(|e| {
            RollcallError::roster(format!("failed to parse {}: {}", path.display(), e))
        })?;
        if entries.is_empty() {
            return Err(RollcallError::roster(format!(
                "{} contains no entries",
                path.display()
            )));
        }
        let roster = Self::new(entries)?;
        tracing::info!("Loaded {} roster entries from {}", roster.len(), path.display());
        Ok(roster)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&RosterEntry> {
        self.index.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Ids in roster order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
