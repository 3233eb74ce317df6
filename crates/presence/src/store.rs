// Live Presence Store
//
// This module holds the latest sighting of every roster entity since the last
// period boundary. All access goes through one lock so upserts, snapshots and
// clears are totally ordered. Sightings stamped after the current period's end
// wait in a second map until the monitor rolls the store over.

use chrono::NaiveDateTime;
use rollcall_core::{EntityId, Roster};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single sighting reported by an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub entity_id: EntityId,
    /// Label of the reporting agent's zone
    pub label: String,
    pub timestamp: NaiveDateTime,
    pub rssi: i32,
    /// Peer address of the reporting agent, when known
    pub agent_addr: Option<String>,
}

impl Observation {
    pub fn new(entity_id: EntityId, label: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            entity_id,
            label: label.into(),
            timestamp,
            rssi: 0,
            agent_addr: None,
        }
    }

    pub fn with_rssi(mut self, rssi: i32) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn with_agent_addr(mut self, addr: impl Into<String>) -> Self {
        self.agent_addr = Some(addr.into());
        self
    }
}

/// Latest known location of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRecord {
    pub entity_id: EntityId,
    pub observed_label: String,
    pub last_seen: NaiveDateTime,
    pub rssi: i32,
    pub agent_addr: Option<String>,
}

impl From<Observation> for LiveRecord {
    fn from(obs: Observation) -> Self {
        Self {
            entity_id: obs.entity_id,
            observed_label: obs.label,
            last_seen: obs.timestamp,
            rssi: obs.rssi,
            agent_addr: obs.agent_addr,
        }
    }
}

/// Immutable copy of the store at one point in time
#[derive(Debug, Clone, Default)]
pub struct PresenceSnapshot {
    /// Store version the copy was taken at
    pub version: u64,
    records: HashMap<EntityId, LiveRecord>,
}

impl PresenceSnapshot {
    pub fn get(&self, id: EntityId) -> Option<&LiveRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveRecord> {
        self.records.values()
    }

    /// Records ordered by entity id
    pub fn to_sorted_vec(&self) -> Vec<LiveRecord> {
        let mut records: Vec<LiveRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.entity_id);
        records
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<EntityId, LiveRecord>,
    /// Sightings stamped at or after `boundary`, held for the next period
    pending: HashMap<EntityId, LiveRecord>,
    boundary: Option<NaiveDateTime>,
    /// Bumped on every mutation
    version: u64,
}

impl Inner {
    fn copy(&self) -> PresenceSnapshot {
        let mut records = self.records.clone();
        records.extend(self.pending.iter().map(|(id, r)| (*id, r.clone())));
        PresenceSnapshot {
            version: self.version,
            records,
        }
    }

    fn len(&self) -> usize {
        self.records.len()
            + self
                .pending
                .keys()
                .filter(|id| !self.records.contains_key(id))
                .count()
    }

    /// Re-split both maps against the current boundary.
    fn rebalance(&mut self) {
        let mut current = std::mem::take(&mut self.records);
        let mut later = std::mem::take(&mut self.pending);
        for (id, record) in current.drain().chain(later.drain()) {
            let target = match self.boundary {
                Some(boundary) if record.last_seen >= boundary => &mut self.pending,
                _ => &mut self.records,
            };
            match target.get(&id) {
                Some(existing) if existing.last_seen > record.last_seen => {}
                _ => {
                    target.insert(id, record);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct PresenceStore {
    roster: Arc<Roster>,
    inner: Arc<RwLock<Inner>>,
}

impl PresenceStore {
    pub fn new(roster: Arc<Roster>) -> Self {
        Self {
            roster,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    /// Record a sighting, replacing any earlier one for the same entity.
    ///
    /// Entities missing from the roster are dropped and `false` is returned.
    /// The most recent call wins. A sighting stamped at or after the period
    /// boundary is held apart so it cannot overwrite the one the ending
    /// period will be judged on.
    pub async fn upsert(&self, observation: Observation) -> bool {
        if !self.roster.contains(observation.entity_id) {
            tracing::debug!("Dropping sighting of unknown entity {}", observation.entity_id);
            return false;
        }

        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let target = match inner.boundary {
            Some(boundary) if observation.timestamp >= boundary => &mut inner.pending,
            _ => &mut inner.records,
        };
        target.insert(observation.entity_id, LiveRecord::from(observation));
        inner.version += 1;
        true
    }

    /// Copy of all current records
    pub async fn snapshot(&self) -> PresenceSnapshot {
        self.inner.read().await.copy()
    }

    /// Remove every record; returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.write().await;
        let dropped = inner.len();
        inner.records.clear();
        inner.pending.clear();
        inner.version += 1;
        dropped
    }

    /// Set the instant the current period ends. Records already stamped at
    /// or after it move to the next period.
    pub async fn set_boundary(&self, boundary: Option<NaiveDateTime>) {
        let mut inner = self.inner.write().await;
        inner.boundary = boundary;
        inner.rebalance();
        inner.version += 1;
    }

    /// Close the current period: return its records, promote the sightings
    /// held for the next one and install `next_boundary`, all in one
    /// critical section.
    pub async fn rollover(&self, next_boundary: Option<NaiveDateTime>) -> PresenceSnapshot {
        let mut inner = self.inner.write().await;
        let ended = PresenceSnapshot {
            version: inner.version,
            records: std::mem::take(&mut inner.records),
        };
        inner.records = std::mem::take(&mut inner.pending);
        inner.boundary = next_boundary;
        inner.rebalance();
        inner.version += 1;
        ended
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.read().await;
        inner.records.is_empty() && inner.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rollcall_core::RosterEntry;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn store() -> PresenceStore {
        let roster = Roster::new(vec![RosterEntry::new(1, "A"), RosterEntry::new(2, "B")]).unwrap();
        PresenceStore::new(Arc::new(roster))
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = store();
        assert!(store.upsert(Observation::new(1, "Room1", at(9, 20))).await);
        assert!(store.upsert(Observation::new(1, "Canteen", at(9, 25))).await);
        assert!(store.upsert(Observation::new(1, "Lab", at(9, 30)).with_rssi(-70)).await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        let record = snapshot.get(1).unwrap();
        assert_eq!(record.observed_label, "Lab");
        assert_eq!(record.last_seen, at(9, 30));
        assert_eq!(record.rssi, -70);
    }

    #[tokio::test]
    async fn test_most_recent_upsert_wins_even_if_clock_stepped_back() {
        let store = store();
        store.upsert(Observation::new(2, "Canteen", at(9, 50))).await;
        store.upsert(Observation::new(2, "Room1", at(9, 5))).await;

        let snapshot = store.snapshot().await;
        let record = snapshot.get(2).unwrap();
        assert_eq!(record.observed_label, "Room1");
        assert_eq!(record.last_seen, at(9, 5));
    }

    #[tokio::test]
    async fn test_unknown_entity_dropped() {
        let store = store();
        assert!(!store.upsert(Observation::new(42, "Room1", at(9, 20))).await);
        assert!(store.is_empty().await);
        assert_eq!(store.snapshot().await.version, 0);
    }

    #[tokio::test]
    async fn test_clear_empties_and_bumps_version() {
        let store = store();
        store.upsert(Observation::new(1, "Room1", at(9, 20))).await;
        store.upsert(Observation::new(2, "Room1", at(9, 21))).await;
        let before = store.snapshot().await.version;

        assert_eq!(store.clear().await, 2);
        assert!(store.snapshot().await.is_empty());
        assert!(store.snapshot().await.version > before);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let store = store();
        store.upsert(Observation::new(1, "Room1", at(9, 20))).await;
        let snapshot = store.snapshot().await;
        store.clear().await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.to_sorted_vec()[0].entity_id, 1);
    }

    #[tokio::test]
    async fn test_sighting_after_boundary_is_held_for_next_period() {
        let store = store();
        store.set_boundary(Some(at(10, 0))).await;
        store.upsert(Observation::new(1, "Room1", at(9, 58))).await;
        store.upsert(Observation::new(1, "Canteen", at(10, 0))).await;
        store.upsert(Observation::new(2, "Lab", at(10, 1))).await;

        // The live view shows the newest sighting.
        let live = store.snapshot().await;
        assert_eq!(live.get(1).unwrap().observed_label, "Canteen");
        assert_eq!(store.len().await, 2);

        let ended = store.rollover(Some(at(10, 15))).await;
        assert_eq!(ended.len(), 1);
        assert_eq!(ended.get(1).unwrap().observed_label, "Room1");

        let next = store.snapshot().await;
        assert_eq!(next.get(1).unwrap().observed_label, "Canteen");
        assert_eq!(next.get(2).unwrap().observed_label, "Lab");

        // The next boundary is installed: a 10:20 sighting waits for the period after.
        store.upsert(Observation::new(1, "Room1", at(10, 20))).await;
        let recess = store.rollover(None).await;
        assert_eq!(recess.get(1).unwrap().observed_label, "Canteen");
        assert_eq!(recess.get(2).unwrap().observed_label, "Lab");
        assert_eq!(store.snapshot().await.get(1).unwrap().observed_label, "Room1");
    }

    #[tokio::test]
    async fn test_late_boundary_moves_existing_records() {
        let store = store();
        store.upsert(Observation::new(1, "Room1", at(9, 50))).await;
        store.upsert(Observation::new(2, "Room1", at(10, 2))).await;

        store.set_boundary(Some(at(10, 0))).await;
        let ended = store.rollover(None).await;

        assert!(ended.get(1).is_some());
        assert!(ended.get(2).is_none());
        assert!(store.snapshot().await.get(2).is_some());

        // No boundary any more: everything belongs to the current period.
        store.upsert(Observation::new(1, "Lab", at(23, 0))).await;
        assert_eq!(store.rollover(None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_rollover_without_boundary_takes_everything() {
        let store = store();
        store.upsert(Observation::new(1, "Room1", at(9, 50))).await;

        let ended = store.rollover(Some(at(10, 15))).await;
        assert_eq!(ended.len(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_drops_held_sightings_too() {
        let store = store();
        store.set_boundary(Some(at(10, 0))).await;
        store.upsert(Observation::new(1, "Room1", at(9, 59))).await;
        store.upsert(Observation::new(2, "Room1", at(10, 1))).await;

        assert_eq!(store.clear().await, 2);
        assert!(store.is_empty().await);
    }
}
