// Presence Store Concurrency Test
//
// Races many upserts against a rollover/clear and checks that no accepted
// sighting disappears between the ended period and what remains in the store.

use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::{Roster, RosterEntry};
use rollcall_presence::{Observation, PresenceStore};
use std::sync::Arc;
use tokio::task::JoinSet;

fn ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn roster(n: u32) -> Arc<Roster> {
    let entries = (0..n).map(|id| RosterEntry::new(id, format!("entity-{}", id))).collect();
    Arc::new(Roster::new(entries).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rollover_racing_upserts_loses_nothing() {
    const N: u32 = 400;
    let store = PresenceStore::new(roster(N));
    let boundary = ts() + chrono::Duration::minutes(30);
    store.set_boundary(Some(boundary)).await;

    // Even ids were seen before the boundary, odd ids after it.
    let stamp = |id: u32| {
        if id % 2 == 0 {
            boundary - chrono::Duration::seconds(1)
        } else {
            boundary + chrono::Duration::seconds(1)
        }
    };

    let mut tasks = JoinSet::new();
    for id in 0..N {
        let store = store.clone();
        let when = stamp(id);
        tasks.spawn(async move { store.upsert(Observation::new(id, "Room1", when)).await });
    }

    let ended = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            store.rollover(None).await
        })
    }
    .await
    .unwrap();

    let mut accepted = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap() {
            accepted += 1;
        }
    }

    let remaining = store.snapshot().await;
    assert_eq!(accepted, N as usize);
    assert_eq!(ended.len() + remaining.len(), N as usize);
    for record in ended.iter() {
        assert_eq!(record.entity_id % 2, 0);
        assert!(remaining.get(record.entity_id).is_none());
    }
    for id in (1..N).step_by(2) {
        assert!(remaining.get(id).is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clear_then_snapshot_after_writers_finish_is_empty() {
    let store = PresenceStore::new(roster(50));

    let mut tasks = JoinSet::new();
    for id in 0..50 {
        let store = store.clone();
        tasks.spawn(async move {
            store.upsert(Observation::new(id, "Lab", ts()).with_rssi(-60)).await;
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert_eq!(store.clear().await, 50);
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_agents_same_entity_keep_one_whole_record() {
    let store = PresenceStore::new(roster(1));
    let base = ts();

    let mut tasks = JoinSet::new();
    for n in 0..30i64 {
        let store = store.clone();
        tasks.spawn(async move {
            // Agent clocks disagree; arrival order decides.
            let when = base - chrono::Duration::seconds(n * 7 % 11);
            store
                .upsert(Observation::new(0, format!("Zone{}", n), when).with_rssi(-(n as i32)))
                .await;
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.version, 30);
    let record = snapshot.get(0).unwrap();
    let n: i64 = record.observed_label.trim_start_matches("Zone").parse().unwrap();
    assert_eq!(record.rssi, -(n as i32));
    assert_eq!(record.last_seen, base - chrono::Duration::seconds(n * 7 % 11));

    // Sequential writers: the last call wins regardless of timestamp.
    store.upsert(Observation::new(0, "Late", base + chrono::Duration::hours(1))).await;
    store.upsert(Observation::new(0, "Stepped", base - chrono::Duration::hours(1))).await;
    assert_eq!(store.snapshot().await.get(0).unwrap().observed_label, "Stepped");
}
