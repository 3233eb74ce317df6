// Period Monitor
//
// Timer loop around `locate`/`plan_slot`. On each tick it compares the current
// period with the previous one, runs the snapshot for a finished class, rolls
// the presence store over to the next period and stops for good once the day
// is closed. Between transitions it mirrors the store into the live table.
//
// The store is told when the current period ends, so a sighting stamped after
// that instant but reported before the next poll never counts for the period
// that already ended.

use crate::snapshot::{SnapshotGenerator, SnapshotOutcome};
use crate::state::{locate, plan, plan_slot, Period, Slot, Transition};
use chrono::{Local, NaiveDateTime, NaiveTime};
use rollcall_core::Timetable;
use rollcall_history::Ledger;
use rollcall_presence::{PresenceSnapshot, PresenceStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// What a single poll did
#[derive(Debug)]
pub struct PollOutcome {
    pub period: Period,
    pub transition: Transition,
    pub snapshot: Option<SnapshotOutcome>,
}

pub struct PeriodMonitor {
    timetable: Arc<Timetable>,
    cutoff: NaiveTime,
    poll_interval: Duration,
    store: PresenceStore,
    generator: Arc<SnapshotGenerator>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    current: Slot,
    /// Whether the store has been told when `current` ends
    boundary_installed: bool,
    halted: bool,
    mirrored_version: Option<u64>,
    lost_snapshots: u64,
}

impl PeriodMonitor {
    pub fn new(
        timetable: Arc<Timetable>,
        cutoff: NaiveTime,
        store: PresenceStore,
        generator: Arc<SnapshotGenerator>,
        ledger: Ledger,
    ) -> Self {
        let mut monitor = Self {
            timetable,
            cutoff,
            poll_interval: Duration::from_secs(rollcall_core::config::DEFAULT_POLL_INTERVAL_SECS),
            store,
            generator,
            ledger,
            clock: Arc::new(SystemClock),
            current: Slot {
                period: Period::Free,
                ends_at: None,
            },
            boundary_installed: false,
            halted: false,
            mirrored_version: None,
            lost_snapshots: 0,
        };
        monitor.reset_initial_period();
        monitor
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.reset_initial_period();
        self
    }

    fn reset_initial_period(&mut self) {
        self.current = locate(self.clock.now(), &self.timetable, self.cutoff);
        self.halted = self.current.period == Period::Closed;
        self.boundary_installed = false;
    }

    pub fn current(&self) -> &Period {
        &self.current.period
    }

    async fn install_boundary(&mut self) {
        if !self.boundary_installed {
            self.store.set_boundary(self.current.ends_at).await;
            self.boundary_installed = true;
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Snapshots whose history or report write failed so far
    pub fn lost_snapshots(&self) -> u64 {
        self.lost_snapshots
    }

    /// Poll on the configured cadence until the day closes or `shutdown`
    /// fires. Final cleanup on shutdown is left to [`PeriodMonitor::finish`].
    pub async fn run(&mut self, shutdown: CancellationToken) {
        if self.halted {
            tracing::info!("Day already closed at startup; period monitor idle");
            return;
        }
        tracing::info!(
            "Period monitor started in {} (poll every {:?})",
            self.current.period,
            self.poll_interval
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                    if self.halted {
                        break;
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Period monitor stopping in {}", self.current.period);
                    break;
                }
            }
        }
    }

    /// One classification step.
    pub async fn poll(&mut self) -> PollOutcome {
        let now = self.clock.now();
        let next = locate(now, &self.timetable, self.cutoff);
        let transition = plan_slot(&self.current, &next);

        if self.halted || transition.is_noop() {
            if !self.halted {
                self.install_boundary().await;
                self.mirror_live().await;
            }
            return PollOutcome {
                period: self.current.period.clone(),
                transition,
                snapshot: None,
            };
        }

        self.install_boundary().await;
        tracing::info!(
            "Period transition: {} -> {}",
            self.current.period,
            next.period
        );
        let snapshot = self.apply(&transition, now, next.ends_at).await;

        self.current = next;
        if transition.halt {
            self.halted = true;
            tracing::info!("Day closed; no further polls");
        }
        PollOutcome {
            period: self.current.period.clone(),
            transition,
            snapshot,
        }
    }

    /// Graceful stop: snapshot a class still in progress, wipe live state and
    /// halt. A no-op once halted.
    pub async fn finish(&mut self) -> Option<SnapshotOutcome> {
        if self.halted {
            return None;
        }
        self.install_boundary().await;
        let transition = plan(&self.current.period, &Period::Closed);
        tracing::info!("Finishing period monitor in {}", self.current.period);
        let snapshot = self.apply(&transition, self.clock.now(), None).await;
        self.current = Slot {
            period: Period::Closed,
            ends_at: None,
        };
        self.halted = true;
        snapshot
    }

    async fn apply(
        &mut self,
        transition: &Transition,
        now: NaiveDateTime,
        next_boundary: Option<NaiveDateTime>,
    ) -> Option<SnapshotOutcome> {
        // Sightings of the ended period leave the store; later ones stay.
        let ended = self.store.rollover(next_boundary).await;
        if transition.halt {
            self.store.clear().await;
        }

        let snapshot = match &transition.snapshot {
            Some(label) => self.run_snapshot(label.clone(), ended, now).await,
            None => {
                if !ended.is_empty() {
                    tracing::debug!("Cleared {} live records", ended.len());
                }
                None
            }
        };
        if transition.clear {
            self.clear_live().await;
        }
        snapshot
    }

    async fn run_snapshot(
        &mut self,
        label: String,
        presence: PresenceSnapshot,
        now: NaiveDateTime,
    ) -> Option<SnapshotOutcome> {
        let generator = self.generator.clone();
        let task_label = label.clone();
        let result =
            tokio::task::spawn_blocking(move || generator.generate(&task_label, &presence, now))
                .await;

        match result {
            Ok(outcome) => {
                if !outcome.is_complete() {
                    self.record_lost(&label);
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("Snapshot '{}' task failed: {}", label, e);
                self.record_lost(&label);
                None
            }
        }
    }

    fn record_lost(&mut self, label: &str) {
        self.lost_snapshots += 1;
        tracing::warn!(
            "Snapshot for '{}' incomplete; live state was still cleared ({} lost so far)",
            label,
            self.lost_snapshots
        );
    }

    async fn mirror_live(&mut self) {
        let presence = self.store.snapshot().await;
        let version = presence.version;
        if self.mirrored_version == Some(version) {
            return;
        }
        let records = presence.to_sorted_vec();
        let ledger = self.ledger.clone();
        match tokio::task::spawn_blocking(move || ledger.replace_live(&records)).await {
            Ok(Ok(())) => self.mirrored_version = Some(version),
            Ok(Err(e)) => tracing::warn!("Live table refresh failed: {}", e),
            Err(e) => tracing::warn!("Live table refresh task failed: {}", e),
        }
    }

    async fn clear_live(&mut self) {
        let ledger = self.ledger.clone();
        match tokio::task::spawn_blocking(move || ledger.clear_live()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Live table wipe failed: {}", e),
            Err(e) => tracing::error!("Live table wipe task failed: {}", e),
        }
        self.mirrored_version = None;
    }
}
