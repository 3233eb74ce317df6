//! Period classification and transition planning.
//!
//! All functions here are pure; the timer loop in `monitor` only feeds them the
//! current time and carries out the returned plan.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use rollcall_core::timetable::minute_of_day;
use rollcall_core::Timetable;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Class(String),
    Break(String),
    Free,
    /// Past the end-of-day cutoff; terminal
    Closed,
}

impl Period {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Class(label) | Self::Break(label) => Some(label),
            Self::Free | Self::Closed => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Self::Class(_))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(label) => write!(f, "CLASS({})", label),
            Self::Break(label) => write!(f, "BREAK({})", label),
            Self::Free => f.write_str("FREE"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

/// What the monitor must do when moving between two periods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Label of the class that just ended, if a snapshot is due
    pub snapshot: Option<String>,
    pub clear: bool,
    pub halt: bool,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.snapshot.is_none() && !self.clear && !self.halt
    }
}

pub fn classify(now: NaiveDateTime, timetable: &Timetable, cutoff: NaiveTime) -> Period {
    if now.time() >= cutoff {
        return Period::Closed;
    }
    match timetable.lookup(now.weekday(), minute_of_day(now.time())) {
        Some(interval) if interval.is_break => Period::Break(interval.label.clone()),
        Some(interval) => Period::Class(interval.label.clone()),
        None => Period::Free,
    }
}

/// A period together with the instant it ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub period: Period,
    /// `None` once the day is closed
    pub ends_at: Option<NaiveDateTime>,
}

/// Classify `now` and work out when that period ends.
///
/// A class or break ends at its interval end, a free gap at the next interval
/// start. Nothing runs past the cutoff.
pub fn locate(now: NaiveDateTime, timetable: &Timetable, cutoff: NaiveTime) -> Slot {
    let period = classify(now, timetable, cutoff);
    if period == Period::Closed {
        return Slot {
            period,
            ends_at: None,
        };
    }

    let minute = minute_of_day(now.time());
    let end_minute = match timetable.lookup(now.weekday(), minute) {
        Some(interval) => Some(interval.end_minute),
        None => timetable
            .intervals_for(now.weekday())
            .iter()
            .map(|interval| interval.start_minute)
            .filter(|start| *start > minute)
            .min(),
    };

    let day_start = now.date().and_time(NaiveTime::MIN);
    let closes_at = now.date().and_time(cutoff);
    let ends_at = end_minute
        .map(|m| day_start + Duration::minutes(i64::from(m)))
        .map_or(closes_at, |end| end.min(closes_at));
    Slot {
        period,
        ends_at: Some(ends_at),
    }
}

pub fn plan(prev: &Period, next: &Period) -> Transition {
    if *prev == Period::Closed {
        return closed();
    }
    if prev == next {
        return Transition::default();
    }
    boundary(prev, next)
}

/// Like [`plan`], but two back-to-back intervals with the same label still
/// count as a change.
pub fn plan_slot(prev: &Slot, next: &Slot) -> Transition {
    if prev.period == Period::Closed {
        return closed();
    }
    if prev == next {
        return Transition::default();
    }
    boundary(&prev.period, &next.period)
}

fn closed() -> Transition {
    // Nothing leaves CLOSED; repeated polls stay halted.
    Transition {
        halt: true,
        ..Default::default()
    }
}

fn boundary(prev: &Period, next: &Period) -> Transition {
    let snapshot = match prev {
        Period::Class(label) => Some(label.clone()),
        _ => None,
    };
    Transition {
        snapshot,
        clear: true,
        halt: *next == Period::Closed,
    }
}
