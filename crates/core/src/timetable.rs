//! Weekly timetable model.
//!
//! Each weekday holds an ordered list of labelled intervals measured in
//! minutes since midnight. Membership is half-open: `[start, end)`.

use crate::error::RollcallError;
use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Minutes in a day; the largest valid interval end.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub day: Weekday,
    pub start_minute: u16,
    pub end_minute: u16,
    pub label: String,
    pub is_break: bool,
}

impl Interval {
    pub fn contains(&self, minute: u16) -> bool {
        self.start_minute <= minute && minute < self.end_minute
    }
}

/// On-disk row format for timetable files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalRow {
    /// Weekday name, short or long (`mon`, `Monday`)
    pub day: String,
    /// Start time as `HH:MM`
    pub start: String,
    /// End time as `HH:MM`
    pub end: String,
    pub label: String,
    #[serde(default, rename = "break")]
    pub is_break: bool,
}

impl TryFrom<IntervalRow> for Interval {
    type Error = RollcallError;

    fn try_from(row: IntervalRow) -> Result<Self, Self::Error> {
        let day = Weekday::from_str(row.day.trim())
            .map_err(|_| RollcallError::timetable(format!("unknown weekday '{}'", row.day)))?;
        let start_minute = parse_clock_minute(&row.start)?;
        let end_minute = parse_clock_minute(&row.end)?;
        if start_minute >= end_minute {
            return Err(RollcallError::timetable(format!(
                "interval '{}' on {} starts at {} but ends at {}",
                row.label, day, row.start, row.end
            )));
        }
        Ok(Self {
            day,
            start_minute,
            end_minute,
            label: row.label,
            is_break: row.is_break,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Timetable {
    // Indexed by `Weekday::num_days_from_monday`, declared order preserved.
    days: [Vec<Interval>; 7],
}

impl Timetable {
    pub fn new(intervals: Vec<Interval>) -> Self {
        let mut days: [Vec<Interval>; 7] = Default::default();
        for interval in intervals {
            days[interval.day.num_days_from_monday() as usize].push(interval);
        }
        Self { days }
    }

    pub fn from_rows(rows: Vec<IntervalRow>) -> Result<Self, RollcallError> {
        let intervals = rows
            .into_iter()
            .map(Interval::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(intervals))
    }

    /// Load a YAML list of `{day, start, end, label, break}` rows.
    pub fn load(path: &Path) -> Result<Self, RollcallError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RollcallError::timetable(format!("failed to read {}: {}", path.display(), e))
        })?;
        let rows: Vec<IntervalRow> = serde_yml::from_str(&content).map_err(|e| {
            RollcallError::timetable(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let timetable = Self::from_rows(rows)?;
        tracing::info!(
            "Loaded {} timetable intervals from {}",
            timetable.len(),
            path.display()
        );
        Ok(timetable)
    }

    pub fn intervals_for(&self, day: Weekday) -> &[Interval] {
        &self.days[day.num_days_from_monday() as usize]
    }

    /// First interval on `day` containing `minute`, in declared order.
    pub fn lookup(&self, day: Weekday, minute: u16) -> Option<&Interval> {
        self.intervals_for(day).iter().find(|i| i.contains(minute))
    }

    pub fn len(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Minutes since midnight, ignoring seconds.
pub fn minute_of_day(time: NaiveTime) -> u16 {
    (time.hour() * 60 + time.minute()) as u16
}

/// Parse `HH:MM` into minutes since midnight. `24:00` is accepted as the end
/// of the day.
pub fn parse_clock_minute(value: &str) -> Result<u16, RollcallError> {
    let invalid = || RollcallError::timetable(format!("invalid time '{}', expected HH:MM", value));
    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u16 = hours.parse().map_err(|_| invalid())?;
    let minutes: u16 = minutes.parse().map_err(|_| invalid())?;
    if hours > 24 || minutes >= 60 {
        return Err(invalid());
    }
    let total = hours * 60 + minutes;
    if total > MINUTES_PER_DAY {
        return Err(invalid());
    }
    Ok(total)
}
