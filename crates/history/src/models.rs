use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Location recorded for entities nobody saw during the period.
pub const NOT_FOUND: &str = "not found";

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    /// Seen in a safe zone
    Present,
    /// Not seen at all
    Absent,
    /// Seen, but outside every safe zone
    AbsentAnomaly,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::Absent => "ABSENT",
            Self::AbsentAnomaly => "ABSENT_ANOMALY",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESENT" => Ok(Self::Present),
            "ABSENT" => Ok(Self::Absent),
            "ABSENT_ANOMALY" => Ok(Self::AbsentAnomaly),
            other => Err(format!("unknown attendance status '{}'", other)),
        }
    }
}

/// One reconciled roster line, shared by history rows and report rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub entity_id: EntityId,
    pub name: String,
    pub label: String,
    pub status: AttendanceStatus,
    pub location: String,
}

/// Persisted history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub entity_id: EntityId,
    pub date: NaiveDate,
    pub label: String,
    pub status: AttendanceStatus,
    pub location: String,
    pub generated_at: NaiveDateTime,
}

impl HistoryRecord {
    pub fn from_row(row: &AttendanceRow, generated_at: NaiveDateTime) -> Self {
        Self {
            entity_id: row.entity_id,
            date: generated_at.date(),
            label: row.label.clone(),
            status: row.status,
            location: row.location.clone(),
            generated_at,
        }
    }
}

impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>6} {:<16} {:<14} {} ({})",
            self.date.format(DATE_FORMAT),
            self.entity_id,
            self.label,
            self.status,
            self.location,
            self.generated_at.format("%H:%M:%S")
        )
    }
}

/// Filter for reading history back
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub date: Option<NaiveDate>,
    pub label: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::AbsentAnomaly,
        ] {
            assert_eq!(status.as_str().parse::<AttendanceStatus>().unwrap(), status);
        }
        assert!("LATE".parse::<AttendanceStatus>().is_err());
    }
}
