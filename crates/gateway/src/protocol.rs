// Agent Telemetry Protocol
//
// Line-oriented text over TCP:
// 1. Agent sends its zone label as the first line
// 2. Server replies once with the roster ids, comma separated
// 3. Agent sends `<entity_id>,<rssi>` lines until it disconnects

use rollcall_core::EntityId;
use std::fmt;
use std::str::FromStr;

/// Longest line accepted from an agent, excluding the terminator
pub const MAX_LINE_LEN: usize = 4096;

/// One decoded telemetry line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub entity_id: EntityId,
    pub rssi: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    /// Wrong number of comma separated fields
    FieldCount(usize),
    InvalidEntityId(String),
    InvalidRssi(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::FieldCount(n) => write!(f, "expected 2 fields, got {}", n),
            Self::InvalidEntityId(v) => write!(f, "invalid entity id '{}'", v),
            Self::InvalidRssi(v) => write!(f, "invalid rssi '{}'", v),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl FromStr for Telemetry {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [id, rssi] = fields.as_slice() else {
            return Err(ProtocolError::FieldCount(fields.len()));
        };

        let entity_id = id
            .parse::<EntityId>()
            .map_err(|_| ProtocolError::InvalidEntityId(id.to_string()))?;
        let rssi = rssi
            .parse::<i32>()
            .map_err(|_| ProtocolError::InvalidRssi(rssi.to_string()))?;
        Ok(Self { entity_id, rssi })
    }
}

pub fn parse_telemetry(line: &str) -> Result<Telemetry, ProtocolError> {
    line.parse()
}

/// The agent's zone label; may be empty.
pub fn parse_label(line: &str) -> String {
    line.trim().to_string()
}

/// Reply sent once after the label, newline terminated.
pub fn format_roster_ids(ids: impl IntoIterator<Item = EntityId>) -> String {
    let mut reply = ids
        .into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    reply.push('\n');
    reply
}
