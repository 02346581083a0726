use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FalsifyError;

const SLOT_PREFIX: &str = "pool-wt-";

/// Stable identifier of a pooled workspace, rendered as `pool-wt-NNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", SLOT_PREFIX, self.0)
    }
}

impl FromStr for SlotId {
    type Err = FalsifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(SLOT_PREFIX)
            .and_then(|n| n.parse().ok())
            .map(SlotId)
            .ok_or_else(|| FalsifyError::Other(format!("Invalid slot id: {}", s)))
    }
}

impl Serialize for SlotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Available,
    Allocated,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Allocated => write!(f, "ALLOCATED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSlot {
    pub id: SlotId,
    pub path: PathBuf,
    pub state: SlotState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}
