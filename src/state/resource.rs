/// Resource type definitions for manifests and the files they name
use serde::Deserialize;
use std::fmt;

/// The `type` of a manifest output descriptor
///
/// Unknown types are kept as `Unsupported` so the coordinator can log and skip
/// them explicitly instead of silently dropping them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum LeafType {
    Location,
    Schedule,
    Slot,
    Unsupported(String),
}

impl LeafType {
    /// Parses the descriptor `type` string (exact, case-sensitive)
    pub fn parse(s: &str) -> Self {
        match s {
            "Location" => Self::Location,
            "Schedule" => Self::Schedule,
            "Slot" => Self::Slot,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Returns the ledger kind for supported types
    pub fn kind(&self) -> Option<LeafKind> {
        match self {
            Self::Location => Some(LeafKind::Location),
            Self::Schedule => Some(LeafKind::Schedule),
            Self::Slot => Some(LeafKind::Slot),
            Self::Unsupported(_) => None,
        }
    }
}

impl From<String> for LeafType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => f.write_str("Location"),
            Self::Schedule => f.write_str("Schedule"),
            Self::Slot => f.write_str("Slot"),
            Self::Unsupported(other) => write!(f, "Unsupported({})", other),
        }
    }
}

/// A leaf file kind that has its own ledger table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeafKind {
    Location,
    Schedule,
    Slot,
}

impl LeafKind {
    pub const ALL: [LeafKind; 3] = [Self::Location, Self::Schedule, Self::Slot];

    /// Ledger table holding fetches of this kind
    pub fn fetch_table(&self) -> &'static str {
        match self {
            Self::Location => "location_fetches",
            Self::Schedule => "schedule_fetches",
            Self::Slot => "slot_fetches",
        }
    }

    /// Join table linking fetches of this kind to `states`
    pub fn state_table(&self) -> &'static str {
        match self {
            Self::Location => "location_fetch_states",
            Self::Schedule => "schedule_fetch_states",
            Self::Slot => "slot_fetch_states",
        }
    }

    /// Foreign key column of the join table
    pub fn state_fk_column(&self) -> &'static str {
        match self {
            Self::Location => "location_fetch_id",
            Self::Schedule => "schedule_fetch_id",
            Self::Slot => "slot_fetch_id",
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ResourceKind::from(*self).fmt(f)
    }
}

/// Every kind of resource the crawler fetches, used for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Manifest,
    Location,
    Schedule,
    Slot,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::Location => "location",
            Self::Schedule => "schedule",
            Self::Slot => "slot",
        }
    }
}

impl From<LeafKind> for ResourceKind {
    fn from(kind: LeafKind) -> Self {
        match kind {
            LeafKind::Location => Self::Location,
            LeafKind::Schedule => Self::Schedule,
            LeafKind::Slot => Self::Slot,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
