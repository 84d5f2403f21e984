use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a ledger entry. Only movies and episodes are tracked; series and
/// seasons exist on the catalog side but never become watch records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    /// Name used by the rating provider's `type` parameter
    pub fn provider_type(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "series",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Episode => write!(f, "episode"),
        }
    }
}

/// Where a watch record came from.
///
/// Only `RemoteSync` records are ever merged by reconciliation. `Manual` and
/// `Imported` rows belong to the user and are left as they are.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Provenance {
    RemoteSync,
    Manual,
    Imported,
}

impl Provenance {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Provenance::RemoteSync)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::RemoteSync => write!(f, "remote-sync"),
            Provenance::Manual => write!(f, "manual"),
            Provenance::Imported => write!(f, "imported"),
        }
    }
}
