//! Events delivered by discovery backends
//!
//! Backends never touch an RPT directly. They produce [`HpiEvent`]s which the
//! registry applies through `apply_event`, so every mutation passes through
//! one serialized entry point.

use serde::{Deserialize, Serialize};

use crate::entity_path::EntityPath;
use crate::rdr::{Rdr, RecordId};
use crate::resource::{ResourceEntry, ResourceId};
use crate::uid::Uid;

/// How an event names an already discovered resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRef {
    Path(EntityPath),
    Uid(Uid),
}

impl From<EntityPath> for ResourceRef {
    fn from(path: EntityPath) -> Self {
        Self::Path(path)
    }
}

impl From<Uid> for ResourceRef {
    fn from(uid: Uid) -> Self {
        Self::Uid(uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HpiEvent {
    /// A resource appeared, optionally with its first batch of RDRs
    ResourceDiscovered {
        /// Backend-local id; the domain assigns its own
        #[serde(default)]
        proposed_id: Option<ResourceId>,
        entry: ResourceEntry,
        #[serde(default)]
        rdrs: Vec<Rdr>,
    },
    ResourceRemoved {
        resource: ResourceRef,
    },
    RdrDiscovered {
        parent: ResourceRef,
        rdr: Rdr,
    },
    RdrRemoved {
        parent: ResourceRef,
        record_id: RecordId,
    },
    /// Any kind this build does not understand
    #[serde(other)]
    Unknown,
}

impl HpiEvent {
    pub fn resource(entry: ResourceEntry) -> Self {
        Self::ResourceDiscovered {
            proposed_id: None,
            entry,
            rdrs: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceDiscovered { .. } => "resource_discovered",
            Self::ResourceRemoved { .. } => "resource_removed",
            Self::RdrDiscovered { .. } => "rdr_discovered",
            Self::RdrRemoved { .. } => "rdr_removed",
            Self::Unknown => "unknown",
        }
    }
}

/// What `apply_event` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    ResourceAdded(ResourceId),
    ResourceRemoved(ResourceId),
    RdrAdded(ResourceId, RecordId),
    RdrRemoved(ResourceId, RecordId),
    /// The event kind was not recognized and was skipped
    Unrecognized,
}

/// A discovery backend
///
/// Each call to `discover` reports what changed since the previous call.
pub trait EventSource: Send {
    fn name(&self) -> &str;

    fn discover(&mut self) -> anyhow::Result<Vec<HpiEvent>>;

    /// Told about an event it reported that the registry refused
    ///
    /// A source that only reports changes should forget whatever the event
    /// announced, so the next `discover` reports it again.
    fn rejected(&mut self, _event: &HpiEvent) {}
}
