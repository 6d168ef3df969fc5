//! Resource types stored in a Resource Presence Table

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity_path::EntityPath;
use crate::uid::Uid;

/// Domain-scoped resource identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// What a resource can do, in the HPI capability bit layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Capabilities: u32 {
        const SENSOR = 0x0000_0001;
        const RDR = 0x0000_0002;
        const EVENT_LOG = 0x0000_0004;
        const INVENTORY_DATA = 0x0000_0008;
        const RESET = 0x0000_0010;
        const POWER = 0x0000_0020;
        const ANNUNCIATOR = 0x0000_0040;
        const FRU = 0x0000_0100;
        const CONTROL = 0x0000_0200;
        const WATCHDOG = 0x0000_0400;
        const MANAGED_HOTSWAP = 0x0000_0800;
        const CONFIGURATION = 0x0000_1000;
        const AGGREGATE_STATUS = 0x0000_2000;
        const LOAD_ID = 0x0000_4000;
        const EVT_DEASSERTS = 0x0000_8000;
        const DIMI = 0x0001_0000;
        const FUMI = 0x0002_0000;
        const RESOURCE = 0x4000_0000;
    }
}

/// Severity a resource reports its events with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Informational,
    #[default]
    Ok,
}

/// Resource description as proposed by a discovering backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Where the resource sits in the hardware hierarchy
    pub entity_path: EntityPath,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub severity: Severity,
    /// Free-form tag/comment
    #[serde(default)]
    pub tag: String,
}

impl ResourceEntry {
    pub fn new(entity_path: EntityPath) -> Self {
        Self {
            entity_path,
            capabilities: Capabilities::RESOURCE,
            severity: Severity::default(),
            tag: String::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Snapshot of a resource held by an RPT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Identifier assigned by the owning domain
    pub id: ResourceId,
    /// Interned identity of the entity path
    pub uid: Uid,
    pub entry: ResourceEntry,
}

impl Resource {
    pub fn entity_path(&self) -> &EntityPath {
        &self.entry.entity_path
    }

    pub fn capabilities(&self) -> Capabilities {
        self.entry.capabilities
    }

    pub fn tag(&self) -> &str {
        &self.entry.tag
    }
}
