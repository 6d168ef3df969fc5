//! HPI Core - Entity identity and resource storage for HPI domains
//!
//! This crate provides the identity and storage layer of a platform
//! management service:
//! - Entity path text codec and manipulation
//! - UID interning of entity paths, persisted across restarts
//! - Resource Presence Tables holding resources and their RDRs
//! - Domains and a registry applying backend events under a re-entrant guard

pub mod domain;
pub mod entity_path;
pub mod error;
pub mod event;
pub mod guard;
pub mod rdr;
pub mod registry;
pub mod resource;
pub mod rpt;
pub mod uid;

pub use domain::{DomainConfig, DomainId, DomainInfo, SessionId};
pub use entity_path::{Entity, EntityPath, EntityType, MAX_ENTITY_PATH};
pub use error::{HpiError, Result};
pub use event::{EventOutcome, EventSource, HpiEvent, ResourceRef};
pub use guard::Guard;
pub use rdr::{Rdr, RdrPayload, RecordId, RecordType, MAX_TYPE_NUM};
pub use registry::Registry;
pub use resource::{Capabilities, Resource, ResourceEntry, ResourceId, Severity};
pub use rpt::{
    DuplicatePolicy, InsertFlags, PrivateData, Rpt, RptDiff, RptInfo, SPARE_RECORD_ID_BASE,
};
pub use uid::{Uid, UidTable};
