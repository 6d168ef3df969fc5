//! Registry of domains sharing one UID table
//!
//! All state lives behind a single re-entrant [`Guard`]. Lookups return
//! copies, so callers never keep a reference into the tables across a later
//! mutation.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::domain::{Domain, DomainConfig, DomainId, DomainInfo, SessionId};
use crate::entity_path::EntityPath;
use crate::error::{HpiError, IdCounter, Result};
use crate::event::{EventOutcome, HpiEvent, ResourceRef};
use crate::guard::Guard;
use crate::rdr::{Rdr, RecordId, RecordType};
use crate::resource::{Resource, ResourceEntry, ResourceId};
use crate::rpt::{InsertFlags, PrivateData, Rpt, RptDiff, RptInfo};
use crate::uid::{Uid, UidTable};

/// First DomainId handed out by a registry
pub const FIRST_DOMAIN_ID: u32 = 1;

#[derive(Debug)]
struct RegistryState {
    uids: UidTable,
    domains: BTreeMap<DomainId, Domain>,
    domain_ids: IdCounter,
}

impl RegistryState {
    fn domain(&self, id: DomainId) -> Result<&Domain> {
        self.domains
            .get(&id)
            .ok_or_else(|| HpiError::not_found(format!("domain {id}")))
    }

    fn domain_mut(&mut self, id: DomainId) -> Result<&mut Domain> {
        self.domains
            .get_mut(&id)
            .ok_or_else(|| HpiError::not_found(format!("domain {id}")))
    }

    fn resolve(&self, id: DomainId, target: &ResourceRef) -> Result<ResourceId> {
        let path = match target {
            ResourceRef::Path(path) => path,
            ResourceRef::Uid(uid) => self.uids.lookup(*uid)?,
        };
        Ok(self.domain(id)?.rpt.get_resource_by_path(path)?.id)
    }
}

/// Shared handle to every domain and the UID table
#[derive(Clone)]
pub struct Registry {
    state: Guard<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_uids(UidTable::new())
    }

    /// Start from a previously persisted UID table
    pub fn with_uids(uids: UidTable) -> Self {
        Self {
            state: Guard::new(RegistryState {
                uids,
                domains: BTreeMap::new(),
                domain_ids: IdCounter::starting_at(FIRST_DOMAIN_ID, "domain id"),
            }),
        }
    }

    pub fn create_domain(&self, config: DomainConfig) -> Result<DomainId> {
        self.state.write(|state| {
            let id = DomainId(state.domain_ids.allocate()?);
            info!(domain = %id, tag = %config.tag, policy = ?config.duplicate_policy, "Created domain");
            state.domains.insert(id, Domain::new(id, config));
            Ok(id)
        })
    }

    /// Drop a domain with its RPT and sessions; UIDs stay interned
    pub fn destroy_domain(&self, id: DomainId) -> Result<()> {
        self.state.write(|state| {
            let domain = state
                .domains
                .remove(&id)
                .ok_or_else(|| HpiError::not_found(format!("domain {id}")))?;
            info!(domain = %id, resources = domain.rpt.len(), "Destroyed domain");
            Ok(())
        })
    }

    pub fn domain_ids(&self) -> Vec<DomainId> {
        self.state.read(|state| state.domains.keys().copied().collect())
    }

    pub fn domain_info(&self, id: DomainId) -> Result<DomainInfo> {
        self.state.read(|state| Ok(state.domain(id)?.info()))
    }

    pub fn find_domain(&self, tag: &str) -> Option<DomainId> {
        self.state.read(|state| {
            state
                .domains
                .values()
                .find(|domain| domain.tag() == tag)
                .map(Domain::id)
        })
    }

    pub fn attach_session(&self, id: DomainId, session: SessionId) -> Result<()> {
        self.state
            .write(|state| state.domain_mut(id)?.attach_session(session))
    }

    pub fn detach_session(&self, id: DomainId, session: SessionId) -> Result<()> {
        self.state
            .write(|state| state.domain_mut(id)?.detach_session(session))
    }

    pub fn sessions(&self, id: DomainId) -> Result<Vec<SessionId>> {
        self.state
            .read(|state| Ok(state.domain(id)?.sessions().to_vec()))
    }

    // UID table

    pub fn intern(&self, path: &EntityPath) -> Result<Uid> {
        self.state.write(|state| state.uids.intern(path))
    }

    pub fn lookup_uid(&self, uid: Uid) -> Result<EntityPath> {
        self.state.read(|state| state.uids.lookup(uid).cloned())
    }

    pub fn uid_of(&self, path: &EntityPath) -> Result<Uid> {
        self.state.read(|state| state.uids.uid_of(path))
    }

    pub fn save_uid_map(&self, path: &Path) -> Result<()> {
        self.state.read(|state| state.uids.save(path))
    }

    // RPT

    /// Intern the entry's path and store it in the domain's RPT
    pub fn add_resource(
        &self,
        id: DomainId,
        entry: ResourceEntry,
        data: Option<PrivateData>,
        flags: InsertFlags,
    ) -> Result<ResourceId> {
        self.state.write(|state| {
            state.domain(id)?;
            let uid = state.uids.intern(&entry.entity_path)?;
            state.domain_mut(id)?.rpt.add_resource(entry, uid, data, flags)
        })
    }

    pub fn remove_resource(&self, id: DomainId, resource: ResourceId) -> Result<()> {
        self.state
            .write(|state| state.domain_mut(id)?.rpt.remove_resource(resource))
    }

    pub fn get_resource(&self, id: DomainId, resource: ResourceId) -> Result<Resource> {
        self.state
            .read(|state| state.domain(id)?.rpt.get_resource(resource))
    }

    pub fn get_resource_by_path(&self, id: DomainId, path: &EntityPath) -> Result<Resource> {
        self.state
            .read(|state| state.domain(id)?.rpt.get_resource_by_path(path))
    }

    pub fn get_resource_next(
        &self,
        id: DomainId,
        after: Option<ResourceId>,
    ) -> Result<Option<Resource>> {
        self.state
            .read(|state| state.domain(id)?.rpt.get_resource_next(after))
    }

    /// Iterate over a snapshot of the domain's resources taken now
    pub fn iterate(&self, id: DomainId) -> Result<impl Iterator<Item = Resource>> {
        let snapshot = self
            .state
            .read(|state| Ok::<_, HpiError>(state.domain(id)?.rpt.resources()))?;
        Ok(snapshot.into_iter())
    }

    pub fn flush(&self, id: DomainId) -> Result<()> {
        self.state.write(|state| {
            state.domain_mut(id)?.rpt.flush();
            Ok(())
        })
    }

    pub fn add_rdr(
        &self,
        id: DomainId,
        resource: ResourceId,
        rdr: Rdr,
        data: Option<PrivateData>,
        flags: InsertFlags,
    ) -> Result<RecordId> {
        self.state
            .write(|state| state.domain_mut(id)?.rpt.add_rdr(resource, rdr, data, flags))
    }

    pub fn remove_rdr(&self, id: DomainId, resource: ResourceId, record_id: RecordId) -> Result<()> {
        self.state
            .write(|state| state.domain_mut(id)?.rpt.remove_rdr(resource, record_id))
    }

    pub fn get_rdr_by_id(
        &self,
        id: DomainId,
        resource: ResourceId,
        record_id: RecordId,
    ) -> Result<Rdr> {
        self.state
            .read(|state| state.domain(id)?.rpt.get_rdr_by_id(resource, record_id))
    }

    pub fn get_rdr_by_type(
        &self,
        id: DomainId,
        resource: ResourceId,
        record_type: RecordType,
        ordinal: usize,
    ) -> Result<Rdr> {
        self.state.read(|state| {
            state
                .domain(id)?
                .rpt
                .get_rdr_by_type(resource, record_type, ordinal)
        })
    }

    pub fn get_rdr_by_num(
        &self,
        id: DomainId,
        resource: ResourceId,
        record_type: RecordType,
        num: u32,
    ) -> Result<Rdr> {
        self.state
            .read(|state| state.domain(id)?.rpt.get_rdr_by_num(resource, record_type, num))
    }

    pub fn get_rdr_next(
        &self,
        id: DomainId,
        resource: ResourceId,
        after: Option<RecordId>,
    ) -> Result<Option<Rdr>> {
        self.state
            .read(|state| state.domain(id)?.rpt.get_rdr_next(resource, after))
    }

    pub fn rdrs(&self, id: DomainId, resource: ResourceId) -> Result<Vec<Rdr>> {
        self.state
            .read(|state| state.domain(id)?.rpt.rdrs(resource))
    }

    pub fn rpt_info(&self, id: DomainId) -> Result<RptInfo> {
        self.state.read(|state| Ok(state.domain(id)?.rpt.info()))
    }

    /// Diff the domain's RPT against a table produced by a fresh scan
    pub fn diff(&self, id: DomainId, newer: &Rpt) -> Result<RptDiff> {
        self.state
            .read(|state| Ok(state.domain(id)?.rpt.diff(newer)))
    }

    /// Apply one backend event to a domain
    ///
    /// A resource and its accompanying RDRs are applied under one hold of the
    /// guard, so readers see either none or all of them. When the resource is
    /// already present, unassigned sensors in the batch overlay its existing
    /// sensors by position, keeping their record ids and sensor numbers.
    pub fn apply_event(&self, id: DomainId, event: HpiEvent) -> Result<EventOutcome> {
        let _held = self.state.hold();

        match event {
            HpiEvent::ResourceDiscovered {
                proposed_id,
                entry,
                rdrs,
            } => {
                let path = entry.entity_path.clone();
                let resource = self.add_resource(id, entry, None, InsertFlags::KEEP_DATA)?;
                debug!(domain = %id, resource = %resource, proposed = ?proposed_id, entity_path = %path, "Applied resource event");

                // A rediscovered resource already has its sensors; re-reported
                // ones take their place in order instead of being appended
                let mut known_sensors = self
                    .state
                    .read(|state| state.domain(id)?.rpt.sensor_record_ids(resource))?
                    .into_iter();
                for mut rdr in rdrs {
                    if rdr.entity_path.is_empty() {
                        rdr.entity_path = path.clone();
                    }
                    if rdr.record_type() == RecordType::Sensor && !rdr.record_id.is_assigned() {
                        if let Some(record_id) = known_sensors.next() {
                            rdr.record_id = record_id;
                        }
                    }
                    self.add_rdr(id, resource, rdr, None, InsertFlags::KEEP_DATA)?;
                }
                Ok(EventOutcome::ResourceAdded(resource))
            }
            HpiEvent::ResourceRemoved { resource } => {
                let rid = self.state.read(|state| state.resolve(id, &resource))?;
                self.remove_resource(id, rid)?;
                Ok(EventOutcome::ResourceRemoved(rid))
            }
            HpiEvent::RdrDiscovered { parent, mut rdr } => {
                let rid = self.state.read(|state| state.resolve(id, &parent))?;
                if rdr.entity_path.is_empty() {
                    rdr.entity_path = self.get_resource(id, rid)?.entry.entity_path;
                }
                let record_id = self.add_rdr(id, rid, rdr, None, InsertFlags::KEEP_DATA)?;
                Ok(EventOutcome::RdrAdded(rid, record_id))
            }
            HpiEvent::RdrRemoved { parent, record_id } => {
                let rid = self.state.read(|state| state.resolve(id, &parent))?;
                self.remove_rdr(id, rid, record_id)?;
                Ok(EventOutcome::RdrRemoved(rid, record_id))
            }
            HpiEvent::Unknown => {
                warn!(domain = %id, "Skipping unrecognized event");
                Ok(EventOutcome::Unrecognized)
            }
        }
    }
}
