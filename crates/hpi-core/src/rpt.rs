//! Resource Presence Table
//!
//! An RPT stores the resources of one domain keyed by [`ResourceId`], each
//! owning an insertion-ordered collection of RDRs keyed by [`RecordId`].
//! The table itself is plain data; serialization of concurrent access is
//! the job of the [`Guard`](crate::guard::Guard) wrapping it.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::entity_path::EntityPath;
use crate::error::{HpiError, IdCounter, Result};
use crate::rdr::{Rdr, RecordId, RecordType, MAX_TYPE_NUM};
use crate::resource::{Resource, ResourceEntry, ResourceId};
use crate::uid::Uid;

/// First ResourceId of a fresh table unless configured otherwise
pub const RESOURCE_ID_BASE: u32 = 1;

/// First sensor number handed out within each resource
pub const SENSOR_NUM_BASE: u32 = 1;

/// First record id handed out when a derived id is already taken
///
/// Derived ids stay below `0x0006_0000`, so spare ids never shadow one.
pub const SPARE_RECORD_ID_BASE: u32 = 0x0100_0000;

/// Opaque data a backend attaches to a resource or RDR
pub type PrivateData = Arc<dyn Any + Send + Sync>;

bitflags! {
    /// Modifiers for add_resource / add_rdr
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InsertFlags: u32 {
        /// On update, keep previously attached private data when none is given
        const KEEP_DATA = 0x1;
    }
}

/// What to do when a resource is added at an entity path already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Update the live resource in place and return its existing id
    #[default]
    Update,
    /// Fail with `DuplicateEntity`
    Reject,
}

/// Change tracking for an RPT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RptInfo {
    pub resource_count: usize,
    pub update_count: u32,
    pub update_timestamp: Option<DateTime<Utc>>,
}

/// Result of comparing two tables by entity path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RptDiff {
    /// Resources that are new or whose entry changed
    pub new_resources: Vec<Resource>,
    /// RDRs that are new or changed, with their owner's entity path
    pub new_rdrs: Vec<(EntityPath, Rdr)>,
    /// Resources no longer present
    pub gone_resources: Vec<Resource>,
    /// RDRs no longer present on a resource that still exists
    pub gone_rdrs: Vec<(EntityPath, Rdr)>,
}

impl RptDiff {
    pub fn is_empty(&self) -> bool {
        self.new_resources.is_empty()
            && self.new_rdrs.is_empty()
            && self.gone_resources.is_empty()
            && self.gone_rdrs.is_empty()
    }
}

struct RdrSlot {
    rdr: Rdr,
    data: Option<PrivateData>,
}

struct ResourceSlot {
    resource: Resource,
    data: Option<PrivateData>,
    rdrs: IndexMap<RecordId, RdrSlot>,
    sensor_nums: IdCounter,
    spare_record_ids: IdCounter,
}

impl ResourceSlot {
    /// An id outside the derived range that no record of this resource holds
    fn fresh_record_id(&mut self) -> Result<RecordId> {
        loop {
            let candidate = RecordId(self.spare_record_ids.allocate()?);
            if !self.rdrs.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    fn rdr(&self, record_id: RecordId) -> Result<&RdrSlot> {
        self.rdrs.get(&record_id).ok_or_else(|| {
            HpiError::not_found(format!("rdr {record_id} in resource {}", self.resource.id))
        })
    }
}

/// The indexed store of resources and RDRs for one domain
pub struct Rpt {
    resources: BTreeMap<ResourceId, ResourceSlot>,
    by_path: HashMap<EntityPath, ResourceId>,
    resource_ids: IdCounter,
    policy: DuplicatePolicy,
    update_count: u32,
    update_timestamp: Option<DateTime<Utc>>,
}

impl Default for Rpt {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default(), RESOURCE_ID_BASE)
    }
}

impl std::fmt::Debug for Rpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rpt")
            .field("resources", &self.resources.len())
            .field("next_resource_id", &self.resource_ids.peek())
            .field("policy", &self.policy)
            .field("update_count", &self.update_count)
            .finish()
    }
}

impl Rpt {
    pub fn new(policy: DuplicatePolicy, resource_id_base: u32) -> Self {
        Self {
            resources: BTreeMap::new(),
            by_path: HashMap::new(),
            resource_ids: IdCounter::starting_at(resource_id_base, "resource id"),
            policy,
            update_count: 0,
            update_timestamp: None,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    fn touch(&mut self) {
        self.update_count = self.update_count.wrapping_add(1);
        self.update_timestamp = Some(Utc::now());
    }

    fn slot(&self, id: ResourceId) -> Result<&ResourceSlot> {
        self.resources
            .get(&id)
            .ok_or_else(|| HpiError::not_found(format!("resource {id}")))
    }

    fn slot_mut(&mut self, id: ResourceId) -> Result<&mut ResourceSlot> {
        self.resources
            .get_mut(&id)
            .ok_or_else(|| HpiError::not_found(format!("resource {id}")))
    }

    /// Store a resource under a freshly assigned id
    ///
    /// A live resource at the same entity path is updated in place (keeping
    /// its id and RDRs) or rejected, depending on the table's policy.
    pub fn add_resource(
        &mut self,
        entry: ResourceEntry,
        uid: Uid,
        data: Option<PrivateData>,
        flags: InsertFlags,
    ) -> Result<ResourceId> {
        if let Some(&existing) = self.by_path.get(&entry.entity_path) {
            if self.policy == DuplicatePolicy::Reject {
                return Err(HpiError::DuplicateEntity(format!(
                    "resource {existing} already at {}",
                    entry.entity_path
                )));
            }

            let slot = self.slot_mut(existing)?;
            slot.resource.entry = entry;
            slot.resource.uid = uid;
            overlay_data(&mut slot.data, data, flags);
            self.touch();
            debug!(resource = %existing, "Updated resource in place");
            return Ok(existing);
        }

        let id = ResourceId(self.resource_ids.allocate()?);
        self.by_path.insert(entry.entity_path.clone(), id);
        self.resources.insert(
            id,
            ResourceSlot {
                resource: Resource { id, uid, entry },
                data,
                rdrs: IndexMap::new(),
                sensor_nums: IdCounter::starting_at(SENSOR_NUM_BASE, "sensor number"),
                spare_record_ids: IdCounter::starting_at(SPARE_RECORD_ID_BASE, "record id"),
            },
        );
        self.touch();
        debug!(resource = %id, uid = %uid, "Added resource");
        Ok(id)
    }

    /// Delete a resource together with all of its RDRs
    pub fn remove_resource(&mut self, id: ResourceId) -> Result<()> {
        let slot = self
            .resources
            .remove(&id)
            .ok_or_else(|| HpiError::not_found(format!("resource {id}")))?;
        self.by_path.remove(slot.resource.entity_path());
        self.touch();
        debug!(resource = %id, rdrs = slot.rdrs.len(), "Removed resource");
        Ok(())
    }

    /// Remove every resource; id counters keep counting
    pub fn flush(&mut self) {
        self.resources.clear();
        self.by_path.clear();
        self.touch();
    }

    pub fn get_resource(&self, id: ResourceId) -> Result<Resource> {
        Ok(self.slot(id)?.resource.clone())
    }

    pub fn get_resource_by_path(&self, path: &EntityPath) -> Result<Resource> {
        let id = self
            .by_path
            .get(path)
            .ok_or_else(|| HpiError::not_found(format!("resource at {path}")))?;
        self.get_resource(*id)
    }

    /// The resource following `after` in id order, or the first one for `None`
    ///
    /// Returns `Ok(None)` past the end; fails if `after` is not present.
    pub fn get_resource_next(&self, after: Option<ResourceId>) -> Result<Option<Resource>> {
        let next = match after {
            None => self.resources.values().next(),
            Some(id) => {
                self.slot(id)?;
                self.resources
                    .range((std::ops::Bound::Excluded(id), std::ops::Bound::Unbounded))
                    .map(|(_, slot)| slot)
                    .next()
            }
        };
        Ok(next.map(|slot| slot.resource.clone()))
    }

    pub fn resource_data<T: Any + Send + Sync>(&self, id: ResourceId) -> Result<Option<Arc<T>>> {
        Ok(self
            .slot(id)?
            .data
            .clone()
            .and_then(|data| data.downcast::<T>().ok()))
    }

    /// Snapshot of every resource in id order
    pub fn resources(&self) -> Vec<Resource> {
        self.resources
            .values()
            .map(|slot| slot.resource.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Attach an RDR to a live resource
    ///
    /// A record carrying an id already present overlays that record in place,
    /// keeping its position and sensor number. Records with an unassigned id
    /// get one derived from their type and number; if a different record
    /// already holds the derived id, a fresh one is picked instead. Sensors
    /// get the owning resource's next sensor number.
    pub fn add_rdr(
        &mut self,
        id: ResourceId,
        mut rdr: Rdr,
        data: Option<PrivateData>,
        flags: InsertFlags,
    ) -> Result<RecordId> {
        let slot = self.slot_mut(id)?;
        let record_type = rdr.record_type();

        let overlaid = rdr
            .record_id
            .is_assigned()
            .then(|| slot.rdrs.get(&rdr.record_id))
            .flatten()
            .map(|existing| existing.rdr.sensor_num());

        let new_sensor = match overlaid {
            Some(Some(num)) => {
                rdr.set_sensor_num(num);
                false
            }
            _ => record_type == RecordType::Sensor,
        };
        if new_sensor {
            rdr.set_sensor_num(slot.sensor_nums.peek());
        }

        if !rdr.record_id.is_assigned() {
            let num = rdr.type_num();
            let derived = RecordId::derive(record_type, num).ok_or_else(|| {
                HpiError::InvalidRecord(format!(
                    "{record_type} number {num:#x} exceeds {MAX_TYPE_NUM:#x} in resource {id}"
                ))
            })?;
            let taken = slot.rdrs.get(&derived).is_some_and(|held| {
                held.rdr.record_type() != record_type || held.rdr.type_num() != num
            });
            rdr.record_id = if taken {
                slot.fresh_record_id()?
            } else {
                derived
            };
        }
        if new_sensor {
            slot.sensor_nums.allocate()?;
        }

        let record_id = rdr.record_id;
        match slot.rdrs.get_mut(&record_id) {
            Some(current) => {
                current.rdr = rdr;
                overlay_data(&mut current.data, data, flags);
            }
            None => {
                slot.rdrs.insert(record_id, RdrSlot { rdr, data });
            }
        }
        self.touch();
        debug!(resource = %id, record = %record_id, "Added rdr");
        Ok(record_id)
    }

    /// Record ids of a resource's sensors, in insertion order
    pub fn sensor_record_ids(&self, id: ResourceId) -> Result<Vec<RecordId>> {
        Ok(self
            .slot(id)?
            .rdrs
            .values()
            .filter(|s| s.rdr.record_type() == RecordType::Sensor)
            .map(|s| s.rdr.record_id)
            .collect())
    }

    pub fn remove_rdr(&mut self, id: ResourceId, record_id: RecordId) -> Result<()> {
        let slot = self.slot_mut(id)?;
        slot.rdrs
            .shift_remove(&record_id)
            .ok_or_else(|| HpiError::not_found(format!("rdr {record_id} in resource {id}")))?;
        self.touch();
        Ok(())
    }

    pub fn get_rdr_by_id(&self, id: ResourceId, record_id: RecordId) -> Result<Rdr> {
        Ok(self.slot(id)?.rdr(record_id)?.rdr.clone())
    }

    /// The `ordinal`-th (1-based) RDR of `record_type`, in insertion order
    pub fn get_rdr_by_type(
        &self,
        id: ResourceId,
        record_type: RecordType,
        ordinal: usize,
    ) -> Result<Rdr> {
        let slot = self.slot(id)?;
        ordinal
            .checked_sub(1)
            .and_then(|skip| {
                slot.rdrs
                    .values()
                    .filter(|s| s.rdr.record_type() == record_type)
                    .nth(skip)
            })
            .map(|s| s.rdr.clone())
            .ok_or_else(|| {
                HpiError::not_found(format!("{record_type} #{ordinal} in resource {id}"))
            })
    }

    /// The RDR of `record_type` carrying type-specific number `num`
    pub fn get_rdr_by_num(&self, id: ResourceId, record_type: RecordType, num: u32) -> Result<Rdr> {
        self.slot(id)?
            .rdrs
            .values()
            .find(|s| s.rdr.record_type() == record_type && s.rdr.type_num() == num)
            .map(|s| s.rdr.clone())
            .ok_or_else(|| HpiError::not_found(format!("{record_type} num {num} in resource {id}")))
    }

    /// The RDR following `after` in insertion order, or the first for `None`
    pub fn get_rdr_next(&self, id: ResourceId, after: Option<RecordId>) -> Result<Option<Rdr>> {
        let slot = self.slot(id)?;
        let index = match after {
            None => 0,
            Some(record_id) => {
                let current = slot.rdrs.get_index_of(&record_id).ok_or_else(|| {
                    HpiError::not_found(format!("rdr {record_id} in resource {id}"))
                })?;
                current + 1
            }
        };
        Ok(slot.rdrs.get_index(index).map(|(_, s)| s.rdr.clone()))
    }

    pub fn rdr_data<T: Any + Send + Sync>(
        &self,
        id: ResourceId,
        record_id: RecordId,
    ) -> Result<Option<Arc<T>>> {
        Ok(self
            .slot(id)?
            .rdr(record_id)?
            .data
            .clone()
            .and_then(|data| data.downcast::<T>().ok()))
    }

    /// Snapshot of a resource's RDRs in insertion order
    pub fn rdrs(&self, id: ResourceId) -> Result<Vec<Rdr>> {
        Ok(self
            .slot(id)?
            .rdrs
            .values()
            .map(|s| s.rdr.clone())
            .collect())
    }

    pub fn info(&self) -> RptInfo {
        RptInfo {
            resource_count: self.resources.len(),
            update_count: self.update_count,
            update_timestamp: self.update_timestamp,
        }
    }

    /// Compare this table against a newer one, matching resources by path
    pub fn diff(&self, newer: &Rpt) -> RptDiff {
        let mut diff = RptDiff::default();

        for slot in newer.resources.values() {
            let path = slot.resource.entity_path();
            let current = self
                .by_path
                .get(path)
                .and_then(|id| self.resources.get(id));

            if current.map(|c| &c.resource.entry) != Some(&slot.resource.entry) {
                diff.new_resources.push(slot.resource.clone());
            }
            for rdr_slot in slot.rdrs.values() {
                let unchanged = current
                    .and_then(|c| c.rdrs.get(&rdr_slot.rdr.record_id))
                    .is_some_and(|old| old.rdr == rdr_slot.rdr);
                if !unchanged {
                    diff.new_rdrs.push((path.clone(), rdr_slot.rdr.clone()));
                }
            }
        }

        for slot in self.resources.values() {
            let path = slot.resource.entity_path();
            match newer.by_path.get(path).and_then(|id| newer.resources.get(id)) {
                None => diff.gone_resources.push(slot.resource.clone()),
                Some(still_there) => {
                    for rdr_slot in slot.rdrs.values() {
                        if !still_there.rdrs.contains_key(&rdr_slot.rdr.record_id) {
                            diff.gone_rdrs.push((path.clone(), rdr_slot.rdr.clone()));
                        }
                    }
                }
            }
        }

        diff
    }
}

fn overlay_data(current: &mut Option<PrivateData>, new: Option<PrivateData>, flags: InsertFlags) {
    match new {
        Some(data) => *current = Some(data),
        None if flags.contains(InsertFlags::KEEP_DATA) => {}
        None => *current = None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdr::{ControlType, InventoryRecord, RdrPayload, SensorType};
    use crate::resource::Capabilities;

    fn entry(text: &str) -> ResourceEntry {
        ResourceEntry::new(EntityPath::parse(text).unwrap())
            .with_capabilities(Capabilities::RESOURCE | Capabilities::RDR)
    }

    fn blade(n: i32) -> ResourceEntry {
        entry(&format!("{{SYSTEM_CHASSIS,1}}{{SBC_BLADE,{n}}}"))
    }

    fn add(rpt: &mut Rpt, e: ResourceEntry) -> ResourceId {
        let uid = Uid(e.entity_path.leaf().map_or(0, |l| l.location as u32) + 100);
        rpt.add_resource(e, uid, None, InsertFlags::empty()).unwrap()
    }

    #[test]
    fn test_resource_ids_are_strictly_increasing() {
        let mut rpt = Rpt::default();
        let ids: Vec<ResourceId> = (0..5).map(|n| add(&mut rpt, blade(n))).collect();
        assert_eq!(ids[0], ResourceId(RESOURCE_ID_BASE));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_removal_does_not_reuse_ids() {
        let mut rpt = Rpt::default();
        let a = add(&mut rpt, blade(1));
        let b = add(&mut rpt, blade(2));
        rpt.remove_resource(b).unwrap();
        let c = add(&mut rpt, blade(3));
        assert!(c > b);
        assert_eq!(rpt.get_resource(a).unwrap().id, a);
        assert!(rpt.get_resource(b).unwrap_err().is_not_found());
        assert!(rpt.remove_resource(b).unwrap_err().is_not_found());
    }

    #[test]
    fn test_custom_resource_id_base() {
        let mut rpt = Rpt::new(DuplicatePolicy::Update, 1000);
        assert_eq!(add(&mut rpt, blade(1)), ResourceId(1000));
    }

    #[test]
    fn test_duplicate_path_updates_in_place() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        rpt.add_rdr(id, Rdr::sensor(SensorType::Fan), None, InsertFlags::empty())
            .unwrap();

        let again = rpt
            .add_resource(blade(1).with_tag("renamed"), Uid(101), None, InsertFlags::empty())
            .unwrap();
        assert_eq!(again, id);
        assert_eq!(rpt.len(), 1);
        assert_eq!(rpt.get_resource(id).unwrap().tag(), "renamed");
        assert_eq!(rpt.rdrs(id).unwrap().len(), 1, "rdrs survive an update");
    }

    #[test]
    fn test_duplicate_path_rejected_by_policy() {
        let mut rpt = Rpt::new(DuplicatePolicy::Reject, RESOURCE_ID_BASE);
        let id = add(&mut rpt, blade(1));
        let before = rpt.info().update_count;

        let err = rpt
            .add_resource(blade(1).with_tag("renamed"), Uid(101), None, InsertFlags::empty())
            .unwrap_err();
        assert!(matches!(err, HpiError::DuplicateEntity(_)));
        assert_eq!(rpt.get_resource(id).unwrap().tag(), "");
        assert_eq!(rpt.info().update_count, before);
    }

    #[test]
    fn test_lookup_by_path() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(7));
        let found = rpt.get_resource_by_path(&blade(7).entity_path).unwrap();
        assert_eq!(found.id, id);
        assert!(rpt
            .get_resource_by_path(&blade(8).entity_path)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_add_rdr_to_missing_resource_leaves_table_untouched() {
        let mut rpt = Rpt::default();
        for n in 0..10 {
            add(&mut rpt, blade(n));
        }
        let before = rpt.info();

        let err = rpt
            .add_rdr(ResourceId(4242), Rdr::sensor(SensorType::Voltage), None, InsertFlags::empty())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(rpt.info(), before);
    }

    #[test]
    fn test_sensor_numbers_are_per_resource() {
        let mut rpt = Rpt::default();
        let a = add(&mut rpt, blade(1));
        let b = add(&mut rpt, blade(2));

        let mut nums = Vec::new();
        for _ in 0..3 {
            let rec = rpt
                .add_rdr(a, Rdr::sensor(SensorType::Temperature), None, InsertFlags::empty())
                .unwrap();
            // Controls do not consume sensor numbers
            rpt.add_rdr(a, Rdr::control(nums.len() as u32, ControlType::Digital), None, InsertFlags::empty())
                .unwrap();
            nums.push(rpt.get_rdr_by_id(a, rec).unwrap().sensor_num().unwrap());
        }
        assert_eq!(nums, vec![SENSOR_NUM_BASE, SENSOR_NUM_BASE + 1, SENSOR_NUM_BASE + 2]);

        let rec = rpt
            .add_rdr(b, Rdr::sensor(SensorType::Fan), None, InsertFlags::empty())
            .unwrap();
        assert_eq!(rpt.get_rdr_by_id(b, rec).unwrap().sensor_num(), Some(SENSOR_NUM_BASE));
    }

    #[test]
    fn test_template_sensor_number_is_overwritten() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        let mut template = Rdr::sensor(SensorType::Current);
        template.set_sensor_num(99);

        let rec = rpt.add_rdr(id, template, None, InsertFlags::empty()).unwrap();
        let stored = rpt.get_rdr_by_id(id, rec).unwrap();
        assert_eq!(stored.sensor_num(), Some(SENSOR_NUM_BASE));
        assert_eq!(Some(rec), RecordId::derive(RecordType::Sensor, SENSOR_NUM_BASE));
    }

    #[test]
    fn test_overlay_keeps_position_and_sensor_number() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        let first = rpt
            .add_rdr(id, Rdr::sensor(SensorType::Temperature), None, InsertFlags::empty())
            .unwrap();
        rpt.add_rdr(id, Rdr::sensor(SensorType::Voltage), None, InsertFlags::empty())
            .unwrap();

        let mut update = Rdr::sensor(SensorType::Temperature).with_id_string("CPU temp");
        update.record_id = first;
        assert_eq!(rpt.add_rdr(id, update, None, InsertFlags::empty()).unwrap(), first);

        let rdrs = rpt.rdrs(id).unwrap();
        assert_eq!(rdrs.len(), 2);
        assert_eq!(rdrs[0].id_string, "CPU temp");
        assert_eq!(rdrs[0].sensor_num(), Some(SENSOR_NUM_BASE));
    }

    #[test]
    fn test_derived_id_never_replaces_another_record() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));

        let mut explicit = Rdr::sensor(SensorType::Voltage).with_id_string("volts a");
        explicit.record_id = RecordId(0x2_0002);
        rpt.add_rdr(id, explicit, None, InsertFlags::empty()).unwrap();

        // Gets sensor number 2, whose derived id is already taken
        let fresh = rpt
            .add_rdr(id, Rdr::sensor(SensorType::Voltage).with_id_string("volts b"), None, InsertFlags::empty())
            .unwrap();
        assert_ne!(fresh, RecordId(0x2_0002));
        assert!(fresh.0 >= SPARE_RECORD_ID_BASE);

        let rdrs = rpt.rdrs(id).unwrap();
        assert_eq!(rdrs.len(), 2);
        assert_eq!(rdrs[0].id_string, "volts a");
        assert_eq!(rdrs[1].id_string, "volts b");
        assert_eq!(rdrs[1].sensor_num(), Some(SENSOR_NUM_BASE + 1));

        // A control whose derived id is held by that sensor is kept apart too
        let mut squatter = Rdr::control(7, ControlType::Digital);
        squatter.record_id = RecordId(0x1_0003);
        rpt.add_rdr(id, squatter, None, InsertFlags::empty()).unwrap();
        let control = rpt
            .add_rdr(id, Rdr::control(3, ControlType::Analog), None, InsertFlags::empty())
            .unwrap();
        assert_ne!(control, RecordId(0x1_0003));
        assert_eq!(rpt.rdrs(id).unwrap().len(), 4);
    }

    #[test]
    fn test_same_control_number_overlays() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        let first = rpt
            .add_rdr(id, Rdr::control(4, ControlType::Digital), None, InsertFlags::empty())
            .unwrap();
        let again = rpt
            .add_rdr(id, Rdr::control(4, ControlType::Digital).with_id_string("LED"), None, InsertFlags::empty())
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(rpt.rdrs(id).unwrap().len(), 1);
        assert_eq!(rpt.get_rdr_by_id(id, first).unwrap().id_string, "LED");
    }

    #[test]
    fn test_wide_type_number_is_rejected() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        let sensor = rpt
            .add_rdr(id, Rdr::sensor(SensorType::Fan), None, InsertFlags::empty())
            .unwrap();
        let before = rpt.info();

        for num in [0x1_0001, 0xFFFF_0000] {
            let err = rpt
                .add_rdr(id, Rdr::control(num, ControlType::Digital), None, InsertFlags::empty())
                .unwrap_err();
            assert!(matches!(err, HpiError::InvalidRecord(_)));
        }
        assert_eq!(rpt.info(), before);
        assert_eq!(rpt.rdrs(id).unwrap().len(), 1);
        assert_eq!(rpt.get_rdr_by_id(id, sensor).unwrap().record_type(), RecordType::Sensor);
        assert!(rpt.rdrs(id).unwrap().iter().all(|r| r.record_id.is_assigned()));
    }

    #[test]
    fn test_sensor_record_ids() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        let a = rpt.add_rdr(id, Rdr::sensor(SensorType::Fan), None, InsertFlags::empty()).unwrap();
        rpt.add_rdr(id, Rdr::control(1, ControlType::Digital), None, InsertFlags::empty()).unwrap();
        let b = rpt.add_rdr(id, Rdr::sensor(SensorType::Fan), None, InsertFlags::empty()).unwrap();
        assert_eq!(rpt.sensor_record_ids(id).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_rdr_by_type_ordinal() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        rpt.add_rdr(id, Rdr::control(5, ControlType::Digital), None, InsertFlags::empty())
            .unwrap();
        rpt.add_rdr(id, Rdr::sensor(SensorType::Fan).with_id_string("fan a"), None, InsertFlags::empty())
            .unwrap();
        rpt.add_rdr(id, Rdr::control(9, ControlType::Analog), None, InsertFlags::empty())
            .unwrap();
        rpt.add_rdr(id, Rdr::sensor(SensorType::Fan).with_id_string("fan b"), None, InsertFlags::empty())
            .unwrap();

        assert_eq!(rpt.get_rdr_by_type(id, RecordType::Control, 2).unwrap().type_num(), 9);
        assert_eq!(rpt.get_rdr_by_type(id, RecordType::Sensor, 2).unwrap().id_string, "fan b");
        assert!(rpt.get_rdr_by_type(id, RecordType::Sensor, 0).is_err());
        assert!(rpt.get_rdr_by_type(id, RecordType::Sensor, 3).is_err());
        assert!(rpt.get_rdr_by_type(id, RecordType::Watchdog, 1).is_err());

        assert_eq!(rpt.get_rdr_by_num(id, RecordType::Control, 5).unwrap().type_num(), 5);
        assert!(rpt.get_rdr_by_num(id, RecordType::Control, 6).is_err());
    }

    #[test]
    fn test_rdr_cursor_and_removal() {
        let mut rpt = Rpt::default();
        let id = add(&mut rpt, blade(1));
        let a = rpt.add_rdr(id, Rdr::control(1, ControlType::Digital), None, InsertFlags::empty()).unwrap();
        let b = rpt.add_rdr(id, Rdr::control(2, ControlType::Digital), None, InsertFlags::empty()).unwrap();
        let c = rpt.add_rdr(id, Rdr::control(3, ControlType::Digital), None, InsertFlags::empty()).unwrap();

        assert_eq!(rpt.get_rdr_next(id, None).unwrap().unwrap().record_id, a);
        assert_eq!(rpt.get_rdr_next(id, Some(a)).unwrap().unwrap().record_id, b);

        rpt.remove_rdr(id, b).unwrap();
        assert_eq!(rpt.get_rdr_next(id, Some(a)).unwrap().unwrap().record_id, c);
        assert!(rpt.get_rdr_next(id, Some(c)).unwrap().is_none());
        assert!(rpt.get_rdr_next(id, Some(b)).is_err());
        assert!(rpt.remove_rdr(id, b).unwrap_err().is_not_found());
    }

    #[test]
    fn test_resource_cursor() {
        let mut rpt = Rpt::default();
        let a = add(&mut rpt, blade(1));
        let b = add(&mut rpt, blade(2));
        assert_eq!(rpt.get_resource_next(None).unwrap().unwrap().id, a);
        assert_eq!(rpt.get_resource_next(Some(a)).unwrap().unwrap().id, b);
        assert!(rpt.get_resource_next(Some(b)).unwrap().is_none());
        assert!(rpt.get_resource_next(Some(ResourceId(77))).is_err());
    }

    #[test]
    fn test_private_data() {
        #[derive(Debug, PartialEq)]
        struct Owner {
            handler: u32,
        }

        let mut rpt = Rpt::default();
        let data: PrivateData = Arc::new(Owner { handler: 3 });
        let id = rpt
            .add_resource(blade(1), Uid(1), Some(data), InsertFlags::empty())
            .unwrap();
        assert_eq!(rpt.resource_data::<Owner>(id).unwrap().unwrap().handler, 3);
        assert!(rpt.resource_data::<String>(id).unwrap().is_none());

        // KEEP_DATA retains the old data when an update brings none
        rpt.add_resource(blade(1), Uid(1), None, InsertFlags::KEEP_DATA)
            .unwrap();
        assert!(rpt.resource_data::<Owner>(id).unwrap().is_some());

        rpt.add_resource(blade(1), Uid(1), None, InsertFlags::empty())
            .unwrap();
        assert!(rpt.resource_data::<Owner>(id).unwrap().is_none());

        let reading: PrivateData = Arc::new(7u8);
        let rec = rpt
            .add_rdr(id, Rdr::sensor(SensorType::Fan), Some(reading), InsertFlags::empty())
            .unwrap();
        assert_eq!(*rpt.rdr_data::<u8>(id, rec).unwrap().unwrap(), 7);
    }

    #[test]
    fn test_update_tracking_and_flush() {
        let mut rpt = Rpt::default();
        assert_eq!(rpt.info().update_count, 0);
        assert!(rpt.info().update_timestamp.is_none());

        let id = add(&mut rpt, blade(1));
        rpt.add_rdr(id, Rdr::sensor(SensorType::Fan), None, InsertFlags::empty())
            .unwrap();
        let info = rpt.info();
        assert_eq!(info.update_count, 2);
        assert_eq!(info.resource_count, 1);
        assert!(info.update_timestamp.is_some());

        rpt.flush();
        assert!(rpt.is_empty());
        assert!(add(&mut rpt, blade(1)) > id, "flush keeps counting ids");
    }

    #[test]
    fn test_diff() {
        let mut old = Rpt::default();
        let keep = add(&mut old, blade(1));
        let gone = add(&mut old, blade(2));
        old.add_rdr(keep, Rdr::control(1, ControlType::Digital), None, InsertFlags::empty())
            .unwrap();
        old.add_rdr(gone, Rdr::control(1, ControlType::Digital), None, InsertFlags::empty())
            .unwrap();

        let mut new = Rpt::default();
        let keep_new = add(&mut new, blade(1));
        add(&mut new, blade(3));
        let inventory = Rdr::new(RdrPayload::Inventory(InventoryRecord {
            idr_id: 0,
            persistent: false,
        }));
        new.add_rdr(keep_new, inventory, None, InsertFlags::empty()).unwrap();

        let diff = old.diff(&new);
        assert_eq!(diff.new_resources.len(), 1);
        assert_eq!(diff.new_resources[0].entity_path(), &blade(3).entity_path);
        assert_eq!(diff.new_rdrs.len(), 1);
        assert_eq!(diff.new_rdrs[0].1.record_type(), RecordType::Inventory);
        assert_eq!(diff.gone_resources.len(), 1);
        assert_eq!(diff.gone_resources[0].entity_path(), &blade(2).entity_path);
        assert_eq!(diff.gone_rdrs.len(), 1);
        assert_eq!(diff.gone_rdrs[0].0, blade(1).entity_path);

        assert!(new.diff(&new).is_empty());
    }
}
