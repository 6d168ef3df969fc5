//! Simulator handler backed by an inventory file
//!
//! Every rescan reads the inventory into a fresh local RPT and reports the
//! difference to the previous scan as discovery events, the same way a
//! hardware-polling handler reports what appeared or went away.

use anyhow::{Context, Result};
use hpi_core::{
    Capabilities, EntityPath, EventSource, HpiEvent, InsertFlags, Rdr, ResourceEntry,
    ResourceRef, Rpt, Severity, UidTable,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Inventory file layout
#[derive(Debug, Deserialize)]
pub struct Inventory {
    /// Prefix appended root-ward to every resource path
    #[serde(default)]
    pub root: Option<EntityPath>,
    #[serde(default, rename = "resource")]
    pub resources: Vec<InventoryResource>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryResource {
    pub entity_path: EntityPath,
    #[serde(default = "default_capabilities")]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub tag: String,
    #[serde(default, rename = "rdr")]
    pub rdrs: Vec<Rdr>,
}

fn default_capabilities() -> Capabilities {
    Capabilities::RESOURCE
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading inventory {}", path.display()))?;
        let inventory = toml::from_str(&content)
            .with_context(|| format!("parsing inventory {}", path.display()))?;
        Ok(inventory)
    }

    /// Build the table this inventory describes
    fn to_rpt(&self, uids: &mut UidTable) -> Result<Rpt> {
        let mut rpt = Rpt::default();
        for item in &self.resources {
            let entity_path = match &self.root {
                Some(root) => item.entity_path.concat(root)?,
                None => item.entity_path.clone(),
            };
            let mut entry = ResourceEntry::new(entity_path.clone())
                .with_capabilities(item.capabilities)
                .with_tag(item.tag.clone());
            entry.severity = item.severity;

            let uid = uids.intern(&entity_path)?;
            let id = rpt.add_resource(entry, uid, None, InsertFlags::empty())?;
            for rdr in &item.rdrs {
                let mut rdr = rdr.clone();
                if rdr.entity_path.is_empty() {
                    rdr.entity_path = entity_path.clone();
                }
                rpt.add_rdr(id, rdr, None, InsertFlags::empty())?;
            }
        }
        Ok(rpt)
    }
}

pub struct Simulator {
    name: String,
    inventory: PathBuf,
    uids: UidTable,
    last: Rpt,
}

impl Simulator {
    pub fn new(name: impl Into<String>, inventory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            inventory: inventory.into(),
            uids: UidTable::new(),
            last: Rpt::default(),
        }
    }

    fn scan(&mut self) -> Result<Vec<HpiEvent>> {
        let inventory = Inventory::load(&self.inventory)?;
        let current = inventory.to_rpt(&mut self.uids)?;
        let diff = self.last.diff(&current);

        let mut events = Vec::new();
        for (parent, rdr) in diff.gone_rdrs {
            events.push(HpiEvent::RdrRemoved {
                parent: parent.into(),
                record_id: rdr.record_id,
            });
        }
        for resource in diff.gone_resources {
            events.push(HpiEvent::ResourceRemoved {
                resource: resource.entry.entity_path.into(),
            });
        }

        let mut announced: HashSet<EntityPath> = HashSet::new();
        for resource in diff.new_resources {
            announced.insert(resource.entity_path().clone());
            events.push(HpiEvent::ResourceDiscovered {
                proposed_id: Some(resource.id),
                rdrs: current.rdrs(resource.id)?,
                entry: resource.entry,
            });
        }
        for (parent, rdr) in diff.new_rdrs {
            if !announced.contains(&parent) {
                events.push(HpiEvent::RdrDiscovered {
                    parent: parent.into(),
                    rdr,
                });
            }
        }

        self.last = current;
        Ok(events)
    }

    /// Drop what a refused event announced from the last scan
    fn forget(&mut self, event: &HpiEvent) -> Result<()> {
        match event {
            HpiEvent::ResourceDiscovered { entry, .. } => {
                let resource = self.last.get_resource_by_path(&entry.entity_path)?;
                self.last.remove_resource(resource.id)?;
            }
            HpiEvent::RdrDiscovered {
                parent: ResourceRef::Path(path),
                rdr,
            } => {
                let resource = self.last.get_resource_by_path(path)?;
                self.last.remove_rdr(resource.id, rdr.record_id)?;
            }
            // A refused removal leaves nothing behind to report again
            _ => {}
        }
        Ok(())
    }
}

impl EventSource for Simulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn discover(&mut self) -> Result<Vec<HpiEvent>> {
        let events = self.scan()?;
        if events.is_empty() {
            debug!(handler = %self.name, "Inventory unchanged");
        } else {
            info!(handler = %self.name, events = events.len(), "Inventory changed");
        }
        Ok(events)
    }

    fn rejected(&mut self, event: &HpiEvent) {
        if let Err(e) = self.forget(event) {
            warn!(handler = %self.name, kind = event.kind(), error = %e, "Cannot requeue refused event");
        }
    }
}
