//! UID interning: stable numeric identities for entity paths
//!
//! The table only ever grows. Removing a resource from a domain leaves its
//! mapping in place so that the UID stays a valid historical reference and a
//! resource that comes back at the same entity path gets the same UID.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::entity_path::EntityPath;
use crate::error::{HpiError, IdCounter, Result};

/// First UID handed out by a fresh table
pub const FIRST_UID: u32 = 1;

/// Process-stable identifier of an entity path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional EntityPath <-> UID mapping
#[derive(Debug, Clone)]
pub struct UidTable {
    by_path: HashMap<EntityPath, Uid>,
    by_uid: BTreeMap<Uid, EntityPath>,
    next: IdCounter,
}

impl Default for UidTable {
    fn default() -> Self {
        Self::new()
    }
}

impl UidTable {
    pub fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            by_uid: BTreeMap::new(),
            next: IdCounter::starting_at(FIRST_UID, "uid"),
        }
    }

    /// Return the UID of `path`, allocating one the first time it is seen
    pub fn intern(&mut self, path: &EntityPath) -> Result<Uid> {
        if let Some(uid) = self.by_path.get(path) {
            return Ok(*uid);
        }

        let uid = Uid(self.next.allocate()?);
        self.by_path.insert(path.clone(), uid);
        self.by_uid.insert(uid, path.clone());
        debug!(uid = %uid, entity_path = %path, "Interned entity path");
        Ok(uid)
    }

    /// Reverse lookup
    pub fn lookup(&self, uid: Uid) -> Result<&EntityPath> {
        self.by_uid
            .get(&uid)
            .ok_or_else(|| HpiError::not_found(format!("uid {uid}")))
    }

    /// Forward lookup without allocating
    pub fn uid_of(&self, path: &EntityPath) -> Result<Uid> {
        self.by_path
            .get(path)
            .copied()
            .ok_or_else(|| HpiError::not_found(format!("uid for {path}")))
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }

    /// The UID the next new entity path will receive
    pub fn next_uid(&self) -> Uid {
        Uid(self.next.peek())
    }

    /// Write the full mapping and counter to a JSON map file
    pub fn save(&self, path: &Path) -> Result<()> {
        let map = UidMapFile {
            version: default_version(),
            next_uid: self.next.peek(),
            entries: self
                .by_uid
                .iter()
                .map(|(uid, entity_path)| UidMapEntry {
                    uid: *uid,
                    entity_path: entity_path.clone(),
                })
                .collect(),
        };

        let content = serde_json::to_string_pretty(&map)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!(path = %path.display(), count = map.entries.len(), "Saved UID map");
        Ok(())
    }

    /// Rebuild a table from a map file written by [`UidTable::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let map: UidMapFile = serde_json::from_str(&content)?;

        let mut table = Self::new();
        let mut highest = FIRST_UID.saturating_sub(1);
        for entry in map.entries {
            if table.by_path.contains_key(&entry.entity_path)
                || table.by_uid.contains_key(&entry.uid)
            {
                return Err(HpiError::DuplicateEntity(format!(
                    "uid map entry {} -> {}",
                    entry.uid, entry.entity_path
                )));
            }
            highest = highest.max(entry.uid.0);
            table.by_path.insert(entry.entity_path.clone(), entry.uid);
            table.by_uid.insert(entry.uid, entry.entity_path);
        }

        // Never hand out a UID that the file already records
        let next = match highest.checked_add(1) {
            Some(after_highest) => map.next_uid.max(after_highest),
            None => return Err(HpiError::Exhausted("uid")),
        };
        table.next = IdCounter::starting_at(next, "uid");

        info!(path = %path.display(), count = table.len(), "Loaded UID map");
        Ok(table)
    }

    /// Load the map file if it exists, otherwise start empty
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UidMapFile {
    #[serde(default = "default_version")]
    version: String,
    next_uid: u32,
    #[serde(default)]
    entries: Vec<UidMapEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UidMapEntry {
    uid: Uid,
    entity_path: EntityPath,
}

fn default_version() -> String {
    "1.0".to_string()
}
