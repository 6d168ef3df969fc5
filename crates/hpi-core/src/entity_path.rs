//! Entity paths: hierarchical addresses of physical and logical hardware
//!
//! The canonical text form lists segments from the outermost (root-ward)
//! element to the leaf, e.g. `{SYSTEM_CHASSIS,2}{PROCESSOR_BOARD,0}`.
//! In memory the order is inverted: index 0 is the leaf and increasing
//! indices walk outward toward the chassis.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HpiError, Result};

/// Maximum number of segments an entity path can hold
pub const MAX_ENTITY_PATH: usize = 16;

/// Hardware category tag of an entity path segment
///
/// Stored as the raw numeric value so that categories reported by a backend
/// but missing from the name table can still be carried around; such paths
/// fail [`EntityPath::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub u32);

macro_rules! entity_types {
    ($($name:ident = $value:expr),* $(,)?) => {
        impl EntityType {
            $(pub const $name: Self = Self($value);)*
        }

        const ENTITY_TYPE_NAMES: &[(&str, EntityType)] = &[
            $((stringify!($name), EntityType::$name)),*
        ];
    };
}

entity_types! {
    UNSPECIFIED = 0,
    OTHER = 1,
    UNKNOWN = 2,
    PROCESSOR = 3,
    DISK_BAY = 4,
    PERIPHERAL_BAY = 5,
    SYS_MGMNT_MODULE = 6,
    SYSTEM_BOARD = 7,
    MEMORY_MODULE = 8,
    PROCESSOR_MODULE = 9,
    POWER_SUPPLY = 10,
    ADD_IN_CARD = 11,
    FRONT_PANEL_BOARD = 12,
    BACK_PANEL_BOARD = 13,
    POWER_SYSTEM_BOARD = 14,
    DRIVE_BACKPLANE = 15,
    SYS_EXPANSION_BOARD = 16,
    OTHER_SYSTEM_BOARD = 17,
    PROCESSOR_BOARD = 18,
    POWER_UNIT = 19,
    POWER_MODULE = 20,
    POWER_MGMNT = 21,
    CHASSIS_BACK_PANEL_BOARD = 22,
    SYSTEM_CHASSIS = 23,
    SUB_CHASSIS = 24,
    OTHER_CHASSIS_BOARD = 25,
    DISK_DRIVE_BAY = 26,
    PERIPHERAL_BAY_2 = 27,
    DEVICE_BAY = 28,
    COOLING_DEVICE = 29,
    COOLING_UNIT = 30,
    INTERCONNECT = 31,
    MEMORY_DEVICE = 32,
    SYS_MGMNT_SOFTWARE = 33,
    BIOS = 34,
    OPERATING_SYSTEM = 35,
    SYSTEM_BUS = 36,
    GROUP = 37,
    REMOTE = 38,
    EXTERNAL_ENVIRONMENT = 39,
    BATTERY = 40,
    CHASSIS_SPECIFIC = 0x90,
    BOARD_SET_SPECIFIC = 0xB0,
    OEM_SYSINT_SPECIFIC = 0xD0,
    ROOT = 0xFFFF,
    RACK = 0x1_0000,
    SUBRACK = 0x1_0001,
    COMPACTPCI_CHASSIS = 0x1_0002,
    ADVANCEDTCA_CHASSIS = 0x1_0003,
    SYSTEM_SLOT = 0x1_0004,
    SBC_BLADE = 0x1_0005,
    IO_BLADE = 0x1_0006,
    DISK_BLADE = 0x1_0007,
    DISK_DRIVE = 0x1_0008,
    FAN = 0x1_0009,
    POWER_DISTRIBUTION_UNIT = 0x1_000A,
    SPEC_PROC_BLADE = 0x1_000B,
    IO_SUBBOARD = 0x1_000C,
    SBC_SUBBOARD = 0x1_000D,
    ALARM_MANAGER = 0x1_000E,
    ALARM_MANAGER_BLADE = 0x1_000F,
    SUBBOARD_CARRIER_BLADE = 0x1_0010,
}

impl EntityType {
    /// Canonical name, or `None` for a category outside the name table
    pub fn name(self) -> Option<&'static str> {
        ENTITY_TYPE_NAMES
            .iter()
            .find(|(_, ty)| *ty == self)
            .map(|(name, _)| *name)
    }

    /// Case-sensitive lookup in the name table
    pub fn from_name(name: &str) -> Option<Self> {
        ENTITY_TYPE_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ty)| *ty)
    }

    pub fn is_known(self) -> bool {
        self.name().is_some()
    }

    /// Every named category, in table order
    pub fn all() -> impl Iterator<Item = EntityType> {
        ENTITY_TYPE_NAMES.iter().map(|(_, ty)| *ty)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// One `(type, location)` segment of an entity path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub location: i32,
}

impl Entity {
    pub fn new(entity_type: EntityType, location: i32) -> Self {
        Self {
            entity_type,
            location,
        }
    }
}

/// Bounded, leaf-first sequence of entity segments
///
/// Ordering is lexicographic over `(type, location)` from the leaf outward,
/// with a strict prefix ordering before any longer path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityPath {
    entries: Vec<Entity>,
}

impl EntityPath {
    /// The empty root placeholder
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from leaf-first segments
    pub fn from_entries(entries: impl IntoIterator<Item = Entity>) -> Result<Self> {
        let entries: Vec<Entity> = entries.into_iter().collect();
        if entries.len() > MAX_ENTITY_PATH {
            return Err(HpiError::PathOverflow {
                len: entries.len(),
                max: MAX_ENTITY_PATH,
            });
        }
        Ok(Self { entries })
    }

    /// Parse the canonical `{TYPE,LOCATION}...` text form
    pub fn parse(text: &str) -> Result<Self> {
        let mut outer_first = Vec::new();
        let mut rest = text.trim();

        while !rest.is_empty() {
            let body = rest
                .strip_prefix('{')
                .ok_or_else(|| malformed(text, "expected '{'"))?;
            let end = body
                .find('}')
                .ok_or_else(|| malformed(text, "unterminated segment"))?;
            let segment = &body[..end];
            if segment.contains('{') {
                return Err(malformed(text, "nested '{'"));
            }

            outer_first.push(parse_segment(text, segment)?);
            if outer_first.len() > MAX_ENTITY_PATH {
                return Err(malformed(text, "too many segments"));
            }
            rest = body[end + 1..].trim_start();
        }

        outer_first.reverse();
        Ok(Self {
            entries: outer_first,
        })
    }

    /// Canonical text form; the inverse of [`EntityPath::parse`]
    pub fn format(&self) -> String {
        self.to_string()
    }

    pub fn entries(&self) -> &[Entity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most specific segment (index 0)
    pub fn leaf(&self) -> Option<&Entity> {
        self.entries.first()
    }

    /// Append `suffix` outward of this path's outermost segment
    pub fn concat(&self, suffix: &EntityPath) -> Result<EntityPath> {
        let len = self.len() + suffix.len();
        if len > MAX_ENTITY_PATH {
            return Err(HpiError::PathOverflow {
                len,
                max: MAX_ENTITY_PATH,
            });
        }
        let mut entries = self.entries.clone();
        entries.extend_from_slice(&suffix.entries);
        Ok(Self { entries })
    }

    /// Rewrite the location of the first (leaf-most) segment of `entity_type`
    pub fn set_instance(&mut self, entity_type: EntityType, location: i32) -> Result<()> {
        let entity = self
            .entries
            .iter_mut()
            .find(|e| e.entity_type == entity_type)
            .ok_or_else(|| HpiError::not_found(format!("entity type {entity_type} in path")))?;
        entity.location = location;
        Ok(())
    }

    /// Terminate the path with `{ROOT,0}` unless it already ends there
    pub fn append_root(&mut self) -> Result<()> {
        if self.entries.last().map(|e| e.entity_type) == Some(EntityType::ROOT) {
            return Ok(());
        }
        if self.entries.len() == MAX_ENTITY_PATH {
            return Err(HpiError::PathOverflow {
                len: MAX_ENTITY_PATH + 1,
                max: MAX_ENTITY_PATH,
            });
        }
        self.entries.push(Entity::new(EntityType::ROOT, 0));
        Ok(())
    }

    /// True when every segment has a named category and the path fits
    ///
    /// Segments are stored contiguously with an explicit length, so there is
    /// never a gap of unset entries to check for.
    pub fn validate(&self) -> bool {
        self.entries.len() <= MAX_ENTITY_PATH
            && self.entries.iter().all(|e| e.entity_type.is_known())
    }
}

fn malformed(text: &str, reason: &str) -> HpiError {
    HpiError::MalformedPath(format!("{reason} in {text:?}"))
}

fn parse_segment(text: &str, segment: &str) -> Result<Entity> {
    let (type_name, location) = segment
        .split_once(',')
        .ok_or_else(|| malformed(text, "missing ','"))?;
    let type_name = type_name.trim();
    let location = location.trim();

    let entity_type = EntityType::from_name(type_name)
        .ok_or_else(|| malformed(text, &format!("unknown entity type {type_name:?}")))?;

    let digits = location.strip_prefix('-').unwrap_or(location);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(text, &format!("invalid location {location:?}")));
    }
    let location: i32 = location
        .parse()
        .map_err(|_| malformed(text, &format!("location {location:?} out of range")))?;

    Ok(Entity::new(entity_type, location))
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entity in self.entries.iter().rev() {
            write!(f, "{{{},{}}}", entity.entity_type, entity.location)?;
        }
        Ok(())
    }
}

impl FromStr for EntityPath {
    type Err = HpiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityPath {
    type Error = HpiError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EntityPath> for String {
    fn from(path: EntityPath) -> Self {
        path.to_string()
    }
}
