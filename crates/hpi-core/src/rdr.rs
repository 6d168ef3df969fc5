//! Resource Data Records: typed descriptors owned by a resource

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity_path::EntityPath;

/// Identifier of an RDR, unique within its owning resource
///
/// Zero means "unassigned"; the RPT derives an id for such records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u32);

/// Widest type-specific number that fits the low half of a derived RecordId
pub const MAX_TYPE_NUM: u32 = 0xFFFF;

impl RecordId {
    pub const UNASSIGNED: RecordId = RecordId(0);

    /// Id derived from the record type and its type-specific number
    ///
    /// `None` when `num` does not fit in 16 bits.
    pub fn derive(record_type: RecordType, num: u32) -> Option<Self> {
        (num <= MAX_TYPE_NUM).then(|| Self(((record_type as u32) << 16) | num))
    }

    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind of record, with the HPI numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Control = 1,
    Sensor = 2,
    Inventory = 3,
    Watchdog = 4,
    Annunciator = 5,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Control => "control",
            Self::Sensor => "sensor",
            Self::Inventory => "inventory",
            Self::Watchdog => "watchdog",
            Self::Annunciator => "annunciator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    #[default]
    Digital,
    Discrete,
    Analog,
    Stream,
    Text,
    Oem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Voltage,
    Current,
    Fan,
    PhysicalSecurity,
    Processor,
    PowerSupply,
    PowerUnit,
    CoolingDevice,
    Memory,
    Watchdog,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub num: u32,
    #[serde(default)]
    pub control_type: ControlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Assigned by the RPT from the owning resource's counter
    #[serde(default)]
    pub num: u32,
    #[serde(default)]
    pub sensor_type: SensorType,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub idr_id: u32,
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogRecord {
    pub num: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnunciatorRecord {
    pub num: u32,
    #[serde(default)]
    pub max_conditions: u32,
}

/// Type-specific part of an RDR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RdrPayload {
    Control(ControlRecord),
    Sensor(SensorRecord),
    Inventory(InventoryRecord),
    Watchdog(WatchdogRecord),
    Annunciator(AnnunciatorRecord),
}

/// A Resource Data Record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdr {
    #[serde(default)]
    pub record_id: RecordId,
    /// Entity the record describes, usually the owning resource's path
    #[serde(default)]
    pub entity_path: EntityPath,
    #[serde(default)]
    pub is_fru: bool,
    #[serde(default)]
    pub id_string: String,
    pub payload: RdrPayload,
}

impl Rdr {
    pub fn new(payload: RdrPayload) -> Self {
        Self {
            record_id: RecordId::UNASSIGNED,
            entity_path: EntityPath::root(),
            is_fru: false,
            id_string: String::new(),
            payload,
        }
    }

    pub fn sensor(sensor_type: SensorType) -> Self {
        Self::new(RdrPayload::Sensor(SensorRecord {
            num: 0,
            sensor_type,
            units: None,
        }))
    }

    pub fn control(num: u32, control_type: ControlType) -> Self {
        Self::new(RdrPayload::Control(ControlRecord { num, control_type }))
    }

    pub fn with_id_string(mut self, id_string: impl Into<String>) -> Self {
        self.id_string = id_string.into();
        self
    }

    pub fn record_type(&self) -> RecordType {
        match self.payload {
            RdrPayload::Control(_) => RecordType::Control,
            RdrPayload::Sensor(_) => RecordType::Sensor,
            RdrPayload::Inventory(_) => RecordType::Inventory,
            RdrPayload::Watchdog(_) => RecordType::Watchdog,
            RdrPayload::Annunciator(_) => RecordType::Annunciator,
        }
    }

    /// Control/sensor/watchdog/annunciator number, or IDR id for inventory
    pub fn type_num(&self) -> u32 {
        match &self.payload {
            RdrPayload::Control(rec) => rec.num,
            RdrPayload::Sensor(rec) => rec.num,
            RdrPayload::Inventory(rec) => rec.idr_id,
            RdrPayload::Watchdog(rec) => rec.num,
            RdrPayload::Annunciator(rec) => rec.num,
        }
    }

    pub fn sensor_num(&self) -> Option<u32> {
        match &self.payload {
            RdrPayload::Sensor(rec) => Some(rec.num),
            _ => None,
        }
    }

    pub(crate) fn set_sensor_num(&mut self, num: u32) {
        if let RdrPayload::Sensor(rec) = &mut self.payload {
            rec.num = num;
        }
    }
}
