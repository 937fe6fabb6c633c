use crate::{
    Result,
    constants::{LOG_DESCRIPTION_CAPACITY, MAX_INVENTORY_TAGS, TAG_CAPACITY},
    error::Error,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier as stored by the storage service and the fingerprint sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u16);

impl UserId {
    #[must_use]
    pub const fn new(id: u16) -> Self {
        UserId(id)
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for UserId {
    fn from(id: u16) -> Self {
        UserId(id)
    }
}

/// Access level derived from the credentials a user holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccessLevel {
    /// May view the web front-end only.
    Viewer = 0,
    /// May enter the monitored room.
    Room = 1,
    /// May enter the room and open the vault.
    Vault = 2,
}

impl AccessLevel {
    /// Create an access level from its wire value.
    ///
    /// # Errors
    /// Returns `Error::InvalidAccessLevel` for values above 2.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AccessLevel::Viewer),
            1 => Ok(AccessLevel::Room),
            2 => Ok(AccessLevel::Vault),
            _ => Err(Error::InvalidAccessLevel(value)),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if this level grants room entry.
    #[must_use]
    pub fn allows_room(self) -> bool {
        self >= AccessLevel::Room
    }

    /// Returns `true` if this level grants vault access.
    #[must_use]
    pub fn allows_vault(self) -> bool {
        self >= AccessLevel::Vault
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccessLevel::Viewer => write!(f, "Viewer"),
            AccessLevel::Room => write!(f, "Room"),
            AccessLevel::Vault => write!(f, "Vault"),
        }
    }
}

/// Identifier of an actuator owned by the actuator executor.
///
/// The discriminant doubles as the index into the executor's device bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActuatorId {
    RoomServo = 0,
    VaultServo = 1,
    Fan = 2,
    Alarm = 3,
}

impl ActuatorId {
    /// Number of actuators on the appliance.
    pub const COUNT: usize = 4;

    /// All actuators in id order.
    pub const ALL: [ActuatorId; Self::COUNT] = [
        ActuatorId::RoomServo,
        ActuatorId::VaultServo,
        ActuatorId::Fan,
        ActuatorId::Alarm,
    ];

    /// Create an actuator id from its wire value.
    ///
    /// # Errors
    /// Returns `Error::InvalidActuator` when the value is out of range.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(Error::InvalidActuator(value))
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ActuatorId::RoomServo => "room servo",
            ActuatorId::VaultServo => "vault servo",
            ActuatorId::Fan => "fan",
            ActuatorId::Alarm => "alarm",
        }
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tag identifier read from an LF card or a UHF label (ASCII, 1-24 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(heapless::String<TAG_CAPACITY>);

impl TagId {
    /// Create a tag id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTag` if the value is empty, longer than
    /// [`TAG_CAPACITY`] or not printable ASCII.
    pub fn new(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(Error::InvalidTag("tag must not be empty".to_string()));
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(Error::InvalidTag(format!(
                "tag must be printable ASCII: {value:?}"
            )));
        }
        let mut inner = heapless::String::new();
        inner.push_str(value).map_err(|_| {
            Error::InvalidTag(format!(
                "tag must be at most {TAG_CAPACITY} chars, got {}",
                value.len()
            ))
        })?;
        Ok(TagId(inner))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagId::new(s)
    }
}

/// Bounded, insertion-ordered list of unique tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagList(heapless::Vec<TagId, MAX_INVENTORY_TAGS>);

impl TagList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag unless an identical one is already present.
    ///
    /// Returns `Ok(true)` when the tag was new.
    ///
    /// # Errors
    /// Returns `Error::CapacityExceeded` when a new tag does not fit.
    pub fn insert_unique(&mut self, tag: TagId) -> Result<bool> {
        if self.contains(&tag) {
            return Ok(false);
        }
        self.0.push(tag).map_err(|_| Error::CapacityExceeded {
            what: "tag list",
            capacity: MAX_INVENTORY_TAGS,
        })?;
        Ok(true)
    }

    #[must_use]
    pub fn contains(&self, tag: &TagId) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagId> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[TagId] {
        self.0.as_slice()
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a TagId;
    type IntoIter = std::slice::Iter<'a, TagId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Category of a log record written to the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogType {
    Access = 0,
    AccessDenied = 1,
    Alert = 2,
    Sensor = 3,
    Actuator = 4,
    Inventory = 5,
    Enrollment = 6,
    System = 7,
}

impl LogType {
    /// Create a log type from its wire value.
    ///
    /// # Errors
    /// Returns `Error::InvalidLogType` for unknown values.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LogType::Access),
            1 => Ok(LogType::AccessDenied),
            2 => Ok(LogType::Alert),
            3 => Ok(LogType::Sensor),
            4 => Ok(LogType::Actuator),
            5 => Ok(LogType::Inventory),
            6 => Ok(LogType::Enrollment),
            7 => Ok(LogType::System),
            _ => Err(Error::InvalidLogType(value)),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Audit record handed to the storage service.
///
/// `timestamp` is microseconds since the Unix epoch so that two records
/// produced back to back by the same worker stay distinguishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub log_type: LogType,
    pub entity_id: i32,
    pub value: f32,
    pub value2: f32,
    pub timestamp: i64,
    pub description: heapless::String<LOG_DESCRIPTION_CAPACITY>,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(log_type: LogType, entity_id: i32) -> Self {
        Self {
            log_type,
            entity_id,
            value: 0.0,
            value2: 0.0,
            timestamp: Utc::now().timestamp_micros(),
            description: heapless::String::new(),
        }
    }

    #[must_use]
    pub fn with_values(mut self, value: f32, value2: f32) -> Self {
        self.value = value;
        self.value2 = value2;
        self
    }

    /// Set the description, truncating at a char boundary to fit.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = truncate_description(description);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Copy `text` into a fixed-capacity description, dropping what does not fit.
#[must_use]
pub fn truncate_description(text: &str) -> heapless::String<LOG_DESCRIPTION_CAPACITY> {
    let mut out = heapless::String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Environment regulation settings pushed by the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between two climate samples.
    pub sample_interval_secs: u32,
    /// Temperature change (°C) that triggers a new sensor log.
    pub temperature_threshold: f32,
    /// Relative humidity change (%) that triggers a new sensor log.
    pub humidity_threshold: f32,
    /// Fan switches on at or above this temperature.
    pub fan_on_temperature: f32,
    /// Fan switches off at or below this temperature.
    pub fan_off_temperature: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_interval_secs: 10,
            temperature_threshold: 0.5,
            humidity_threshold: 2.0,
            fan_on_temperature: 28.0,
            fan_off_temperature: 25.0,
        }
    }
}

impl Settings {
    /// Check that the fan hysteresis band is well-formed.
    ///
    /// # Errors
    /// Returns `Error::Config` on an inverted band or a zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_secs == 0 {
            return Err(Error::Config(
                "sample_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.fan_off_temperature > self.fan_on_temperature {
            return Err(Error::Config(format!(
                "fan_off_temperature ({}) must not exceed fan_on_temperature ({})",
                self.fan_off_temperature, self.fan_on_temperature
            )));
        }
        if self.temperature_threshold < 0.0 || self.humidity_threshold < 0.0 {
            return Err(Error::Config("thresholds must be non-negative".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, AccessLevel::Viewer)]
    #[case(1, AccessLevel::Room)]
    #[case(2, AccessLevel::Vault)]
    fn test_access_level_from_u8(#[case] raw: u8, #[case] expected: AccessLevel) {
        assert_eq!(AccessLevel::from_u8(raw).unwrap(), expected);
        assert_eq!(expected.to_u8(), raw);
    }

    #[test]
    fn test_access_level_invalid() {
        assert!(matches!(
            AccessLevel::from_u8(3),
            Err(Error::InvalidAccessLevel(3))
        ));
    }

    #[test]
    fn test_access_level_permissions() {
        assert!(!AccessLevel::Viewer.allows_room());
        assert!(AccessLevel::Room.allows_room());
        assert!(!AccessLevel::Room.allows_vault());
        assert!(AccessLevel::Vault.allows_vault());
    }

    #[test]
    fn test_actuator_id_roundtrip_and_index() {
        for (idx, id) in ActuatorId::ALL.iter().enumerate() {
            assert_eq!(id.index(), idx);
            assert_eq!(ActuatorId::from_u8(id.to_u8()).unwrap(), *id);
        }
        assert!(matches!(
            ActuatorId::from_u8(4),
            Err(Error::InvalidActuator(4))
        ));
    }

    #[rstest]
    #[case("A1B2C3D4E5")]
    #[case("E2801160600002054E1C2D3F")]
    fn test_tag_id_valid(#[case] raw: &str) {
        let tag = TagId::new(raw).unwrap();
        assert_eq!(tag.as_str(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("has space")]
    #[case("E2801160600002054E1C2D3F00")]
    fn test_tag_id_invalid(#[case] raw: &str) {
        assert!(matches!(TagId::new(raw), Err(Error::InvalidTag(_))));
    }

    #[test]
    fn test_tag_list_dedupes_in_first_seen_order() {
        let mut list = TagList::new();
        for raw in ["E1", "E2", "E1"] {
            list.insert_unique(TagId::new(raw).unwrap()).unwrap();
        }
        let tags: Vec<&str> = list.iter().map(TagId::as_str).collect();
        assert_eq!(tags, vec!["E1", "E2"]);
    }

    #[test]
    fn test_tag_list_capacity() {
        let mut list = TagList::new();
        for i in 0..MAX_INVENTORY_TAGS {
            assert!(list.insert_unique(TagId::new(&format!("T{i}")).unwrap()).unwrap());
        }
        assert!(list.is_full());
        // Duplicates are still recognised when full.
        assert!(!list.insert_unique(TagId::new("T0").unwrap()).unwrap());
        assert!(matches!(
            list.insert_unique(TagId::new("NEW").unwrap()),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_log_record_description_truncated() {
        let long = "x".repeat(100);
        let record = LogRecord::new(LogType::System, 0).with_description(&long);
        assert_eq!(record.description.len(), LOG_DESCRIPTION_CAPACITY);
    }

    #[test]
    fn test_log_record_truncates_on_char_boundary() {
        let text = format!("{}é", "a".repeat(LOG_DESCRIPTION_CAPACITY - 1));
        let record = LogRecord::new(LogType::System, 0).with_description(&text);
        assert_eq!(record.description.len(), LOG_DESCRIPTION_CAPACITY - 1);
    }

    #[test]
    fn test_log_type_roundtrip() {
        for raw in 0..=7u8 {
            assert_eq!(LogType::from_u8(raw).unwrap().to_u8(), raw);
        }
        assert!(LogType::from_u8(8).is_err());
    }

    #[test]
    fn test_settings_validation() {
        assert!(Settings::default().validate().is_ok());

        let inverted = Settings {
            fan_on_temperature: 20.0,
            fan_off_temperature: 22.0,
            ..Settings::default()
        };
        assert!(inverted.validate().is_err());

        let zero = Settings {
            sample_interval_secs: 0,
            ..Settings::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }
}
