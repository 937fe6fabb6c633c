//! Message types exchanged with the storage service and between workers.
//!
//! | Type | Size | Channel |
//! |---|---|---|
//! | [`DatabaseMsg`] | 771 | core → storage |
//! | [`AuthResponse`] | 22 | storage → one worker |
//! | [`ActuatorCmd`] | 2 | any worker → actuator executor |
//! | [`DbWebResponse`] | 1153 | storage → web front end (schema only) |
//!
//! Payload unions carry an explicit kind byte after the command byte.

use crate::wire::{WireMessage, get_fixed_str, put_fixed_str};
use bytes::{Buf, BufMut, BytesMut};
use static_assertions::const_assert;
use static_assertions::const_assert_eq;
use warden_core::constants::{
    LOG_DESCRIPTION_CAPACITY, MAX_INVENTORY_TAGS, TAG_CAPACITY,
};
use warden_core::{
    ActuatorId, Error, LogRecord, LogType, Result, Settings, TagId, TagList, UserId,
};

pub const USERNAME_CAPACITY: usize = 32;
pub const PASSWORD_CAPACITY: usize = 64;
pub const NAME_CAPACITY: usize = 32;
pub const JSON_CAPACITY: usize = 1024;
pub const ERROR_CAPACITY: usize = 128;

/// Log type filter value matching every type.
pub const ANY_LOG_TYPE: u8 = 0xFF;

const TAG_LIST_SIZE: usize = 1 + MAX_INVENTORY_TAGS * TAG_CAPACITY;
const LOG_RECORD_SIZE: usize = 1 + 4 + 4 + 4 + 8 + LOG_DESCRIPTION_CAPACITY;
const CREDENTIALS_SIZE: usize = USERNAME_CAPACITY + PASSWORD_CAPACITY;
const USER_RECORD_SIZE: usize = 2 + NAME_CAPACITY + TAG_CAPACITY + 1 + 1;
const ASSET_RECORD_SIZE: usize = 2 + TAG_CAPACITY + NAME_CAPACITY;
const SETTINGS_SIZE: usize = 4 + 4 * 4;
const LOG_FILTER_SIZE: usize = 1 + 8 + 8 + 2;
const AUTHORIZATION_SIZE: usize = 1 + 2 + 1;

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// Largest [`DbPayload`] variant.
pub const DB_PAYLOAD_SIZE: usize = max(
    max(max(TAG_LIST_SIZE, LOG_RECORD_SIZE), max(CREDENTIALS_SIZE, USER_RECORD_SIZE)),
    max(max(ASSET_RECORD_SIZE, SETTINGS_SIZE), max(LOG_FILTER_SIZE, TAG_CAPACITY)),
);

/// Largest [`AuthPayload`] variant.
pub const AUTH_PAYLOAD_SIZE: usize = max(AUTHORIZATION_SIZE, SETTINGS_SIZE);

const_assert_eq!(DB_PAYLOAD_SIZE, TAG_LIST_SIZE);
const_assert_eq!(AUTH_PAYLOAD_SIZE, SETTINGS_SIZE);
// Default Linux msgsize_max.
const_assert!(2 + DB_PAYLOAD_SIZE + JSON_CAPACITY <= 8192);

/// Request and push command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    EnterRoomByRfid = 0,
    LeaveRoomByRfid = 1,
    UpdateAssetInventory = 2,
    WriteLog = 3,
    QueryUserPresent = 4,
    EnrollUser = 5,
    DeleteUser = 6,
    GetSettingsForThread = 7,
    UpdateSettings = 8,
    /// Asks the receiving loop to end.
    Stop = 9,
    Login = 10,
    AddUser = 11,
    UpdateUser = 12,
    AddAsset = 13,
    QueryLogs = 14,
}

impl Command {
    /// # Errors
    /// Returns `Error::InvalidCommandCode` for unknown codes.
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::EnterRoomByRfid,
            1 => Self::LeaveRoomByRfid,
            2 => Self::UpdateAssetInventory,
            3 => Self::WriteLog,
            4 => Self::QueryUserPresent,
            5 => Self::EnrollUser,
            6 => Self::DeleteUser,
            7 => Self::GetSettingsForThread,
            8 => Self::UpdateSettings,
            9 => Self::Stop,
            10 => Self::Login,
            11 => Self::AddUser,
            12 => Self::UpdateUser,
            13 => Self::AddAsset,
            14 => Self::QueryLogs,
            other => return Err(Error::InvalidCommandCode(other)),
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Web login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: heapless::String<USERNAME_CAPACITY>,
    pub password: heapless::String<PASSWORD_CAPACITY>,
}

/// User row as managed from the web front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub name: heapless::String<NAME_CAPACITY>,
    /// Badge tag; empty when the user has none.
    pub rfid_tag: heapless::String<TAG_CAPACITY>,
    pub access_level: u8,
    pub fingerprint_enrolled: bool,
}

/// Inventory asset row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub asset_id: u16,
    pub tag: heapless::String<TAG_CAPACITY>,
    pub name: heapless::String<NAME_CAPACITY>,
}

/// Log query from the web front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    /// A [`LogType`] code or [`ANY_LOG_TYPE`].
    pub log_type: u8,
    pub from_timestamp: i64,
    pub to_timestamp: i64,
    pub limit: u16,
}

/// Payload of a [`DatabaseMsg`].
#[derive(Debug, Clone, PartialEq)]
pub enum DbPayload {
    Empty,
    Rfid(TagId),
    Inventory(TagList),
    Log(LogRecord),
    Login(Credentials),
    User(UserRecord),
    Asset(AssetRecord),
    Settings(Settings),
    LogFilter(LogFilter),
    UserId(UserId),
}

impl DbPayload {
    fn kind(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Rfid(_) => 1,
            Self::Inventory(_) => 2,
            Self::Log(_) => 3,
            Self::Login(_) => 4,
            Self::User(_) => 5,
            Self::Asset(_) => 6,
            Self::Settings(_) => 7,
            Self::LogFilter(_) => 8,
            Self::UserId(_) => 9,
        }
    }
}

fn put_tag(dst: &mut BytesMut, tag: &TagId) {
    put_fixed_str(dst, tag.as_str(), TAG_CAPACITY);
}

fn get_tag(src: &mut &[u8]) -> Result<TagId> {
    let text: heapless::String<TAG_CAPACITY> = get_fixed_str(src, TAG_CAPACITY)?;
    TagId::new(&text)
}

fn put_settings(dst: &mut BytesMut, settings: &Settings) {
    dst.put_u32_le(settings.sample_interval_secs);
    dst.put_f32_le(settings.temperature_threshold);
    dst.put_f32_le(settings.humidity_threshold);
    dst.put_f32_le(settings.fan_on_temperature);
    dst.put_f32_le(settings.fan_off_temperature);
}

fn get_settings(src: &mut &[u8]) -> Settings {
    Settings {
        sample_interval_secs: src.get_u32_le(),
        temperature_threshold: src.get_f32_le(),
        humidity_threshold: src.get_f32_le(),
        fan_on_temperature: src.get_f32_le(),
        fan_off_temperature: src.get_f32_le(),
    }
}

fn put_log(dst: &mut BytesMut, record: &LogRecord) {
    dst.put_u8(record.log_type.to_u8());
    dst.put_i32_le(record.entity_id);
    dst.put_f32_le(record.value);
    dst.put_f32_le(record.value2);
    dst.put_i64_le(record.timestamp);
    put_fixed_str(dst, &record.description, LOG_DESCRIPTION_CAPACITY);
}

fn get_log(src: &mut &[u8]) -> Result<LogRecord> {
    Ok(LogRecord {
        log_type: LogType::from_u8(src.get_u8())?,
        entity_id: src.get_i32_le(),
        value: src.get_f32_le(),
        value2: src.get_f32_le(),
        timestamp: src.get_i64_le(),
        description: get_fixed_str(src, LOG_DESCRIPTION_CAPACITY)?,
    })
}

fn put_tag_list(dst: &mut BytesMut, tags: &TagList) {
    dst.put_u8(tags.len() as u8);
    for tag in tags {
        put_tag(dst, tag);
    }
}

fn get_tag_list(src: &mut &[u8]) -> Result<TagList> {
    let count = usize::from(src.get_u8());
    if count > MAX_INVENTORY_TAGS {
        return Err(Error::CapacityExceeded {
            what: "tag list",
            capacity: MAX_INVENTORY_TAGS,
        });
    }
    let mut tags = TagList::new();
    for _ in 0..count {
        tags.insert_unique(get_tag(src)?)?;
    }
    Ok(tags)
}

/// Request or record sent to the storage service.
///
/// # Example
///
/// ```
/// use warden_core::TagId;
/// use warden_ipc::messages::{Command, DatabaseMsg, DbPayload};
/// use warden_ipc::wire::WireMessage;
///
/// let tag = TagId::new("A1B2C3D4E5").unwrap();
/// let msg = DatabaseMsg::new(Command::EnterRoomByRfid, DbPayload::Rfid(tag));
///
/// let bytes = msg.encode();
/// assert_eq!(bytes.len(), DatabaseMsg::SIZE);
/// assert_eq!(DatabaseMsg::decode(&bytes).unwrap(), msg);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseMsg {
    pub command: Command,
    pub payload: DbPayload,
}

impl DatabaseMsg {
    pub fn new(command: Command, payload: DbPayload) -> Self {
        Self { command, payload }
    }

    /// `WriteLog` carrying `record`.
    pub fn log(record: LogRecord) -> Self {
        Self::new(Command::WriteLog, DbPayload::Log(record))
    }
}

impl WireMessage for DatabaseMsg {
    const SIZE: usize = 2 + DB_PAYLOAD_SIZE;

    fn encode_fields(&self, dst: &mut BytesMut) {
        dst.put_u8(self.command.to_u8());
        dst.put_u8(self.payload.kind());
        match &self.payload {
            DbPayload::Empty => {}
            DbPayload::Rfid(tag) => put_tag(dst, tag),
            DbPayload::Inventory(tags) => put_tag_list(dst, tags),
            DbPayload::Log(record) => put_log(dst, record),
            DbPayload::Login(credentials) => {
                put_fixed_str(dst, &credentials.username, USERNAME_CAPACITY);
                put_fixed_str(dst, &credentials.password, PASSWORD_CAPACITY);
            }
            DbPayload::User(user) => {
                dst.put_u16_le(user.user_id.as_u16());
                put_fixed_str(dst, &user.name, NAME_CAPACITY);
                put_fixed_str(dst, &user.rfid_tag, TAG_CAPACITY);
                dst.put_u8(user.access_level);
                dst.put_u8(u8::from(user.fingerprint_enrolled));
            }
            DbPayload::Asset(asset) => {
                dst.put_u16_le(asset.asset_id);
                put_fixed_str(dst, &asset.tag, TAG_CAPACITY);
                put_fixed_str(dst, &asset.name, NAME_CAPACITY);
            }
            DbPayload::Settings(settings) => put_settings(dst, settings),
            DbPayload::LogFilter(filter) => {
                dst.put_u8(filter.log_type);
                dst.put_i64_le(filter.from_timestamp);
                dst.put_i64_le(filter.to_timestamp);
                dst.put_u16_le(filter.limit);
            }
            DbPayload::UserId(id) => dst.put_u16_le(id.as_u16()),
        }
    }

    fn decode_fields(src: &mut &[u8]) -> Result<Self> {
        let command = Command::from_u8(src.get_u8())?;
        let payload = match src.get_u8() {
            0 => DbPayload::Empty,
            1 => DbPayload::Rfid(get_tag(src)?),
            2 => DbPayload::Inventory(get_tag_list(src)?),
            3 => DbPayload::Log(get_log(src)?),
            4 => DbPayload::Login(Credentials {
                username: get_fixed_str(src, USERNAME_CAPACITY)?,
                password: get_fixed_str(src, PASSWORD_CAPACITY)?,
            }),
            5 => DbPayload::User(UserRecord {
                user_id: UserId::new(src.get_u16_le()),
                name: get_fixed_str(src, NAME_CAPACITY)?,
                rfid_tag: get_fixed_str(src, TAG_CAPACITY)?,
                access_level: src.get_u8(),
                fingerprint_enrolled: src.get_u8() != 0,
            }),
            6 => DbPayload::Asset(AssetRecord {
                asset_id: src.get_u16_le(),
                tag: get_fixed_str(src, TAG_CAPACITY)?,
                name: get_fixed_str(src, NAME_CAPACITY)?,
            }),
            7 => DbPayload::Settings(get_settings(src)),
            8 => DbPayload::LogFilter(LogFilter {
                log_type: src.get_u8(),
                from_timestamp: src.get_i64_le(),
                to_timestamp: src.get_i64_le(),
                limit: src.get_u16_le(),
            }),
            9 => DbPayload::UserId(UserId::new(src.get_u16_le())),
            other => {
                return Err(Error::InvalidMessageFormat(format!(
                    "unknown database payload kind {other}"
                )));
            }
        };
        Ok(Self { command, payload })
    }
}

/// Authorization verdict from the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub authorized: bool,
    pub user_id: UserId,
    pub access_level: u8,
}

/// Payload of an [`AuthResponse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthPayload {
    Empty,
    Authorization(Authorization),
    Settings(Settings),
}

/// Storage reply or push to a single worker.
///
/// Also used for vault enrollment/deletion pushes, environment settings
/// pushes and the stop sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthResponse {
    pub command: Command,
    pub payload: AuthPayload,
}

impl AuthResponse {
    pub fn new(command: Command, payload: AuthPayload) -> Self {
        Self { command, payload }
    }

    /// Verdict for `command`.
    pub fn authorization(command: Command, authorized: bool, user_id: UserId, access_level: u8) -> Self {
        Self::new(
            command,
            AuthPayload::Authorization(Authorization {
                authorized,
                user_id,
                access_level,
            }),
        )
    }

    /// Stop sentinel.
    pub fn stop() -> Self {
        Self::new(Command::Stop, AuthPayload::Empty)
    }

    /// Vault push: enroll `user_id` on the next fingerprint wake.
    pub fn enroll(user_id: UserId, level: u8) -> Self {
        Self::authorization(Command::EnrollUser, true, user_id, level)
    }

    /// Vault push: delete `user_id` from the sensor.
    pub fn delete(user_id: UserId) -> Self {
        Self::authorization(Command::DeleteUser, true, user_id, 0)
    }

    /// Environment push: replace settings.
    pub fn settings(command: Command, settings: Settings) -> Self {
        Self::new(command, AuthPayload::Settings(settings))
    }

    /// The authorization payload, if any.
    pub fn as_authorization(&self) -> Option<Authorization> {
        match self.payload {
            AuthPayload::Authorization(auth) => Some(auth),
            _ => None,
        }
    }
}

impl WireMessage for AuthResponse {
    const SIZE: usize = 2 + AUTH_PAYLOAD_SIZE;

    fn encode_fields(&self, dst: &mut BytesMut) {
        dst.put_u8(self.command.to_u8());
        match &self.payload {
            AuthPayload::Empty => dst.put_u8(0),
            AuthPayload::Authorization(auth) => {
                dst.put_u8(1);
                dst.put_u8(u8::from(auth.authorized));
                dst.put_u16_le(auth.user_id.as_u16());
                dst.put_u8(auth.access_level);
            }
            AuthPayload::Settings(settings) => {
                dst.put_u8(2);
                put_settings(dst, settings);
            }
        }
    }

    fn decode_fields(src: &mut &[u8]) -> Result<Self> {
        let command = Command::from_u8(src.get_u8())?;
        let payload = match src.get_u8() {
            0 => AuthPayload::Empty,
            1 => AuthPayload::Authorization(Authorization {
                authorized: src.get_u8() != 0,
                user_id: UserId::new(src.get_u16_le()),
                access_level: src.get_u8(),
            }),
            2 => AuthPayload::Settings(get_settings(src)),
            other => {
                return Err(Error::InvalidMessageFormat(format!(
                    "unknown auth payload kind {other}"
                )));
            }
        };
        Ok(Self { command, payload })
    }
}

/// Command for the actuator executor.
///
/// The id is kept raw so the executor can reject unknown ids itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCmd {
    pub actuator_id: u8,
    pub value: u8,
}

impl ActuatorCmd {
    pub fn new(actuator: ActuatorId, value: u8) -> Self {
        Self {
            actuator_id: actuator.to_u8(),
            value,
        }
    }
}

impl WireMessage for ActuatorCmd {
    const SIZE: usize = 2;

    fn encode_fields(&self, dst: &mut BytesMut) {
        dst.put_u8(self.actuator_id);
        dst.put_u8(self.value);
    }

    fn decode_fields(src: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            actuator_id: src.get_u8(),
            value: src.get_u8(),
        })
    }
}

/// Storage reply to the web front end. Opaque to the control core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbWebResponse {
    pub success: bool,
    pub json: heapless::String<JSON_CAPACITY>,
    pub error: heapless::String<ERROR_CAPACITY>,
}

impl WireMessage for DbWebResponse {
    const SIZE: usize = 1 + JSON_CAPACITY + ERROR_CAPACITY;

    fn encode_fields(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(self.success));
        put_fixed_str(dst, &self.json, JSON_CAPACITY);
        put_fixed_str(dst, &self.error, ERROR_CAPACITY);
    }

    fn decode_fields(src: &mut &[u8]) -> Result<Self> {
        let success = src.get_u8() != 0;
        let json = get_fixed_str(src, JSON_CAPACITY)?;
        let error = get_fixed_str(src, ERROR_CAPACITY)?;
        Ok(Self {
            success,
            json,
            error,
        })
    }
}

const_assert_eq!(<DatabaseMsg as WireMessage>::SIZE, 771);
const_assert_eq!(<AuthResponse as WireMessage>::SIZE, 22);
const_assert_eq!(<DbWebResponse as WireMessage>::SIZE, 1153);
