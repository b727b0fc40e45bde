use regguard_protocol::CallbackStatus;
use thiserror::Error;

/// Largest key path the host reports, in UTF-16 units.
pub const MAX_KEY_NAME_UNITS: usize = 32767;
/// Largest value name the host accepts, in UTF-16 units.
pub const MAX_VALUE_NAME_UNITS: usize = 16383;

/// Opaque reference to a key object, as carried in notification payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyObject(usize);

impl KeyObject {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Query-only handle obtained from a [`KeyObject`]. Must be given back with
/// [`RegistryHost::close_key`](crate::RegistryHost::close_key).
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct KeyHandle(u64);

impl KeyHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Four-byte allocation tag, shown by the host's pool diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolTag(pub [u8; 4]);

impl PoolTag {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

/// Counted UTF-16 string as supplied by the host.
///
/// `length` is in UTF-16 units and is not checked against `buffer` by the
/// host; the buffer is not assumed to be NUL-terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicodeString<'a> {
    pub length: usize,
    pub buffer: Option<&'a [u16]>,
}

impl<'a> UnicodeString<'a> {
    pub fn new(buffer: &'a [u16]) -> Self {
        Self {
            length: buffer.len(),
            buffer: Some(buffer),
        }
    }

    pub fn null() -> Self {
        Self {
            length: 0,
            buffer: None,
        }
    }

    /// Zero length or no buffer.
    pub fn is_empty_or_null(&self) -> bool {
        self.length == 0 || self.buffer.is_none()
    }

    /// The first `length` units, or `None` if the buffer is missing or shorter
    /// than the declared length.
    pub fn units(&self) -> Option<&'a [u16]> {
        self.buffer.and_then(|b| b.get(..self.length))
    }

    pub fn to_string_lossy(&self) -> String {
        match self.units() {
            Some(u) => String::from_utf16_lossy(u),
            None => String::new(),
        }
    }
}

/// Notification classes the host can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegNotifyClass {
    PreSetValueKey,
    PreDeleteValueKey,
    PreCreateKey,
    PreDeleteKey,
    PreQueryValueKey,
    PostSetValueKey,
    PostDeleteValueKey,
}

impl RegNotifyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegNotifyClass::PreSetValueKey => "RegNtPreSetValueKey",
            RegNotifyClass::PreDeleteValueKey => "RegNtPreDeleteValueKey",
            RegNotifyClass::PreCreateKey => "RegNtPreCreateKey",
            RegNotifyClass::PreDeleteKey => "RegNtPreDeleteKey",
            RegNotifyClass::PreQueryValueKey => "RegNtPreQueryValueKey",
            RegNotifyClass::PostSetValueKey => "RegNtPostSetValueKey",
            RegNotifyClass::PostDeleteValueKey => "RegNtPostDeleteValueKey",
        }
    }
}

impl std::fmt::Display for RegNotifyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetValueKeyInformation<'a> {
    pub object: KeyObject,
    pub value_name: Option<UnicodeString<'a>>,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteValueKeyInformation<'a> {
    pub object: KeyObject,
    pub value_name: Option<UnicodeString<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryValueKeyInformation<'a> {
    pub object: KeyObject,
    pub value_name: Option<UnicodeString<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateKeyInformation<'a> {
    pub complete_name: UnicodeString<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteKeyInformation {
    pub object: KeyObject,
}

#[derive(Debug, Clone, Copy)]
pub struct PostOperationInformation {
    pub object: KeyObject,
    pub status: CallbackStatus,
}

/// A notification together with its class-specific payload.
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    PreSetValueKey(SetValueKeyInformation<'a>),
    PreDeleteValueKey(DeleteValueKeyInformation<'a>),
    PreCreateKey(CreateKeyInformation<'a>),
    PreDeleteKey(DeleteKeyInformation),
    PreQueryValueKey(QueryValueKeyInformation<'a>),
    PostSetValueKey(PostOperationInformation),
    PostDeleteValueKey(PostOperationInformation),
}

impl Notification<'_> {
    pub fn class(&self) -> RegNotifyClass {
        match self {
            Notification::PreSetValueKey(_) => RegNotifyClass::PreSetValueKey,
            Notification::PreDeleteValueKey(_) => RegNotifyClass::PreDeleteValueKey,
            Notification::PreCreateKey(_) => RegNotifyClass::PreCreateKey,
            Notification::PreDeleteKey(_) => RegNotifyClass::PreDeleteKey,
            Notification::PreQueryValueKey(_) => RegNotifyClass::PreQueryValueKey,
            Notification::PostSetValueKey(_) => RegNotifyClass::PostSetValueKey,
            Notification::PostDeleteValueKey(_) => RegNotifyClass::PostDeleteValueKey,
        }
    }
}

/// Failures reported by host key queries and allocations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("key object is not valid")]
    InvalidObject,

    #[error("handle is not valid")]
    InvalidHandle,

    #[error("access denied")]
    AccessDenied,

    #[error("key reported an empty name")]
    NameUnavailable,

    #[error("buffer too small ({required} units required)")]
    BufferTooSmall { required: usize },

    #[error("insufficient resources")]
    InsufficientResources,
}

/// Failures reported by callback registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("invalid altitude '{0}'")]
    InvalidAltitude(String),

    #[error("altitude '{0}' is already registered")]
    AltitudeCollision(String),

    #[error("no callback registered for cookie {0}")]
    UnknownCookie(u64),
}

/// Failures a registry caller observes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("access denied")]
    AccessDenied,

    #[error("key not found")]
    KeyNotFound,

    #[error("value not found")]
    ValueNotFound,

    #[error("name exceeds host maximum")]
    NameTooLong,
}
