//! Fully-qualified value name resolution.
//!
//! Turns the key object and value name carried by a notification into
//! `<key path>\<value name>`, using only bounded host queries and
//! allocations made through [`RegistryHost::allocate`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use regguard_intercept::{
    HostError, KeyHandle, KeyObject, PoolTag, RegistryHost, UnicodeString, MAX_KEY_NAME_UNITS,
    MAX_VALUE_NAME_UNITS,
};
use regguard_protocol::wide::{from_wide_lossy, SEPARATOR};
use thiserror::Error;

/// Pool tag for the key name query buffer.
pub const KEY_NAME_TAG: PoolTag = PoolTag(*b"RgKn");
/// Pool tag for the combined path buffer.
pub const FULL_NAME_TAG: PoolTag = PoolTag(*b"RgFn");
/// Slack reserved in the combined buffer beyond its exact size.
pub const SAFETY_MARGIN_UNITS: usize = 8;

/// Why a name could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("value name is null or empty")]
    InvalidInput,

    #[error("cannot open key object: {0}")]
    AccessError(HostError),

    #[error("key name query failed: {0}")]
    QueryError(HostError),

    #[error("allocation of {units} units failed")]
    OutOfMemory { units: usize },

    #[error("internal fault: {0}")]
    InternalFault(&'static str),
}

impl ResolutionFailure {
    /// Short name of the failure category, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionFailure::InvalidInput => "InvalidInput",
            ResolutionFailure::AccessError(_) => "AccessError",
            ResolutionFailure::QueryError(_) => "QueryError",
            ResolutionFailure::OutOfMemory { .. } => "OutOfMemory",
            ResolutionFailure::InternalFault(_) => "InternalFault",
        }
    }
}

/// Canonical `<key path>\<value name>`, NUL-terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullPath {
    // Always ends with a single terminator.
    buffer: Vec<u16>,
}

impl FullPath {
    /// The path without its terminator.
    pub fn as_wide(&self) -> &[u16] {
        &self.buffer[..self.buffer.len() - 1]
    }

    pub fn as_wide_with_nul(&self) -> &[u16] {
        &self.buffer
    }

    /// Length in UTF-16 units, excluding the terminator.
    pub fn len(&self) -> usize {
        self.buffer.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_string_lossy(&self) -> String {
        from_wide_lossy(self.as_wide())
    }
}

impl fmt::Display for FullPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// A key's name as returned by the host, with an appended terminator.
#[derive(Debug)]
pub struct KeyNameInfo {
    name_length: usize,
    buffer: Vec<u16>,
}

impl KeyNameInfo {
    pub fn name(&self) -> &[u16] {
        &self.buffer[..self.name_length]
    }
}

/// Builds a [`FullPath`] into a buffer whose capacity is fixed up front.
///
/// Every push is checked against that capacity, keeping room for the
/// terminator, so the buffer never grows or truncates.
pub struct PathBuilder {
    buffer: Vec<u16>,
    capacity: usize,
}

impl PathBuilder {
    /// Units needed for key + separator + value + margin + terminator, or
    /// `None` on arithmetic overflow.
    pub fn required_capacity(key_units: usize, value_units: usize) -> Option<usize> {
        key_units
            .checked_add(1)?
            .checked_add(value_units)?
            .checked_add(SAFETY_MARGIN_UNITS)?
            .checked_add(1)
    }

    /// Allocate a builder sized for a key name and value name of the given lengths.
    pub fn allocate<H: RegistryHost + ?Sized>(
        host: &H,
        key_units: usize,
        value_units: usize,
    ) -> Result<Self, ResolutionFailure> {
        let capacity = Self::required_capacity(key_units, value_units)
            .ok_or(ResolutionFailure::InternalFault("path capacity overflows"))?;
        let buffer = host
            .allocate(capacity, FULL_NAME_TAG)
            .map_err(|_| ResolutionFailure::OutOfMemory { units: capacity })?;
        if buffer.capacity() < capacity {
            return Err(ResolutionFailure::InternalFault(
                "host returned a short allocation",
            ));
        }
        Ok(Self { buffer, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `units`, leaving room for the terminator.
    pub fn push(&mut self, units: &[u16]) -> Result<(), ResolutionFailure> {
        let needed = self
            .buffer
            .len()
            .checked_add(units.len())
            .and_then(|n| n.checked_add(1))
            .ok_or(ResolutionFailure::InternalFault("path length overflows"))?;
        if needed > self.capacity {
            return Err(ResolutionFailure::InternalFault(
                "path exceeds computed capacity",
            ));
        }
        self.buffer.extend_from_slice(units);
        Ok(())
    }

    pub fn finish(mut self) -> FullPath {
        // `push` always leaves one unit free.
        self.buffer.push(0);
        FullPath {
            buffer: self.buffer,
        }
    }
}

/// A key handle that is closed on every exit path.
struct OpenKey<'h, H: RegistryHost + ?Sized> {
    host: &'h H,
    handle: Option<KeyHandle>,
}

impl<'h, H: RegistryHost + ?Sized> OpenKey<'h, H> {
    fn open(host: &'h H, object: KeyObject) -> Result<Self, ResolutionFailure> {
        let handle = host
            .open_key(object)
            .map_err(ResolutionFailure::AccessError)?;
        Ok(Self {
            host,
            handle: Some(handle),
        })
    }

    fn query_name(&self) -> Result<KeyNameInfo, ResolutionFailure> {
        let handle = self
            .handle
            .as_ref()
            .ok_or(ResolutionFailure::InternalFault("key handle already closed"))?;

        let required = match self.host.query_key_name(handle, &mut []) {
            Err(HostError::BufferTooSmall { required }) if required > 0 => required,
            Err(HostError::BufferTooSmall { .. }) | Ok(_) => {
                return Err(ResolutionFailure::QueryError(HostError::NameUnavailable))
            }
            Err(e) => return Err(ResolutionFailure::QueryError(e)),
        };
        if required > MAX_KEY_NAME_UNITS {
            return Err(ResolutionFailure::InternalFault(
                "key name exceeds host maximum",
            ));
        }

        let units = required + 1;
        let mut buffer = self
            .host
            .allocate(units, KEY_NAME_TAG)
            .map_err(|_| ResolutionFailure::OutOfMemory { units })?;
        if buffer.capacity() < units {
            return Err(ResolutionFailure::InternalFault(
                "host returned a short allocation",
            ));
        }
        buffer.resize(units, 0);

        let written = self
            .host
            .query_key_name(handle, &mut buffer[..required])
            .map_err(ResolutionFailure::QueryError)?;
        if written == 0 {
            return Err(ResolutionFailure::QueryError(HostError::NameUnavailable));
        }
        if written > required {
            return Err(ResolutionFailure::InternalFault(
                "host reported more name than it was given room for",
            ));
        }

        buffer[written] = 0;
        buffer.truncate(written + 1);
        Ok(KeyNameInfo {
            name_length: written,
            buffer,
        })
    }
}

impl<H: RegistryHost + ?Sized> Drop for OpenKey<'_, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.host.close_key(handle);
        }
    }
}

/// Resolves notifications' key objects and value names to [`FullPath`]s.
pub struct NameResolver<H: ?Sized> {
    host: Arc<H>,
}

impl<H: RegistryHost + ?Sized> NameResolver<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// Resolve `<key path>\<value name>`.
    ///
    /// A missing, null or empty value name fails with
    /// [`ResolutionFailure::InvalidInput`] before the host is touched. A panic
    /// raised while reading host structures is reported as
    /// [`ResolutionFailure::InternalFault`].
    pub fn resolve(
        &self,
        object: KeyObject,
        value_name: Option<&UnicodeString<'_>>,
    ) -> Result<FullPath, ResolutionFailure> {
        let value_name = match value_name {
            Some(v) if !v.is_empty_or_null() => v,
            _ => return Err(ResolutionFailure::InvalidInput),
        };

        panic::catch_unwind(AssertUnwindSafe(|| self.resolve_checked(object, value_name)))
            .unwrap_or(Err(ResolutionFailure::InternalFault(
                "fault while reading host structures",
            )))
    }

    fn resolve_checked(
        &self,
        object: KeyObject,
        value_name: &UnicodeString<'_>,
    ) -> Result<FullPath, ResolutionFailure> {
        let value = value_name.units().ok_or(ResolutionFailure::InternalFault(
            "value name length exceeds its buffer",
        ))?;
        if value.len() > MAX_VALUE_NAME_UNITS {
            return Err(ResolutionFailure::InternalFault(
                "value name exceeds host maximum",
            ));
        }

        let key_name = {
            let key = OpenKey::open(&*self.host, object)?;
            key.query_name()?
        };

        let mut builder = PathBuilder::allocate(&*self.host, key_name.name().len(), value.len())?;
        builder.push(key_name.name())?;
        builder.push(&[SEPARATOR])?;
        builder.push(value)?;
        Ok(builder.finish())
    }
}
