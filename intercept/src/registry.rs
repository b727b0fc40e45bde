//! In-memory registry that raises callbacks the way the configuration manager does.
//!
//! Every mutation is announced to the [`Interceptor`] before it is applied;
//! a non-continue status aborts the mutation with
//! [`RegistryError::AccessDenied`]. The registry also implements
//! [`RegistryHost`], with a [`FaultPlan`] that can make any host service fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, trace};
use regguard_protocol::wide::to_wide;
use regguard_protocol::CallbackStatus;

use crate::host::{pool_allocate, RegistryHost};
use crate::interceptor::Interceptor;
use crate::types::{
    CreateKeyInformation, DeleteKeyInformation, DeleteValueKeyInformation, HostError, KeyHandle,
    KeyObject, Notification, PoolTag, PostOperationInformation, QueryValueKeyInformation,
    RegistryError, SetValueKeyInformation, UnicodeString, MAX_KEY_NAME_UNITS,
    MAX_VALUE_NAME_UNITS,
};

/// Switches that make individual host services fail.
#[derive(Debug, Default)]
pub struct FaultPlan {
    fail_open: AtomicBool,
    fail_size_query: AtomicBool,
    fail_name_query: AtomicBool,
    overreport_name: AtomicBool,
    panic_on_query: AtomicBool,
    // 1-based ordinal of the allocation to fail; 0 disables.
    fail_allocation_at: AtomicUsize,
    allocations: AtomicUsize,
}

impl FaultPlan {
    pub fn fail_open(&self, on: bool) {
        self.fail_open.store(on, Ordering::SeqCst);
    }

    pub fn fail_size_query(&self, on: bool) {
        self.fail_size_query.store(on, Ordering::SeqCst);
    }

    pub fn fail_name_query(&self, on: bool) {
        self.fail_name_query.store(on, Ordering::SeqCst);
    }

    /// Report more units written than the caller's buffer holds.
    pub fn overreport_name(&self, on: bool) {
        self.overreport_name.store(on, Ordering::SeqCst);
    }

    /// Panic inside the name query.
    pub fn panic_on_query(&self, on: bool) {
        self.panic_on_query.store(on, Ordering::SeqCst);
    }

    /// Fail the `n`th allocation from now (1-based). `0` disables.
    pub fn fail_allocation_at(&self, n: usize) {
        self.allocations.store(0, Ordering::SeqCst);
        self.fail_allocation_at.store(n, Ordering::SeqCst);
    }

    /// Allocations since the last [`fail_allocation_at`](Self::fail_allocation_at).
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.fail_open(false);
        self.fail_size_query(false);
        self.fail_name_query(false);
        self.overreport_name(false);
        self.panic_on_query(false);
        self.fail_allocation_at(0);
    }

    fn allocation_should_fail(&self) -> bool {
        let ordinal = self.allocations.fetch_add(1, Ordering::SeqCst) + 1;
        ordinal == self.fail_allocation_at.load(Ordering::SeqCst)
    }
}

struct KeyNode {
    path: Vec<u16>,
    // Value names are case-insensitive.
    values: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
struct Store {
    keys: HashMap<KeyObject, KeyNode>,
    by_path: HashMap<String, KeyObject>,
}

/// In-memory configuration store with registry callback semantics.
pub struct Registry {
    interceptor: Arc<Interceptor>,
    store: RwLock<Store>,
    handles: Mutex<HashMap<u64, KeyObject>>,
    next_object: AtomicUsize,
    next_handle: AtomicU64,
    faults: FaultPlan,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn fold_case(name: &str) -> String {
    name.to_lowercase()
}

impl Registry {
    pub fn new() -> Self {
        Self {
            interceptor: Arc::new(Interceptor::new()),
            store: RwLock::new(Store::default()),
            handles: Mutex::new(HashMap::new()),
            next_object: AtomicUsize::new(0x1000),
            next_handle: AtomicU64::new(4),
            faults: FaultPlan::default(),
        }
    }

    /// The callback table this registry notifies.
    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Handles obtained through [`RegistryHost::open_key`] and not yet closed.
    pub fn open_handle_count(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Look up an existing key by full path.
    pub fn key(&self, path: &str) -> Option<KeyObject> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        store.by_path.get(&fold_case(path)).copied()
    }

    /// Create `path` (or return the existing key).
    pub fn create_key(&self, path: &str) -> Result<KeyObject, RegistryError> {
        let wide = to_wide(path);
        if wide.len() > MAX_KEY_NAME_UNITS {
            return Err(RegistryError::NameTooLong);
        }
        let status = self
            .interceptor
            .notify(&Notification::PreCreateKey(CreateKeyInformation {
                complete_name: UnicodeString::new(&wide),
            }));
        if !status.is_continue() {
            return Err(RegistryError::AccessDenied);
        }

        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        let folded = fold_case(path);
        if let Some(existing) = store.by_path.get(&folded) {
            return Ok(*existing);
        }
        let object = KeyObject::from_raw(self.next_object.fetch_add(0x10, Ordering::Relaxed));
        store.keys.insert(
            object,
            KeyNode {
                path: wide,
                values: HashMap::new(),
            },
        );
        store.by_path.insert(folded, object);
        debug!("Created key {}", path);
        Ok(object)
    }

    /// Delete a key and all of its values.
    pub fn delete_key(&self, key: KeyObject) -> Result<(), RegistryError> {
        self.ensure_key(key)?;
        let status = self
            .interceptor
            .notify(&Notification::PreDeleteKey(DeleteKeyInformation { object: key }));
        if !status.is_continue() {
            return Err(RegistryError::AccessDenied);
        }
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        let node = store.keys.remove(&key).ok_or(RegistryError::KeyNotFound)?;
        let folded = fold_case(&String::from_utf16_lossy(&node.path));
        store.by_path.remove(&folded);
        Ok(())
    }

    /// Write a value. The empty name addresses the key's default value.
    pub fn set_value(&self, key: KeyObject, name: &str, data: &[u8]) -> Result<(), RegistryError> {
        self.ensure_key(key)?;
        let wide = to_wide(name);
        if wide.len() > MAX_VALUE_NAME_UNITS {
            return Err(RegistryError::NameTooLong);
        }
        let status = self
            .interceptor
            .notify(&Notification::PreSetValueKey(SetValueKeyInformation {
                object: key,
                value_name: Some(UnicodeString::new(&wide)),
                data,
            }));

        let result = if status.is_continue() {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            match store.keys.get_mut(&key) {
                Some(node) => {
                    node.values.insert(fold_case(name), data.to_vec());
                    Ok(())
                }
                None => Err(RegistryError::KeyNotFound),
            }
        } else {
            trace!("Set of value '{}' rejected by callback", name);
            Err(RegistryError::AccessDenied)
        };

        self.interceptor
            .notify(&Notification::PostSetValueKey(PostOperationInformation {
                object: key,
                status,
            }));
        result
    }

    /// Remove a value.
    pub fn delete_value(&self, key: KeyObject, name: &str) -> Result<(), RegistryError> {
        self.ensure_key(key)?;
        let wide = to_wide(name);
        let status = self
            .interceptor
            .notify(&Notification::PreDeleteValueKey(DeleteValueKeyInformation {
                object: key,
                value_name: Some(UnicodeString::new(&wide)),
            }));

        let result = if status.is_continue() {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            match store.keys.get_mut(&key) {
                Some(node) => node
                    .values
                    .remove(&fold_case(name))
                    .map(|_| ())
                    .ok_or(RegistryError::ValueNotFound),
                None => Err(RegistryError::KeyNotFound),
            }
        } else {
            trace!("Delete of value '{}' rejected by callback", name);
            Err(RegistryError::AccessDenied)
        };

        self.interceptor
            .notify(&Notification::PostDeleteValueKey(PostOperationInformation {
                object: key,
                status,
            }));
        result
    }

    /// Read a value.
    pub fn query_value(&self, key: KeyObject, name: &str) -> Result<Vec<u8>, RegistryError> {
        self.ensure_key(key)?;
        let wide = to_wide(name);
        let status = self
            .interceptor
            .notify(&Notification::PreQueryValueKey(QueryValueKeyInformation {
                object: key,
                value_name: Some(UnicodeString::new(&wide)),
            }));
        if !status.is_continue() {
            return Err(RegistryError::AccessDenied);
        }
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        store
            .keys
            .get(&key)
            .ok_or(RegistryError::KeyNotFound)?
            .values
            .get(&fold_case(name))
            .cloned()
            .ok_or(RegistryError::ValueNotFound)
    }

    fn ensure_key(&self, key: KeyObject) -> Result<(), RegistryError> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        if store.keys.contains_key(&key) {
            Ok(())
        } else {
            Err(RegistryError::KeyNotFound)
        }
    }
}

impl RegistryHost for Registry {
    fn open_key(&self, object: KeyObject) -> Result<KeyHandle, HostError> {
        if self.faults.fail_open.load(Ordering::SeqCst) {
            return Err(HostError::AccessDenied);
        }
        {
            let store = self.store.read().unwrap_or_else(|e| e.into_inner());
            if !store.keys.contains_key(&object) {
                return Err(HostError::InvalidObject);
            }
        }
        let raw = self.next_handle.fetch_add(4, Ordering::Relaxed);
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(raw, object);
        Ok(KeyHandle::from_raw(raw))
    }

    fn query_key_name(&self, handle: &KeyHandle, buffer: &mut [u16]) -> Result<usize, HostError> {
        if self.faults.panic_on_query.load(Ordering::SeqCst) {
            panic!("key name query faulted");
        }

        let object = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&handle.as_raw())
            .copied()
            .ok_or(HostError::InvalidHandle)?;

        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        let path = &store.keys.get(&object).ok_or(HostError::InvalidObject)?.path;

        if buffer.is_empty() && self.faults.fail_size_query.load(Ordering::SeqCst) {
            return Err(HostError::InsufficientResources);
        }
        if buffer.len() < path.len() {
            return Err(HostError::BufferTooSmall {
                required: path.len(),
            });
        }
        if self.faults.fail_name_query.load(Ordering::SeqCst) {
            return Err(HostError::InsufficientResources);
        }

        buffer[..path.len()].copy_from_slice(path);
        if self.faults.overreport_name.load(Ordering::SeqCst) {
            return Ok(buffer.len() + 1);
        }
        Ok(path.len())
    }

    fn close_key(&self, handle: KeyHandle) {
        let removed = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.as_raw());
        if removed.is_none() {
            debug!("Close of unknown handle {:#x}", handle.as_raw());
        }
    }

    fn allocate(&self, units: usize, tag: PoolTag) -> Result<Vec<u16>, HostError> {
        if self.faults.allocation_should_fail() {
            debug!("Injected allocation failure ({} units [{}])", units, tag.as_str());
            return Err(HostError::InsufficientResources);
        }
        pool_allocate(units, tag)
    }
}
