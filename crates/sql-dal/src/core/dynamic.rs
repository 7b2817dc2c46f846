//! Schema-free records.
//!
//! [`Dynamic`] is an extensible property bag. On its own it is an ordered
//! name → value map; constructed around a typed instance it becomes a proxy
//! that exposes the instance's members alongside its own entries.
//!
//! Lookup precedence is deliberately asymmetric:
//!
//! - **read** ([`Dynamic::get`]): the bag's own map first, then the wrapped
//!   instance. An explicit entry overrides a member of the same name.
//! - **write** ([`Dynamic::set`]): the wrapped instance first when it has a
//!   writable member of that name, otherwise the bag's own map. A write that
//!   lands on the instance drops any map entry of the same name, so the next
//!   read sees the instance's value.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::Result;

use super::reflect::{FieldDescriptor, Reflect, Shape};
use super::value::SqlValue;

/// A wrapped instance shared between a bag and its clones.
pub type SharedInstance = Arc<RwLock<dyn Reflect>>;

/// Extensible property bag, optionally proxying a typed instance.
#[derive(Default)]
pub struct Dynamic {
    wrapped: Option<SharedInstance>,
    properties: IndexMap<String, SqlValue>,
}

fn read_lock(instance: &SharedInstance) -> RwLockReadGuard<'_, dyn Reflect + 'static> {
    instance.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(instance: &SharedInstance) -> RwLockWriteGuard<'_, dyn Reflect + 'static> {
    instance.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Dynamic {
    /// Create an empty, freestanding bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bag proxying `instance`.
    pub fn wrap<T: Reflect + 'static>(instance: T) -> Self {
        let shared: SharedInstance = Arc::new(RwLock::new(instance));
        Self::wrap_shared(shared)
    }

    /// Create a bag proxying an instance that is already shared.
    pub fn wrap_shared(instance: SharedInstance) -> Self {
        Self {
            wrapped: Some(instance),
            properties: IndexMap::new(),
        }
    }

    /// The wrapped instance, if any.
    pub fn wrapped(&self) -> Option<&SharedInstance> {
        self.wrapped.as_ref()
    }

    /// Look up a value by name.
    ///
    /// `None` means neither the map nor the wrapped instance knows the name,
    /// which is distinct from `Some(SqlValue::Null)`.
    pub fn get(&self, name: &str) -> Option<SqlValue> {
        if let Some(value) = self.properties.get(name) {
            return Some(value.clone());
        }

        self.wrapped
            .as_ref()
            .and_then(|instance| read_lock(instance).read_field(name))
    }

    /// Look up a value, treating an unknown name as NULL.
    pub fn get_or_null(&self, name: &str) -> SqlValue {
        self.get(name).unwrap_or(SqlValue::Null)
    }

    /// Assign a value by name.
    ///
    /// Writes through to the wrapped instance when it has a writable member
    /// of that name, removing any map entry that would shadow it. Otherwise
    /// inserts or overwrites a map entry. A member that exists but cannot
    /// hold the value is reported as an error.
    pub fn set(&mut self, name: &str, value: impl Into<SqlValue>) -> Result<()> {
        let value = value.into();

        if let Some(instance) = &self.wrapped {
            let writable = read_lock(instance)
                .shape()
                .iter()
                .any(|f| f.writable && f.name == name);
            if writable && write_lock(instance).write_field(name, value.clone())? {
                self.remove_property(name);
                return Ok(());
            }
        }

        self.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Insert directly into the bag's own map, bypassing the wrapped instance.
    pub fn insert_property(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Remove an entry from the bag's own map.
    pub fn remove_property(&mut self, name: &str) -> Option<SqlValue> {
        self.properties.shift_remove(name)
    }

    /// Invoke a method of the wrapped instance.
    ///
    /// Bags cannot carry methods of their own, so this is `None` without a
    /// wrapped instance or when the instance has no such method.
    pub fn invoke(&self, name: &str, args: &[SqlValue]) -> Option<Result<SqlValue>> {
        self.wrapped
            .as_ref()
            .and_then(|instance| write_lock(instance).invoke(name, args))
    }

    /// Whether `name` is a map entry, or (optionally) a wrapped member.
    pub fn contains(&self, name: &str, include_wrapped: bool) -> bool {
        if self.properties.contains_key(name) {
            return true;
        }

        match (&self.wrapped, include_wrapped) {
            (Some(instance), true) => read_lock(instance).shape().iter().any(|f| f.name == name),
            _ => false,
        }
    }

    /// New bag sharing the wrapped instance, with an empty map of its own.
    ///
    /// Used to stamp out one bag per result row from a prototype.
    pub fn clone_empty(&self) -> Self {
        Self {
            wrapped: self.wrapped.clone(),
            properties: IndexMap::new(),
        }
    }

    /// Snapshot of the map's keys as a descriptor table.
    ///
    /// Later changes to the bag do not affect a table already returned.
    pub fn describe(&self) -> Shape {
        self.properties
            .keys()
            .map(FieldDescriptor::read_write)
            .collect::<Vec<_>>()
            .into()
    }

    /// Enumerate `(name, value)` pairs.
    ///
    /// With `include_wrapped`, readable members of the wrapped instance come
    /// first, followed by map entries. Names present in both are yielded
    /// twice. The iterator is lazy and can be recreated at any time.
    pub fn properties(&self, include_wrapped: bool) -> Properties<'_> {
        let wrapped = match (&self.wrapped, include_wrapped) {
            (Some(instance), true) => {
                let shape = read_lock(instance).shape();
                Some((instance, shape, 0))
            }
            _ => None,
        };

        Properties {
            wrapped,
            entries: self.properties.iter(),
        }
    }

    /// Number of entries in the bag's own map.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the bag's own map is empty.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Lazy iterator returned by [`Dynamic::properties`].
pub struct Properties<'a> {
    wrapped: Option<(&'a SharedInstance, Shape, usize)>,
    entries: indexmap::map::Iter<'a, String, SqlValue>,
}

impl Iterator for Properties<'_> {
    type Item = (String, SqlValue);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((instance, shape, pos)) = &mut self.wrapped {
            while *pos < shape.len() {
                let field = &shape[*pos];
                *pos += 1;
                if !field.readable {
                    continue;
                }
                if let Some(value) = read_lock(*instance).read_field(&field.name) {
                    return Some((field.name.clone(), value));
                }
            }
            self.wrapped = None;
        }

        self.entries
            .next()
            .map(|(name, value)| (name.clone(), value.clone()))
    }
}

/// A bag bound as a record exposes its map keys as its shape.
impl Reflect for Dynamic {
    fn shape(&self) -> Shape {
        self.describe()
    }

    fn read_field(&self, name: &str) -> Option<SqlValue> {
        self.get(name)
    }

    fn write_field(&mut self, name: &str, value: SqlValue) -> Result<bool> {
        self.set(name, value)?;
        Ok(true)
    }

    fn invoke(&mut self, name: &str, args: &[SqlValue]) -> Option<Result<SqlValue>> {
        Dynamic::invoke(self, name, args)
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dynamic")
            .field("wrapped", &self.wrapped.is_some())
            .field("properties", &self.properties)
            .finish()
    }
}

/// Serializes as a JSON-style object: map entries, then wrapped members the
/// map does not shadow.
impl Serialize for Dynamic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in &self.properties {
            map.serialize_entry(name, value)?;
        }
        for (name, value) in self.properties(true) {
            if !self.properties.contains_key(&name) {
                map.serialize_entry(&name, &value)?;
            }
        }
        map.end()
    }
}
