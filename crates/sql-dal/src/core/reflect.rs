//! Field discovery for record shapes.
//!
//! Rust has no runtime reflection, so a record type publishes its bindable
//! members through [`Record::fields`]. [`describe`] calls it once per type and
//! caches the resulting descriptor table keyed by [`TypeId`].
//!
//! Descriptor order is declaration order. Rows are matched by column name, so
//! the order only affects the order in which parameters are attached.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::Result;

use super::value::SqlValue;

/// A bindable member of a record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Member name, matched against column and parameter names.
    pub name: String,
    /// Whether the binder may read this member into a parameter.
    pub readable: bool,
    /// Whether the materializer may write a column value into this member.
    pub writable: bool,
}

impl FieldDescriptor {
    /// A member that can be both read and written.
    pub fn read_write(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable: true,
            writable: true,
        }
    }

    /// A member that can only be read (e.g. a computed property).
    pub fn read_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable: true,
            writable: false,
        }
    }

    /// A member that can only be written.
    pub fn write_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable: false,
            writable: true,
        }
    }
}

/// Shared, immutable descriptor table for one shape.
pub type Shape = Arc<[FieldDescriptor]>;

/// Name-based access to an instance's members.
///
/// Object safe so that a [`Dynamic`](super::dynamic::Dynamic) bag can wrap any
/// record behind `dyn Reflect`.
pub trait Reflect: Send + Sync {
    /// Descriptor table for this instance's shape.
    fn shape(&self) -> Shape;

    /// Read a member. `None` when no readable member has this name.
    fn read_field(&self, name: &str) -> Option<SqlValue>;

    /// Write a member. `Ok(false)` when no writable member has this name;
    /// an error when the member exists but cannot hold the value.
    fn write_field(&mut self, name: &str, value: SqlValue) -> Result<bool>;

    /// Invoke a named method. `None` when no such method exists.
    fn invoke(&mut self, _name: &str, _args: &[SqlValue]) -> Option<Result<SqlValue>> {
        None
    }
}

/// A static record shape that can be allocated and populated from rows.
pub trait Record: Reflect + Default + 'static {
    /// Discover the bindable members of this type.
    ///
    /// Called once per type; use [`describe`] to get the cached table.
    fn fields() -> Vec<FieldDescriptor>;
}

fn shape_cache() -> &'static RwLock<HashMap<TypeId, Shape>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, Shape>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Descriptor table for `T`, discovered on first use and cached afterwards.
///
/// A type with no bindable members yields an empty table; binding and
/// materialization then do nothing.
pub fn describe<T: Record>() -> Shape {
    let key = TypeId::of::<T>();

    if let Some(shape) = shape_cache()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(&key)
    {
        return Arc::clone(shape);
    }

    let mut cache = shape_cache()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(
        cache
            .entry(key)
            .or_insert_with(|| Arc::from(T::fields())),
    )
}

/// Implement [`Reflect`] and [`Record`] for a plain struct.
///
/// Each entry maps a column/parameter name to a struct field. Fields must
/// convert to [`SqlValue`] via `From` (by clone) and back via
/// [`FromSqlValue`](super::value::FromSqlValue).
///
/// ```rust
/// use sql_dal::impl_record;
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// pub struct Employee {
///     pub id: i32,
///     pub name: String,
///     pub email: Option<String>,
/// }
///
/// impl_record!(Employee {
///     "ID" => id,
///     "Name" => name,
///     "Email" => email,
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($column:literal => $field:ident),* $(,)? }) => {
        impl $crate::core::reflect::Reflect for $ty {
            fn shape(&self) -> $crate::core::reflect::Shape {
                $crate::core::reflect::describe::<Self>()
            }

            fn read_field(&self, name: &str) -> ::std::option::Option<$crate::core::value::SqlValue> {
                match name {
                    $($column => ::std::option::Option::Some(
                        $crate::core::value::SqlValue::from(::std::clone::Clone::clone(&self.$field)),
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn write_field(
                &mut self,
                name: &str,
                value: $crate::core::value::SqlValue,
            ) -> $crate::error::Result<bool> {
                match name {
                    $($column => {
                        self.$field = $crate::core::value::convert_field($column, value)?;
                        ::std::result::Result::Ok(true)
                    })*
                    _ => {
                        let _ = value;
                        ::std::result::Result::Ok(false)
                    }
                }
            }
        }

        impl $crate::core::reflect::Record for $ty {
            fn fields() -> ::std::vec::Vec<$crate::core::reflect::FieldDescriptor> {
                ::std::vec![
                    $($crate::core::reflect::FieldDescriptor::read_write($column),)*
                ]
            }
        }
    };
}
