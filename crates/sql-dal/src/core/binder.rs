//! Parameter binding for the write and read paths.

use tracing::trace;

use super::reflect::{Reflect, Record};
use super::traits::{Command, Parameter};
use super::value::SqlValue;

/// Attach parameters to `command`.
///
/// Explicit pairs are attached first, as given, then one parameter per
/// readable member of `record`. Names are not deduplicated: when both
/// sources carry the same name the command holds both, explicit first.
/// Absent member values bind as [`SqlValue::Null`].
pub fn bind(command: &mut Command, params: &[Parameter], record: Option<&dyn Reflect>) {
    for param in params {
        command.add_parameter(param.name.clone(), param.value.clone());
    }

    let Some(record) = record else {
        return;
    };

    let shape = record.shape();
    for field in shape.iter().filter(|f| f.readable) {
        let value = record.read_field(&field.name).unwrap_or(SqlValue::Null);
        command.add_parameter(field.name.clone(), value);
    }

    trace!(
        explicit = params.len(),
        total = command.parameters().len(),
        "bound command parameters"
    );
}

/// Column list and row values for a bulk load of `records`.
///
/// Columns are the readable members of `T` in descriptor order.
pub fn bulk_rows<T: Record>(records: &[T]) -> (Vec<String>, Vec<Vec<SqlValue>>) {
    let shape = super::reflect::describe::<T>();
    let columns: Vec<String> = shape
        .iter()
        .filter(|f| f.readable)
        .map(|f| f.name.clone())
        .collect();

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|name| record.read_field(name).unwrap_or(SqlValue::Null))
                .collect()
        })
        .collect();

    (columns, rows)
}
