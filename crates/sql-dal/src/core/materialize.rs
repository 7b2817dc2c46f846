//! Row materialization into typed records and dynamic bags.
//!
//! Columns absent from the row, and columns holding NULL, leave the target
//! member untouched. That gap is silent; callers that require a column must
//! check for it themselves.

use crate::error::Result;

use super::dynamic::Dynamic;
use super::reflect::{describe, FieldDescriptor, Record};
use super::traits::RowCursor;
use super::value::SqlValue;

/// Present, non-null, trimmed value of `name` in the current row.
fn column_value(row: &dyn RowCursor, name: &str) -> Option<SqlValue> {
    row.value_by_name(name)
        .filter(|value| !value.is_null())
        .map(SqlValue::trimmed)
}

/// Build one `T` from the current row.
///
/// Only writable descriptors are considered. A value the member cannot
/// hold is reported as [`DalError::Mapping`](crate::error::DalError::Mapping).
pub fn materialize<T: Record>(shape: &[FieldDescriptor], row: &dyn RowCursor) -> Result<T> {
    let mut instance = T::default();

    for field in shape.iter().filter(|f| f.writable) {
        if let Some(value) = column_value(row, &field.name) {
            instance.write_field(&field.name, value)?;
        }
    }

    Ok(instance)
}

/// Build one bag from the current row, stamped from `prototype`.
///
/// The new bag shares the prototype's wrapped instance and receives the row
/// values in its own map, so rows never write into each other.
pub fn materialize_dynamic(
    prototype: &Dynamic,
    shape: &[FieldDescriptor],
    row: &dyn RowCursor,
) -> Dynamic {
    let mut bag = prototype.clone_empty();

    for field in shape.iter().filter(|f| f.writable) {
        if let Some(value) = column_value(row, &field.name) {
            bag.insert_property(field.name.clone(), value);
        }
    }

    bag
}

/// Drain `cursor` into one `T` per remaining row.
pub fn materialize_all<T: Record>(cursor: &mut dyn RowCursor) -> Result<Vec<T>> {
    let shape = describe::<T>();
    let mut records = Vec::new();

    while cursor.advance() {
        records.push(materialize(&shape, cursor)?);
    }

    Ok(records)
}

/// Drain `cursor` into one bag per remaining row.
///
/// The prototype's keys are snapshotted once, before the first row.
pub fn materialize_all_dynamic(prototype: &Dynamic, cursor: &mut dyn RowCursor) -> Vec<Dynamic> {
    let shape = prototype.describe();
    let mut bags = Vec::new();

    while cursor.advance() {
        bags.push(materialize_dynamic(prototype, &shape, cursor));
    }

    bags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reflect::tests::{Account, Employee};
    use crate::core::reflect::Reflect;
    use crate::core::traits::MemoryCursor;
    use crate::error::DalError;

    fn employees_cursor(rows: Vec<Vec<SqlValue>>) -> MemoryCursor {
        MemoryCursor::new(vec!["ID".into(), "Name".into(), "Email".into()], rows)
    }

    #[test]
    fn test_null_column_leaves_zero_value() {
        let mut cursor = employees_cursor(vec![vec![
            SqlValue::I32(1),
            SqlValue::from("Jeremy Johnson"),
            SqlValue::Null,
        ]]);
        assert!(cursor.advance());

        let emp: Employee = materialize(&describe::<Employee>(), &cursor).unwrap();

        assert_eq!(emp.id, 1);
        assert_eq!(emp.email, None);
    }

    #[test]
    fn test_absent_column_is_a_silent_gap() {
        let mut cursor = MemoryCursor::new(vec!["Name".into()], vec![vec![SqlValue::from("x")]]);
        assert!(cursor.advance());

        let emp: Employee = materialize(&describe::<Employee>(), &cursor).unwrap();

        assert_eq!(emp.id, 0);
        assert_eq!(emp.name, "x");
    }

    #[test]
    fn test_text_values_are_trimmed() {
        let mut cursor = employees_cursor(vec![vec![
            SqlValue::I32(2),
            SqlValue::from("  padded name\t"),
            SqlValue::from("char(20)@x.us      "),
        ]]);
        assert!(cursor.advance());

        let emp: Employee = materialize(&describe::<Employee>(), &cursor).unwrap();

        assert_eq!(emp.name, "padded name");
        assert_eq!(emp.email.as_deref(), Some("char(20)@x.us"));
    }

    #[test]
    fn test_read_only_member_is_never_written() {
        let mut cursor = MemoryCursor::new(
            vec!["Owner".into(), "Balance".into(), "Overdrawn".into()],
            vec![vec![SqlValue::from("ada"), SqlValue::I64(10), SqlValue::Bool(true)]],
        );
        assert!(cursor.advance());

        let acct: Account = materialize(&describe::<Account>(), &cursor).unwrap();

        assert_eq!(acct.balance, 10);
        assert_eq!(acct.read_field("Overdrawn"), Some(SqlValue::Bool(false)));
    }

    #[test]
    fn test_type_mismatch_is_a_mapping_error() {
        let mut cursor = employees_cursor(vec![vec![
            SqlValue::from("one"),
            SqlValue::Null,
            SqlValue::Null,
        ]]);
        assert!(cursor.advance());

        let err = materialize::<Employee>(&describe::<Employee>(), &cursor).unwrap_err();
        assert!(matches!(err, DalError::Mapping { ref field, .. } if field == "ID"));
    }

    #[test]
    fn test_materialize_all_returns_one_record_per_row() {
        let mut cursor = employees_cursor(vec![
            vec![SqlValue::I32(1), SqlValue::from("a"), SqlValue::Null],
            vec![SqlValue::I32(2), SqlValue::from("b"), SqlValue::from("b@x.us")],
        ]);

        let rows: Vec<Employee> = materialize_all(&mut cursor).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a");
        assert_eq!(rows[1].email.as_deref(), Some("b@x.us"));
    }

    #[test]
    fn test_dynamic_rows_take_only_prototype_keys() {
        let mut prototype = Dynamic::new();
        prototype.insert_property("Name", SqlValue::Null);
        prototype.insert_property("Email", SqlValue::Null);

        let mut cursor = employees_cursor(vec![
            vec![SqlValue::I32(1), SqlValue::from(" a "), SqlValue::Null],
            vec![SqlValue::I32(2), SqlValue::from("b"), SqlValue::from("b@x.us")],
        ]);

        let bags = materialize_all_dynamic(&prototype, &mut cursor);

        assert_eq!(bags.len(), 2);
        assert_eq!(bags[0].get("Name"), Some(SqlValue::from("a")));
        assert_eq!(bags[0].get("Email"), None, "NULL column is a gap");
        assert_eq!(bags[0].get("ID"), None, "not a prototype key");
        assert_eq!(bags[1].get("Email"), Some(SqlValue::from("b@x.us")));
        assert_eq!(prototype.get("Name"), Some(SqlValue::Null));
    }

    #[test]
    fn test_dynamic_rows_share_wrapped_instance_but_not_values() {
        let mut prototype = Dynamic::wrap(Employee::default());
        prototype.insert_property("Name", SqlValue::Null);

        let mut cursor = employees_cursor(vec![
            vec![SqlValue::I32(1), SqlValue::from("a"), SqlValue::Null],
            vec![SqlValue::I32(2), SqlValue::from("b"), SqlValue::Null],
        ]);

        let bags = materialize_all_dynamic(&prototype, &mut cursor);

        assert_eq!(bags[0].get("Name"), Some(SqlValue::from("a")));
        assert_eq!(bags[1].get("Name"), Some(SqlValue::from("b")));
        let (Some(first), Some(shared)) = (bags[0].wrapped(), prototype.wrapped()) else {
            panic!("rows should keep the wrapped instance");
        };
        assert!(std::sync::Arc::ptr_eq(first, shared));
        assert_eq!(prototype.get("ID"), Some(SqlValue::I32(0)));
    }
}
