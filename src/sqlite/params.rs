use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::QueryHelperError;
use crate::query::Parameters;
use crate::types::RowValues;

/// Placeholder prefixes `SQLite` accepts for named parameters.
const NAMED_PREFIXES: [char; 3] = ['@', ':', '$'];

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Convert every named parameter, keeping names and order.
#[must_use]
pub fn convert_params(parameters: &Parameters) -> Vec<(String, Value)> {
    parameters
        .iter()
        .map(|(name, value)| (name.to_string(), row_value_to_sqlite_value(value)))
        .collect()
}

/// Bind named parameters into `stmt`.
///
/// A name is bound under every prefix the statement actually uses; names the
/// SQL never mentions are skipped, and placeholders left unbound read as NULL.
///
/// # Errors
/// Returns `QueryHelperError::SqliteError` if binding fails.
pub fn bind_named(stmt: &mut Statement<'_>, params: &[(String, Value)]) -> Result<(), QueryHelperError> {
    let mut placeholder = String::new();
    for (name, value) in params {
        for prefix in NAMED_PREFIXES {
            placeholder.clear();
            placeholder.push(prefix);
            placeholder.push_str(name);
            if let Some(idx) = stmt.parameter_index(&placeholder)? {
                stmt.raw_bind_parameter(idx, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn converts_values() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .unwrap();
        assert_eq!(
            row_value_to_sqlite_value(&RowValues::Timestamp(ts)),
            Value::Text("2024-01-02 03:04:05".into())
        );
        assert_eq!(
            row_value_to_sqlite_value(&RowValues::Bool(true)),
            Value::Integer(1)
        );
        assert_eq!(row_value_to_sqlite_value(&RowValues::Null), Value::Null);
    }

    #[test]
    fn binds_any_supported_prefix() -> Result<(), QueryHelperError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let mut stmt = conn.prepare("SELECT @a + :b + $c")?;
        let params: Parameters = [("a", 1_i64), ("b", 2_i64), ("c", 3_i64), ("unused", 9_i64)]
            .into_iter()
            .map(|(name, value)| (name, RowValues::from(value)))
            .collect();
        bind_named(&mut stmt, &convert_params(&params))?;
        let mut rows = stmt.raw_query();
        let total: i64 = match rows.next()? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        assert_eq!(total, 6);
        Ok(())
    }
}
