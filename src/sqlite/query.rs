use rusqlite::Statement;
use rusqlite::types::ValueRef;

use crate::error::QueryHelperError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `QueryHelperError::SqliteError` if the column cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<RowValues, QueryHelperError> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => RowValues::Null,
        ValueRef::Integer(i) => RowValues::Int(i),
        ValueRef::Real(f) => RowValues::Float(f),
        ValueRef::Text(bytes) => RowValues::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(b) => RowValues::Blob(b.to_vec()),
    })
}

/// Buffer every row of an already-bound statement.
///
/// # Errors
/// Returns `QueryHelperError::SqliteError` if stepping or reading fails.
pub fn build_result_set(stmt: &mut Statement<'_>) -> Result<ResultSet, QueryHelperError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();
    let mut result_set = ResultSet::with_capacity(column_names, 10);

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

/// First column of the first row, or `Null` when there is none.
///
/// # Errors
/// Returns `QueryHelperError::SqliteError` if stepping or reading fails.
pub fn first_value(stmt: &mut Statement<'_>) -> Result<RowValues, QueryHelperError> {
    if stmt.column_count() == 0 {
        stmt.raw_execute()?;
        return Ok(RowValues::Null);
    }
    let mut rows = stmt.raw_query();
    match rows.next()? {
        Some(row) => sqlite_extract_value_sync(row, 0),
        None => Ok(RowValues::Null),
    }
}
