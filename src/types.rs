use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Loosely-typed values bound as parameters or returned by a driver.
///
/// Drivers translate their native types to and from this enum, so the engine
/// never branches on backend types:
/// ```rust
/// use sql_query_helper::prelude::*;
///
/// let mut query = Query::row_set("SELECT name FROM customer WHERE pk = @pk");
/// query.parameters.insert("pk", RowValues::Int(7));
/// # let _ = query;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// The driver's "no data" marker
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Short name of the variant, used in coercion errors and log lines.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "int",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "bool",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Int(i) => write!(f, "{i}"),
            RowValues::Float(v) => write!(f, "{v}"),
            RowValues::Text(s) => f.write_str(s),
            RowValues::Bool(b) => write!(f, "{b}"),
            RowValues::Timestamp(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            RowValues::Null => f.write_str("NULL"),
            RowValues::JSON(json) => write!(f, "{json}"),
            RowValues::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Database families the identity lookup knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum DriverFamily {
    /// SQL Server Compact
    SqlServerCe,
    /// SQL Server
    SqlServer,
    /// `SQLite`
    Sqlite,
    /// `PostgreSQL`
    Postgres,
    /// `MySQL` / `MariaDB`
    MySql,
}

impl DriverFamily {
    /// Resolve a driver-reported family string.
    ///
    /// Matching is a case-insensitive substring test. `SqlServerCe` is tried
    /// before `SqlServer` because the latter is a prefix of the former.
    #[must_use]
    pub fn detect(family: &str) -> Option<Self> {
        let lowered = family.to_ascii_lowercase();
        [
            (DriverFamily::SqlServerCe, "sqlserverce"),
            (DriverFamily::SqlServer, "sqlserver"),
            (DriverFamily::Sqlite, "sqlite"),
            (DriverFamily::Postgres, "postgres"),
            (DriverFamily::MySql, "mysql"),
        ]
        .into_iter()
        .find(|(_, needle)| lowered.contains(needle))
        .map(|(family, _)| family)
    }

    /// Statement returning the last identity generated in the current scope.
    #[must_use]
    pub fn identity_statement(self) -> &'static str {
        match self {
            DriverFamily::SqlServerCe => "SELECT @@IDENTITY;",
            DriverFamily::SqlServer => "SELECT SCOPE_IDENTITY();",
            DriverFamily::Sqlite => "SELECT last_insert_rowid();",
            DriverFamily::Postgres => "SELECT lastval();",
            DriverFamily::MySql => "SELECT LAST_INSERT_ID();",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_families_case_insensitively() {
        assert_eq!(
            DriverFamily::detect("System.Data.SqlServerCe.4.0"),
            Some(DriverFamily::SqlServerCe)
        );
        assert_eq!(
            DriverFamily::detect("System.Data.SqlClient.SqlServer"),
            Some(DriverFamily::SqlServer)
        );
        assert_eq!(DriverFamily::detect("SQLite"), Some(DriverFamily::Sqlite));
        assert_eq!(DriverFamily::detect("postgresql"), Some(DriverFamily::Postgres));
        assert_eq!(DriverFamily::detect("Oracle"), None);
    }

    #[test]
    fn display_gives_textual_form() {
        assert_eq!(RowValues::Int(42).to_string(), "42");
        assert_eq!(RowValues::Float(1.5).to_string(), "1.5");
        assert_eq!(RowValues::Bool(true).to_string(), "true");
        assert_eq!(RowValues::Text("abc".into()).to_string(), "abc");
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert!(RowValues::from(none).is_null());
        assert_eq!(RowValues::from(Some(3_i64)), RowValues::Int(3));
    }
}
