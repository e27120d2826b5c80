//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{AbortAction, QueryHelperOptions, QueryHelperOptionsBuilder};
pub use crate::driver::{Driver, RowCursor};
pub use crate::error::QueryHelperError;
pub use crate::helper::QueryHelper;
pub use crate::logging::{LogCallback, LogLevel};
pub use crate::query::{InParameters, Parameters, Query, QueryKind};
pub use crate::results::{CustomDbRow, ResultSet, ResultSetCursor};
pub use crate::scalar::{ScalarKind, ScalarTarget, coerce_scalar};
pub use crate::types::{DriverFamily, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDriver, SqliteOptions, SqliteOptionsBuilder};
