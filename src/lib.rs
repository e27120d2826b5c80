//! Grouped query execution over a pluggable database driver.
//!
//! Build a list of [`Query`] descriptors, tag each with a `group`, and hand
//! them to [`QueryHelper::execute`]. Descriptors in the same group are
//! dispatched together over one connection; groups run in ascending order,
//! and a post-execute hook can stop the remaining groups. Transactions are
//! either owned by a single call or spanned across calls with
//! [`QueryHelper::start_transaction`].
//!
//! ```rust,no_run
//! use sql_query_helper::prelude::*;
//!
//! # async fn demo() -> Result<(), QueryHelperError> {
//! let driver = SqliteDriver::open("app.db")?;
//! let mut helper = QueryHelper::new(driver);
//!
//! let mut queries = vec![
//!     Query::non_query("INSERT INTO Customer (Name) VALUES (@name)")
//!         .with_parameter("name", "Ada")
//!         .with_identity(|pk, _| println!("new customer {pk}")),
//!     Query::scalar_of::<i64>("SELECT COUNT(*) FROM Customer").in_group(1),
//! ];
//! helper.execute(&mut queries, true).await?;
//! let total: i64 = queries[1].return_value()?;
//! # let _ = total;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod config;
pub mod driver;
pub mod error;
pub mod expansion;
mod executor;
pub mod helper;
mod identity;
pub mod logging;
pub mod prelude;
pub mod query;
pub mod results;
pub mod scalar;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{AbortAction, QueryHelperOptions, QueryHelperOptionsBuilder};
pub use driver::{Driver, RowCursor};
pub use error::QueryHelperError;
pub use helper::QueryHelper;
pub use logging::{LogCallback, LogLevel};
pub use query::{InParameters, Parameters, Query, QueryKind};
pub use results::{CustomDbRow, ResultSet, ResultSetCursor};
pub use scalar::{ScalarKind, ScalarTarget, coerce_scalar};
pub use types::{DriverFamily, RowValues};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDriver, SqliteOptions, SqliteOptionsBuilder};
