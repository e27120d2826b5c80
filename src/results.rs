//! Row containers returned by drivers and the in-memory cursor over them.

mod cursor;
mod result_set;
mod row;

pub use cursor::ResultSetCursor;
pub use result_set::ResultSet;
pub use row::CustomDbRow;
