// SQLite adapter - a `Driver` over rusqlite
//
// - config: driver options and builder
// - connection: the shared connection handle and the blocking-task bridge
// - params: RowValues <-> rusqlite values and named-parameter binding
// - query: row extraction into buffered result sets
// - driver: the `Driver` implementation itself

pub mod config;
pub mod connection;
pub mod driver;
pub mod params;
pub mod query;

pub use config::{SqliteOptions, SqliteOptionsBuilder};
pub use connection::{SqliteCommand, SqliteConnection, SqliteTransaction};
pub use driver::SqliteDriver;
