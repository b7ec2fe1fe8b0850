// Database module
// SQLite for topic records, LanceDB for chunk vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
