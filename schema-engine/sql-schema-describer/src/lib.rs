//! SQL normalizer and schema introspector: turns a live SQLite connection
//! into the declarative [`schema_connector::DatabaseSchema`] the differ
//! compares.

mod describe;
mod normalize;

pub use describe::{describe, get_column_info, read_pragma};
pub use normalize::{normalize, normalize_case_insensitive};
