//! The SQLite schema connector: the differ and its supporting diff
//! primitives, rename/rebuild helpers, the pragma applier, and the
//! integrity verifier. Built on two live `rusqlite` connections rather
//! than parsed ASTs, so every intermediate step can be checked by asking
//! SQLite itself.

mod body;
mod diffutil;
mod differ;
mod integrity;
mod naming;
mod pragma;
mod rebuild;
mod rename;

pub use differ::{diff, DifferOptions};
pub use integrity::verify as verify_integrity;
pub use naming::{build_name, NameSegment};
pub use pragma::apply_and_verify as apply_pragmas;

pub use diffutil::file_hash;
