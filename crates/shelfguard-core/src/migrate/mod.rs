//! Schema migration with backup, transactional alteration and verification

pub mod descriptor;
pub mod migrator;

pub use descriptor::{builtin_descriptors, find_builtin, Descriptor, SchemaChange};
pub use migrator::{MigrationResult, MigrationState, Migrator};
