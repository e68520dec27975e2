//! Storage layer (`SQLite` sessions, schema introspection, operation lock)

pub mod db;
pub mod lock;
pub mod schema;

pub use db::Session;
pub use lock::{lock_path_for, OperationLock};
