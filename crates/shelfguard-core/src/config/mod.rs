//! Configuration
//!
//! A single [`Settings`] value is built once per process and passed to every
//! component. Nothing else in the crate looks up paths on its own.

mod settings;

pub use settings::{BackupSettings, PathSettings, Settings, TransferSettings, CONFIG_FILE_NAME};
