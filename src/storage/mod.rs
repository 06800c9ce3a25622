pub mod backup;
mod file_storage;
mod models;

pub use file_storage::{FileStorage, Result, StorageError};
pub use models::*;
