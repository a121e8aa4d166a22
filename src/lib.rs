pub mod config;
pub mod error;
pub mod models;

pub use error::{Result, VaultError};
pub use models::{CancelToken, InstallEvent, InstalledModel, ModelManager};
