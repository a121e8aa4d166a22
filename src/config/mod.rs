//! Configuration module for voicevault
//!
//! Loads config from `$XDG_CONFIG_HOME/voicevault/config.toml` or
//! `~/.config/voicevault/config.toml`. Falls back to embedded defaults if the
//! file doesn't exist. Partial configs are merged with defaults using serde's
//! default attributes.
//!
//! # Example
//!
//! ```no_run
//! use voicevault::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Model root: {}", config.storage.model_root.display());
//! ```

pub mod schema;

pub use schema::Config;
