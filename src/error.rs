use thiserror::Error;

/// Main error type for voicevault
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Voice model '{0}' already exists! Choose a different name for your voice model.")]
    NameConflict(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Verify the download link is still valid\n- Try increasing timeout_secs in config")]
    Network(String),

    #[error("Invalid archive: {0}\n\nTroubleshooting:\n- The file must be a zip archive\n- Re-download the archive and try again")]
    InvalidArchive(String),

    #[error("No qualifying model weights file was found in the extracted archive: {0}")]
    ModelNotFound(String),

    #[error("Ambiguous archive: {0}\n\nTroubleshooting:\n- The archive contains more than one candidate for the same role\n- Remove the extras, or set on_ambiguous = \"last-wins\" in config")]
    AmbiguousArchive(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Install cancelled")]
    Cancelled,

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/voicevault/config.toml\n- Run with RUST_LOG=debug for more details")]
    Config(String),
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Filesystem(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
