use crate::config::Config;
use crate::error::{Result, VaultError};
use crate::models::fetch::{self, CancelToken};
use crate::models::install::{self, InstalledModel};
use crate::models::registry;
use crate::models::InstallEvent;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Orchestrates one voice model install: registry conflict check, fetch,
/// extraction, and cleanup of whatever stage failed.
pub struct ModelManager {
    config: Config,
}

impl ModelManager {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// List installed voice model names
    pub fn list_installed(&self) -> Result<Vec<String>> {
        registry::list_installed(&self.config.storage.model_root)
    }

    /// Resolve an installed model to its weights and optional index file,
    /// for the voice-conversion pipeline
    pub fn resolve(&self, name: &str) -> Result<(PathBuf, Option<PathBuf>)> {
        registry::resolve(&self.config.storage.model_root, name)
    }

    /// Download a voice model archive from a URL and install it under `name`
    pub async fn install_from_url(&self, url: &str, name: &str) -> Result<String> {
        self.install_from_url_with_progress(url, name, &CancelToken::new(), |_| {})
            .await
    }

    pub async fn install_from_url_with_progress<F>(
        &self,
        url: &str,
        name: &str,
        cancel: &CancelToken,
        mut progress: F,
    ) -> Result<String>
    where
        F: FnMut(InstallEvent),
    {
        self.check_name(name)?;

        progress(InstallEvent::DownloadStarted);
        let archive = fetch::fetch_remote(
            url,
            &self.config.storage.temp_root,
            Duration::from_secs(self.config.download.timeout_secs),
            cancel,
            |bytes| progress(InstallEvent::DownloadProgress { bytes }),
        )
        .await?;

        if let Err(e) = self.extract_stage(&archive, name, &mut progress) {
            // The installer consumes the archive after extraction; if it
            // failed earlier the downloaded temp file is still around.
            let _ = fs::remove_file(&archive);
            return Err(e);
        }
        Ok(format!("Voice model '{name}' successfully downloaded!"))
    }

    /// Install a voice model from a local zip archive under `name`
    pub fn install_from_local(&self, path: &Path, name: &str) -> Result<String> {
        self.install_from_local_with_progress(path, name, |_| {})
    }

    pub fn install_from_local_with_progress<F>(
        &self,
        path: &Path,
        name: &str,
        mut progress: F,
    ) -> Result<String>
    where
        F: FnMut(InstallEvent),
    {
        self.check_name(name)?;
        let archive = fetch::fetch_local(path)?;
        self.extract_stage(&archive, name, &mut progress)?;
        Ok(format!("Voice model '{name}' successfully uploaded!"))
    }

    /// Conflict checks before any filesystem mutation. Directory creation in
    /// the installer remains the authoritative mutual-exclusion point; this
    /// just fails the obvious cases early.
    fn check_name(&self, name: &str) -> Result<()> {
        if registry::is_reserved(name) {
            return Err(VaultError::NameConflict(name.to_string()));
        }
        if registry::exists(&self.config.storage.model_root, name) {
            return Err(VaultError::NameConflict(name.to_string()));
        }
        Ok(())
    }

    fn extract_stage<F>(&self, archive: &Path, name: &str, progress: &mut F) -> Result<InstalledModel>
    where
        F: FnMut(InstallEvent),
    {
        progress(InstallEvent::ExtractionStarted);
        let target_dir = self.config.storage.model_root.join(name);
        install::install_with_progress(
            archive,
            &target_dir,
            self.config.install.on_ambiguous,
            &mut *progress,
        )
    }
}
