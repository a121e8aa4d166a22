use crate::error::{Result, VaultError};
use std::fs;
use std::path::{Path, PathBuf};

/// Shared pipeline assets that live in the model root but are not voice
/// models, excluded from every listing.
pub const RESERVED_ASSETS: [&str; 4] = [
    "hubert_base.pt",
    "MODELS.txt",
    "public_models.json",
    "rmvpe.pt",
];

/// Extension of the primary trained-model file
pub const WEIGHTS_EXT: &str = "pth";
/// Extension of the optional retrieval-index file
pub const INDEX_EXT: &str = "index";

/// List installed voice model names in `model_root`, sorted.
///
/// The filesystem listing is the registry; no separate index is kept, so the
/// on-disk state can never drift from what callers see. A missing model root
/// lists as empty.
pub fn list_installed(model_root: &Path) -> Result<Vec<String>> {
    if !model_root.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(model_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_reserved(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Check whether a model with this name is already installed
pub fn exists(model_root: &Path, name: &str) -> bool {
    list_installed(model_root)
        .map(|names| names.iter().any(|n| n == name))
        .unwrap_or(false)
}

/// Check whether a name collides with a reserved shared-asset filename
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_ASSETS.contains(&name)
}

/// Resolve an installed model name to its weights file and optional index
/// file, for the voice-conversion pipeline.
pub fn resolve(model_root: &Path, name: &str) -> Result<(PathBuf, Option<PathBuf>)> {
    let model_dir = model_root.join(name);
    if !model_dir.is_dir() {
        return Err(VaultError::ModelNotFound(format!(
            "Voice model '{name}' is not installed"
        )));
    }

    let mut weights = None;
    let mut index = None;
    for entry in fs::read_dir(&model_dir)? {
        let path = entry?.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some(WEIGHTS_EXT) => weights = Some(path),
            Some(INDEX_EXT) => index = Some(path),
            _ => {}
        }
    }

    let weights = weights.ok_or_else(|| {
        VaultError::ModelNotFound(format!(
            "No weights file found in {}",
            model_dir.display()
        ))
    })?;

    Ok((weights, index))
}
