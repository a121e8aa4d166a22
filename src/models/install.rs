use crate::error::{Result, VaultError};
use crate::models::registry::{INDEX_EXT, WEIGHTS_EXT};
use crate::models::InstallEvent;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::read::ZipArchive;

/// A weights file must be strictly larger than this to qualify (40 MiB).
/// Smaller .pth files in model archives are optimizer shards or junk.
pub const WEIGHTS_MIN_BYTES: u64 = 40 * 1024 * 1024;
/// An index file must be strictly larger than this to qualify (100 KiB)
pub const INDEX_MIN_BYTES: u64 = 100 * 1024;

/// What to do when an archive contains more than one qualifying candidate
/// for the same role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// The candidate visited last in traversal order silently wins
    #[default]
    LastWins,
    /// Fail the install with an ambiguity error
    Reject,
}

/// A successfully installed voice model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModel {
    pub name: String,
    pub dir: PathBuf,
    pub weights: PathBuf,
    pub index: Option<PathBuf>,
}

/// Install a zip archive into `target_dir`, which must not yet exist.
///
/// Extracts every entry, classifies the contents, moves the winning weights
/// file (and index file, if any) to the top level, and deletes all remaining
/// subdirectories. Any failure after `target_dir` is created removes it
/// entirely before propagating, so a directory bearing the model name only
/// ever exists with a qualifying weights file inside.
pub fn install(
    archive: &Path,
    target_dir: &Path,
    policy: AmbiguityPolicy,
) -> Result<InstalledModel> {
    install_with_progress(archive, target_dir, policy, |_| {})
}

pub fn install_with_progress<F>(
    archive: &Path,
    target_dir: &Path,
    policy: AmbiguityPolicy,
    mut progress: F,
) -> Result<InstalledModel>
where
    F: FnMut(InstallEvent),
{
    create_target(target_dir)?;

    match install_inner(archive, target_dir, policy, &mut progress) {
        Ok(model) => Ok(model),
        Err(e) => {
            let _ = fs::remove_dir_all(target_dir);
            Err(e)
        }
    }
}

/// Directory creation is the mutual-exclusion point between concurrent
/// installs of the same name: whichever request creates it proceeds, the
/// other observes the conflict.
fn create_target(target_dir: &Path) -> Result<()> {
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(target_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(VaultError::NameConflict(dir_name(target_dir)))
        }
        Err(e) => Err(e.into()),
    }
}

fn install_inner<F>(
    archive: &Path,
    target_dir: &Path,
    policy: AmbiguityPolicy,
    progress: &mut F,
) -> Result<InstalledModel>
where
    F: FnMut(InstallEvent),
{
    extract_archive(archive, target_dir)?;

    // The archive is consumed as soon as extraction succeeds; later failures
    // roll back the extracted files only. Deletion itself is best-effort.
    let _ = fs::remove_file(archive);

    progress(InstallEvent::Classifying);
    let mut entries = Vec::new();
    collect_files(target_dir, &mut entries)?;
    let (weights, index) = classify(&entries, policy)?;

    let weights = weights.ok_or_else(|| {
        VaultError::ModelNotFound(format!(
            "no .pth file over 40 MiB in {}",
            target_dir.display()
        ))
    })?;

    progress(InstallEvent::Finalizing);
    let weights = promote(target_dir, &weights)?;
    let index = index.map(|path| promote(target_dir, &path)).transpose()?;
    prune_subdirs(target_dir)?;

    tracing::info!(
        "Installed voice model '{}' ({})",
        dir_name(target_dir),
        weights.display()
    );

    Ok(InstalledModel {
        name: dir_name(target_dir),
        dir: target_dir.to_path_buf(),
        weights,
        index,
    })
}

fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| VaultError::InvalidArchive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| VaultError::InvalidArchive(e.to_string()))?;
        let out = dest.join(entry.mangled_name());
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&out)?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }
    Ok(())
}

/// Recursive walk collecting (path, size) for every regular file, visiting
/// directory entries in name order so classification is deterministic.
fn collect_files(dir: &Path, out: &mut Vec<(PathBuf, u64)>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let meta = entry.metadata()?;
        if meta.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if meta.is_file() {
            out.push((entry.path(), meta.len()));
        }
    }
    Ok(())
}

fn classify(
    entries: &[(PathBuf, u64)],
    policy: AmbiguityPolicy,
) -> Result<(Option<PathBuf>, Option<PathBuf>)> {
    let mut weights: Option<PathBuf> = None;
    let mut index: Option<PathBuf> = None;

    for (path, size) in entries {
        match path.extension().and_then(|e| e.to_str()) {
            Some(WEIGHTS_EXT) if *size > WEIGHTS_MIN_BYTES => {
                take_candidate(&mut weights, path, policy, "weights")?;
            }
            Some(INDEX_EXT) if *size > INDEX_MIN_BYTES => {
                take_candidate(&mut index, path, policy, "index")?;
            }
            _ => {}
        }
    }
    Ok((weights, index))
}

fn take_candidate(
    slot: &mut Option<PathBuf>,
    path: &Path,
    policy: AmbiguityPolicy,
    role: &str,
) -> Result<()> {
    if let Some(previous) = slot.replace(path.to_path_buf()) {
        match policy {
            AmbiguityPolicy::Reject => {
                return Err(VaultError::AmbiguousArchive(format!(
                    "both {} and {} qualify as the {role} file",
                    previous.display(),
                    path.display()
                )));
            }
            AmbiguityPolicy::LastWins => {
                tracing::warn!(
                    "Multiple {role} candidates; keeping {} over {}",
                    path.display(),
                    previous.display()
                );
            }
        }
    }
    Ok(())
}

/// Move a classified file to the top level of the model directory, keeping
/// its file name. An unrelated top-level file already holding that name is
/// an unresolvable clash.
fn promote(target_dir: &Path, file: &Path) -> Result<PathBuf> {
    let file_name = file.file_name().ok_or_else(|| {
        VaultError::Filesystem(format!("{} has no file name", file.display()))
    })?;
    let dest = target_dir.join(file_name);

    if dest == file {
        return Ok(dest);
    }
    if dest.exists() {
        return Err(VaultError::Filesystem(format!(
            "cannot move {} to the top level: {} already exists",
            file.display(),
            dest.display()
        )));
    }

    fs::rename(file, &dest)?;
    Ok(dest)
}

/// Delete every remaining subdirectory regardless of leftover content,
/// enforcing the flat layout
fn prune_subdirs(target_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(target_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        }
    }
    Ok(())
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Sparse file of the exact requested size, no real I/O
    fn sparse_file(path: &Path, size: u64) {
        let file = File::create(path).unwrap();
        file.set_len(size).unwrap();
    }

    fn write_zip(path: &Path, entries: &[(&str, u64)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        let chunk = vec![0u8; 64 * 1024];

        for (name, size) in entries {
            writer.start_file(*name, options).unwrap();
            let mut remaining = *size;
            while remaining > 0 {
                let n = remaining.min(chunk.len() as u64) as usize;
                writer.write_all(&chunk[..n]).unwrap();
                remaining -= n as u64;
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_weights_threshold_is_strict() {
        let tmp = TempDir::new().unwrap();
        sparse_file(&tmp.path().join("at.pth"), WEIGHTS_MIN_BYTES);
        sparse_file(&tmp.path().join("over.pth"), WEIGHTS_MIN_BYTES + 1);

        let mut entries = Vec::new();
        collect_files(tmp.path(), &mut entries).unwrap();
        let (weights, _) = classify(&entries, AmbiguityPolicy::LastWins).unwrap();

        // 41,943,040 bytes exactly is rejected; one byte more qualifies
        assert_eq!(weights, Some(tmp.path().join("over.pth")));
    }

    #[test]
    fn test_index_threshold_is_strict() {
        let tmp = TempDir::new().unwrap();
        sparse_file(&tmp.path().join("at.index"), INDEX_MIN_BYTES);

        let mut entries = Vec::new();
        collect_files(tmp.path(), &mut entries).unwrap();
        let (_, index) = classify(&entries, AmbiguityPolicy::LastWins).unwrap();
        assert!(index.is_none());

        sparse_file(&tmp.path().join("over.index"), INDEX_MIN_BYTES + 1);
        let mut entries = Vec::new();
        collect_files(tmp.path(), &mut entries).unwrap();
        let (_, index) = classify(&entries, AmbiguityPolicy::LastWins).unwrap();
        assert_eq!(index, Some(tmp.path().join("over.index")));
    }

    #[test]
    fn test_wrong_extension_never_qualifies() {
        let tmp = TempDir::new().unwrap();
        sparse_file(&tmp.path().join("big.bin"), WEIGHTS_MIN_BYTES * 2);
        sparse_file(&tmp.path().join("big.onnx"), WEIGHTS_MIN_BYTES * 2);

        let mut entries = Vec::new();
        collect_files(tmp.path(), &mut entries).unwrap();
        let (weights, index) = classify(&entries, AmbiguityPolicy::LastWins).unwrap();
        assert!(weights.is_none());
        assert!(index.is_none());
    }

    #[test]
    fn test_classify_last_match_wins() {
        let tmp = TempDir::new().unwrap();
        sparse_file(&tmp.path().join("aa.pth"), WEIGHTS_MIN_BYTES + 1);
        sparse_file(&tmp.path().join("bb.pth"), WEIGHTS_MIN_BYTES + 1);

        let mut entries = Vec::new();
        collect_files(tmp.path(), &mut entries).unwrap();
        let (weights, _) = classify(&entries, AmbiguityPolicy::LastWins).unwrap();

        // Traversal is name-ordered, so bb.pth is visited last
        assert_eq!(weights, Some(tmp.path().join("bb.pth")));
    }

    #[test]
    fn test_classify_reject_policy() {
        let tmp = TempDir::new().unwrap();
        sparse_file(&tmp.path().join("aa.pth"), WEIGHTS_MIN_BYTES + 1);
        sparse_file(&tmp.path().join("bb.pth"), WEIGHTS_MIN_BYTES + 1);

        let mut entries = Vec::new();
        collect_files(tmp.path(), &mut entries).unwrap();
        let result = classify(&entries, AmbiguityPolicy::Reject);
        assert!(matches!(result, Err(VaultError::AmbiguousArchive(_))));
    }

    #[test]
    fn test_install_flattens_nested_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("model.zip");
        write_zip(
            &archive,
            &[
                ("wrapper/weights/model.pth", WEIGHTS_MIN_BYTES + 1),
                ("wrapper/logs/model.index", INDEX_MIN_BYTES + 1),
                ("wrapper/readme.txt", 64),
            ],
        );

        let target = tmp.path().join("models").join("Lisa");
        let model = install(&archive, &target, AmbiguityPolicy::LastWins).unwrap();

        assert_eq!(model.name, "Lisa");
        assert_eq!(model.weights, target.join("model.pth"));
        assert_eq!(model.index, Some(target.join("model.index")));
        assert!(model.weights.is_file());
        assert!(target.join("model.index").is_file());

        // Flat layout: no subdirectories survive
        let subdirs: Vec<_> = fs::read_dir(&target)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().is_dir())
            .collect();
        assert!(subdirs.is_empty());

        // Source archive is consumed
        assert!(!archive.exists());
    }

    #[test]
    fn test_install_without_index() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("model.zip");
        write_zip(&archive, &[("deep/model.pth", WEIGHTS_MIN_BYTES + 1)]);

        let target = tmp.path().join("Gura");
        let model = install(&archive, &target, AmbiguityPolicy::LastWins).unwrap();
        assert!(model.index.is_none());
        assert!(target.join("model.pth").is_file());
    }

    #[test]
    fn test_install_no_weights_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("model.zip");
        // Index qualifies, weights file is below the threshold
        write_zip(
            &archive,
            &[
                ("model/small.pth", 1024),
                ("model/added.index", INDEX_MIN_BYTES + 1),
            ],
        );

        let target = tmp.path().join("Lisa");
        let result = install(&archive, &target, AmbiguityPolicy::LastWins);

        assert!(matches!(result, Err(VaultError::ModelNotFound(_))));
        assert!(!target.exists());
        // Extraction succeeded, so the archive was still consumed
        assert!(!archive.exists());
    }

    #[test]
    fn test_install_invalid_zip_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip archive").unwrap();

        let target = tmp.path().join("Lisa");
        let result = install(&archive, &target, AmbiguityPolicy::LastWins);

        assert!(matches!(result, Err(VaultError::InvalidArchive(_))));
        assert!(!target.exists());
        // Extraction never succeeded, so the archive survives
        assert!(archive.exists());
    }

    #[test]
    fn test_install_top_level_name_clash() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("model.zip");
        // A small top-level model.pth blocks the nested winner's spot
        write_zip(
            &archive,
            &[
                ("model.pth", 1024),
                ("sub/model.pth", WEIGHTS_MIN_BYTES + 1),
            ],
        );

        let target = tmp.path().join("Lisa");
        let result = install(&archive, &target, AmbiguityPolicy::LastWins);

        assert!(matches!(result, Err(VaultError::Filesystem(_))));
        assert!(!target.exists());
    }

    #[test]
    fn test_install_existing_target_is_conflict() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("model.zip");
        write_zip(&archive, &[("model.pth", WEIGHTS_MIN_BYTES + 1)]);

        let target = tmp.path().join("Lisa");
        fs::create_dir_all(&target).unwrap();

        let result = install(&archive, &target, AmbiguityPolicy::LastWins);
        assert!(matches!(result, Err(VaultError::NameConflict(_))));
        // The pre-existing directory is not ours to delete
        assert!(target.exists());
    }

    #[test]
    fn test_install_weights_already_at_top_level() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("model.zip");
        write_zip(&archive, &[("model.pth", WEIGHTS_MIN_BYTES + 1)]);

        let target = tmp.path().join("Lisa");
        let model = install(&archive, &target, AmbiguityPolicy::LastWins).unwrap();
        assert_eq!(model.weights, target.join("model.pth"));
        assert!(model.weights.is_file());
    }
}
