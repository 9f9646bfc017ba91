//! All-or-nothing output publishing.
//!
//! Artifacts are written to hidden sibling staging paths that keep the
//! target's extension, then renamed into place together by
//! [`OutputStage::commit`]. Existing targets are moved aside first, so a
//! rename failing partway through restores whatever was published before.
//! If the stage is dropped without a commit, every staging path is removed
//! and the final paths are untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

const STAGING_PREFIX: &str = ".partial-";
const BACKUP_PREFIX: &str = ".previous-";

pub struct OutputStage {
    /// (staging, final) pairs.
    entries: Vec<(PathBuf, PathBuf)>,
    committed: bool,
}

impl OutputStage {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            committed: false,
        }
    }

    /// Register `target` and return the staging path to write instead.
    ///
    /// Any stale staging leftover from an earlier aborted run is removed.
    pub fn stage(&mut self, target: &Path) -> Result<PathBuf> {
        let staging = sibling(target, STAGING_PREFIX)?;
        remove_path(&staging)?;
        if let Some(parent) = staging.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        self.entries.push((staging.clone(), target.to_path_buf()));
        Ok(staging)
    }

    /// Move every staged artifact to its final path.
    pub fn commit(self) -> Result<()> {
        self.commit_with(|from, to| fs::rename(from, to))
    }

    fn commit_with<F>(mut self, rename: F) -> Result<()>
    where
        F: Fn(&Path, &Path) -> io::Result<()>,
    {
        for (staging, _) in &self.entries {
            anyhow::ensure!(
                staging.exists(),
                "Staged output {} was never written",
                staging.display()
            );
        }

        // (target, backup of what it replaced)
        let mut published: Vec<(&Path, Option<PathBuf>)> = Vec::new();
        for (staging, target) in &self.entries {
            match publish(staging, target, &rename) {
                Ok(backup) => published.push((target.as_path(), backup)),
                Err(e) => {
                    roll_back(&published, &rename);
                    return Err(e);
                }
            }
            debug!("Published {}", target.display());
        }

        for backup in published.into_iter().filter_map(|(_, b)| b) {
            if let Err(e) = remove_path(&backup) {
                warn!("Could not remove previous output {}: {:#}", backup.display(), e);
            }
        }
        self.committed = true;
        Ok(())
    }
}

/// Rename `staging` onto `target`, keeping any previous target as a backup.
fn publish<F>(staging: &Path, target: &Path, rename: &F) -> Result<Option<PathBuf>>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    let backup = if target.exists() {
        let backup = sibling(target, BACKUP_PREFIX)?;
        remove_path(&backup)?;
        rename(target, &backup)
            .with_context(|| format!("Failed to move aside {}", target.display()))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = rename(staging, target) {
        if let Some(backup) = &backup {
            restore(backup, target, rename);
        }
        return Err(e).with_context(|| {
            format!("Failed to move {} to {}", staging.display(), target.display())
        });
    }
    Ok(backup)
}

/// Undo `published` in reverse order.
fn roll_back<F>(published: &[(&Path, Option<PathBuf>)], rename: &F)
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    for (target, backup) in published.iter().rev() {
        if let Err(e) = remove_path(target) {
            warn!("Could not withdraw {}: {:#}", target.display(), e);
            continue;
        }
        if let Some(backup) = backup {
            restore(backup, target, rename);
        }
    }
}

fn restore<F>(backup: &Path, target: &Path, rename: &F)
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    if let Err(e) = rename(backup, target) {
        warn!(
            "Could not restore {} from {}: {}",
            target.display(),
            backup.display(),
            e
        );
    }
}

impl Default for OutputStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OutputStage {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (staging, _) in &self.entries {
            if let Err(e) = remove_path(staging) {
                warn!("Could not remove staged output {}: {:#}", staging.display(), e);
            }
        }
    }
}

/// `target` with `prefix` prepended to its file name.
fn sibling(target: &Path, prefix: &str) -> Result<PathBuf> {
    let file_name = target
        .file_name()
        .with_context(|| format!("Output path {} has no file name", target.display()))?;
    let mut name = std::ffi::OsString::from(prefix);
    name.push(file_name);
    Ok(target.with_file_name(name))
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    } else if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_publishes_all() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("out.wav");
        let overlay = dir.path().join("overlay");

        let mut stage = OutputStage::new();
        let wav_tmp = stage.stage(&wav).unwrap();
        let overlay_tmp = stage.stage(&overlay).unwrap();
        fs::write(&wav_tmp, b"RIFF").unwrap();
        fs::create_dir(&overlay_tmp).unwrap();
        fs::write(overlay_tmp.join("frame_000000.png"), b"png").unwrap();
        assert!(!wav.exists());

        stage.commit().unwrap();
        assert!(wav.is_file());
        assert!(overlay.join("frame_000000.png").is_file());
        assert!(!wav_tmp.exists());
        assert!(!overlay_tmp.exists());
    }

    #[test]
    fn test_drop_without_commit_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("out.wav");
        let wav_tmp = {
            let mut stage = OutputStage::new();
            let tmp = stage.stage(&wav).unwrap();
            fs::write(&tmp, b"RIFF").unwrap();
            tmp
        };
        assert!(!wav_tmp.exists());
        assert!(!wav.exists());
    }

    #[test]
    fn test_commit_requires_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = OutputStage::new();
        let written = stage.stage(&dir.path().join("a.wav")).unwrap();
        stage.stage(&dir.path().join("b.wav")).unwrap();
        fs::write(&written, b"x").unwrap();

        assert!(stage.commit().is_err());
        assert!(!dir.path().join("a.wav").exists());
        assert!(!written.exists());
    }

    #[test]
    fn test_commit_replaces_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("out.wav");
        fs::write(&wav, b"old").unwrap();

        let mut stage = OutputStage::new();
        let tmp = stage.stage(&wav).unwrap();
        fs::write(&tmp, b"new").unwrap();
        stage.commit().unwrap();
        assert_eq!(fs::read(&wav).unwrap(), b"new");
    }

    /// `fs::rename`, except that publishing the staged `name` fails.
    fn rename_failing_for(name: &str) -> impl Fn(&Path, &Path) -> io::Result<()> {
        let staged = format!("{}{}", STAGING_PREFIX, name);
        move |from: &Path, to: &Path| {
            if from.file_name().is_some_and(|n| n == staged.as_str()) {
                Err(io::Error::other("disk full"))
            } else {
                fs::rename(from, to)
            }
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_publish_restores_earlier_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b");
        fs::write(&a, b"old").unwrap();

        let mut stage = OutputStage::new();
        let a_tmp = stage.stage(&a).unwrap();
        let b_tmp = stage.stage(&b).unwrap();
        fs::write(&a_tmp, b"new").unwrap();
        fs::create_dir(&b_tmp).unwrap();

        let err = stage.commit_with(rename_failing_for("b")).unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
        assert_eq!(fs::read(&a).unwrap(), b"old");
        assert!(!b.exists());
        assert_eq!(names(dir.path()), vec!["a.wav".to_string()]);
    }

    #[test]
    fn test_failed_publish_withdraws_new_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");

        let mut stage = OutputStage::new();
        fs::write(stage.stage(&a).unwrap(), b"new").unwrap();
        fs::write(stage.stage(&b).unwrap(), b"new").unwrap();

        assert!(stage.commit_with(rename_failing_for("b.wav")).is_err());
        assert!(names(dir.path()).is_empty());
    }

    #[test]
    fn test_commit_leaves_no_backups() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("overlay");
        fs::create_dir(&overlay).unwrap();
        fs::write(overlay.join("stale.png"), b"old").unwrap();

        let mut stage = OutputStage::new();
        let tmp = stage.stage(&overlay).unwrap();
        fs::create_dir(&tmp).unwrap();
        fs::write(tmp.join("frame_000000.png"), b"png").unwrap();
        stage.commit().unwrap();

        assert_eq!(names(dir.path()), vec!["overlay".to_string()]);
        assert_eq!(names(&overlay), vec!["frame_000000.png".to_string()]);
    }
}
