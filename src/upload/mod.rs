//! Upload planner: mirrors the archive tree into remote storage.
//!
//! The archive directory is walked once.  Every directory holding a file
//! is ensured remotely, every file is uploaded into its mirrored
//! directory, and finally the top-level directories of the archive are
//! removed so the next run starts from an empty tree.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::Result;
use crate::remote::RemoteStorage;

/// What has to exist remotely for one upload pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    /// Directories containing at least one file, relative to the archive
    /// root, `/`-separated.  The root itself is never listed.
    pub dirs: BTreeSet<String>,
    /// Every file found under the archive root.
    pub files: BTreeSet<PathBuf>,
}

/// Counts reported by `upload`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub dirs: usize,
    pub files: usize,
    pub skipped: usize,
    pub cleaned: usize,
}

/// Walk `archive_root` and collect directories and files to upload.
pub fn plan(archive_root: &Path) -> Result<UploadPlan> {
    let mut plan = UploadPlan::default();

    for entry in WalkDir::new(archive_root).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let dir = relative_dir(archive_root, &path);
        if !dir.is_empty() {
            plan.dirs.insert(dir);
        }
        plan.files.insert(path);
    }

    Ok(plan)
}

/// Directory of `file` relative to `archive_root`, `/`-separated.
/// Empty when the file sits directly in the root.
pub fn relative_dir(archive_root: &Path, file: &Path) -> String {
    file.parent()
        .and_then(|parent| parent.strip_prefix(archive_root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// Upload everything under `archive_root` into `remote_root`, then clean
/// the archive.  The first remote failure aborts the pass and leaves the
/// archive in place, so the files are picked up again by the next run.
pub fn upload(
    storage: &dyn RemoteStorage,
    remote_root: &str,
    archive_root: &Path,
) -> Result<UploadSummary> {
    let plan = plan(archive_root)?;
    let mut summary = UploadSummary::default();

    for dir in &plan.dirs {
        info!(remote_root, dir = %dir, "ensuring remote directory");
        storage.ensure_dir(remote_root, dir)?;
        summary.dirs += 1;
    }

    for file in &plan.files {
        let dir = relative_dir(archive_root, file);
        if dir.is_empty() {
            warn!(file = %file.display(), "skipping file placed directly in archive root");
            summary.skipped += 1;
            continue;
        }

        info!(remote_root, dir = %dir, file = %file.display(), "uploading file");
        storage.upload_file(remote_root, &dir, file)?;
        summary.files += 1;
    }

    summary.cleaned = clean_archive(archive_root)?;
    Ok(summary)
}

/// Remove every top-level directory under `archive_root`.  Loose files
/// at the top level are left alone.  Returns the number removed.
pub fn clean_archive(archive_root: &Path) -> Result<usize> {
    info!(path = %archive_root.display(), "cleaning archive path");

    let mut removed = 0;
    for entry in fs::read_dir(archive_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::errors::BackupError;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"x").unwrap();
        path
    }

    #[derive(Default)]
    struct Recorder {
        dirs: RefCell<Vec<String>>,
        files: RefCell<Vec<(String, PathBuf)>>,
        fail_uploads: bool,
    }

    impl RemoteStorage for Recorder {
        fn ensure_dir(&self, _remote_root: &str, relative_dir: &str) -> Result<()> {
            self.dirs.borrow_mut().push(relative_dir.to_string());
            Ok(())
        }

        fn upload_file(&self, _remote_root: &str, relative_dir: &str, local_file: &Path) -> Result<()> {
            if self.fail_uploads {
                return Err(BackupError::sharepoint("upload rejected"));
            }
            self.files
                .borrow_mut()
                .push((relative_dir.to_string(), local_file.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn plan_collects_dirs_and_files() {
        let tmp = TempDir::new().unwrap();
        let one = touch(tmp.path(), "vaultA/secretX/1.zip");
        let two = touch(tmp.path(), "vaultA/secretX/2.zip");

        let plan = plan(tmp.path()).unwrap();
        assert_eq!(plan.dirs, BTreeSet::from(["vaultA/secretX".to_string()]));
        assert_eq!(plan.files, BTreeSet::from([one, two]));
    }

    #[test]
    fn plan_lists_loose_root_file_but_not_root_dir() {
        let tmp = TempDir::new().unwrap();
        let loose = touch(tmp.path(), "stray.txt");
        touch(tmp.path(), "v/s/1.zip");

        let plan = plan(tmp.path()).unwrap();
        assert!(plan.files.contains(&loose));
        assert_eq!(plan.dirs, BTreeSet::from(["v/s".to_string()]));
    }

    #[test]
    fn plan_ignores_empty_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("v/empty")).unwrap();
        let plan = plan(tmp.path()).unwrap();
        assert!(plan.dirs.is_empty());
        assert!(plan.files.is_empty());
    }

    #[test]
    fn upload_mirrors_tree_skips_loose_files_and_cleans() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "vaultA/secretX/1.zip");
        touch(tmp.path(), "vaultB/secretY/9.zip");
        let loose = touch(tmp.path(), "stray.txt");

        let storage = Recorder::default();
        let summary = upload(&storage, "Backups", tmp.path()).unwrap();

        assert_eq!(*storage.dirs.borrow(), vec!["vaultA/secretX", "vaultB/secretY"]);
        let uploaded: Vec<String> = storage.files.borrow().iter().map(|(d, _)| d.clone()).collect();
        assert_eq!(uploaded, vec!["vaultA/secretX", "vaultB/secretY"]);
        assert_eq!(
            summary,
            UploadSummary {
                dirs: 2,
                files: 2,
                skipped: 1,
                cleaned: 2
            }
        );

        assert!(!tmp.path().join("vaultA").exists());
        assert!(!tmp.path().join("vaultB").exists());
        assert!(loose.exists());
    }

    #[test]
    fn failed_upload_keeps_archive() {
        let tmp = TempDir::new().unwrap();
        let file = touch(tmp.path(), "vaultA/secretX/1.zip");

        let storage = Recorder {
            fail_uploads: true,
            ..Recorder::default()
        };
        assert!(upload(&storage, "Backups", tmp.path()).is_err());
        assert!(file.exists());
    }

    #[test]
    fn upload_of_empty_archive_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let storage = Recorder::default();
        let summary = upload(&storage, "Backups", tmp.path()).unwrap();
        assert_eq!(summary, UploadSummary::default());
        assert!(storage.dirs.borrow().is_empty());
    }

    #[test]
    fn relative_dir_uses_forward_slashes() {
        let root = Path::new("/archive");
        assert_eq!(relative_dir(root, Path::new("/archive/v/s/1.zip")), "v/s");
        assert_eq!(relative_dir(root, Path::new("/archive/1.zip")), "");
    }
}
