//! Small filesystem helpers used when laying out a performance workspace.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::Result;

/// Names of every entry directly inside `path`, sorted.
pub fn list_directory(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Names of the immediate subdirectories of `path`, sorted. Symlinks to
/// directories count.
pub fn list_subdirectories(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Creates `path` and any missing parents. An existing directory is fine.
pub fn create_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Removes an empty directory. Failures are logged and swallowed.
pub fn delete_directory(path: &Path) {
    if let Err(err) = fs::remove_dir(path) {
        warn!(path = %path.display(), error = %err, "failed to delete directory");
    }
}

/// Looks for `filename` among the immediate children of `dir`.
pub fn find_file(filename: &str, dir: &Path) -> Result<Option<PathBuf>> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == filename {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}

/// Moves a file, falling back to copy-and-remove when a plain rename is not
/// possible (for example across filesystems).
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(err.into()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}
