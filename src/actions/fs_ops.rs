//! `COPY`: single files and whole directory trees.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CommanderError, Result};
use crate::script::{CopyArgs, OperationKind};

/// What a copy actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// `passIfExists` was set and the destination was already there.
    AlreadyExists,
    /// A directory tree was copied; `files` regular files were written.
    Directory { files: usize },
    /// A single file was written to `target`.
    File { target: PathBuf },
}

fn copy_error(message: impl Into<String>) -> CommanderError {
    CommanderError::action(OperationKind::Copy.as_ref(), message)
}

/// Copy `source` to `destination`.
///
/// Directories are copied recursively into a destination that must not exist
/// yet. A file is copied to `destination`, creating its parent directory when
/// the destination is absent; if `destination` is an existing directory, or
/// ends with a separator, the file lands inside it under its own name.
pub fn copy(args: &CopyArgs) -> Result<CopyOutcome> {
    let source = Path::new(&args.source);
    let destination = Path::new(&args.destination);

    if args.pass_if_exists && destination.exists() {
        tracing::debug!("Destination {} exists, passing", destination.display());
        return Ok(CopyOutcome::AlreadyExists);
    }

    if !source.exists() {
        return Err(copy_error(format!(
            "source path does not exist: {}",
            source.display()
        )));
    }

    if source.is_dir() {
        if destination.exists() {
            return Err(copy_error(format!(
                "destination already exists: {}",
                destination.display()
            )));
        }
        let files = copy_tree(source, destination).map_err(|e| {
            copy_error(format!(
                "could not copy {} to {}: {e}",
                source.display(),
                destination.display()
            ))
        })?;
        return Ok(CopyOutcome::Directory { files });
    }

    // A trailing separator names the directory itself, as in "build/"
    let dir_to_create = if names_directory(&args.destination) {
        Some(destination)
    } else {
        destination.parent().filter(|p| !p.as_os_str().is_empty())
    };

    if !destination.exists() {
        if let Some(dir) = dir_to_create {
            fs::create_dir_all(dir).map_err(|e| {
                copy_error(format!("could not create directory {}: {e}", dir.display()))
            })?;
        }
    }

    let target = match source.file_name() {
        Some(name) if destination.is_dir() => destination.join(name),
        _ => destination.to_path_buf(),
    };

    fs::copy(source, &target).map_err(|e| {
        copy_error(format!(
            "could not copy {} to {}: {e}",
            source.display(),
            target.display()
        ))
    })?;

    Ok(CopyOutcome::File { target })
}

fn names_directory(path: &str) -> bool {
    path.ends_with('/') || path.ends_with(std::path::MAIN_SEPARATOR)
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<usize> {
    // List before creating so a destination inside the source is not copied into itself
    let entries = fs::read_dir(source)?.collect::<io::Result<Vec<_>>>()?;
    fs::create_dir_all(destination)?;
    let mut files = 0;

    for entry in entries {
        let from = entry.path();
        let to = destination.join(entry.file_name());

        if from.is_dir() {
            files += copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
            files += 1;
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(source: &Path, destination: &Path, pass_if_exists: bool) -> CopyArgs {
        CopyArgs {
            source: source.display().to_string(),
            destination: destination.display().to_string(),
            pass_if_exists,
        }
    }

    #[test]
    fn test_copy_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "hello").unwrap();
        let destination = dir.path().join("nested/deeper/b.txt");

        let outcome = copy(&args(&source, &destination, false)).unwrap();

        assert_eq!(outcome, CopyOutcome::File { target: destination.clone() });
        assert_eq!(fs::read_to_string(destination).unwrap(), "hello");
    }

    #[test]
    fn test_copy_file_into_existing_directory() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "hello").unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        copy(&args(&source, &out, false)).unwrap();

        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_copy_file_into_trailing_slash_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("app.txt");
        fs::write(&source, "hello").unwrap();
        let build = dir.path().join("build");

        let outcome = copy(&CopyArgs {
            source: source.display().to_string(),
            destination: format!("{}/", build.display()),
            pass_if_exists: false,
        })
        .unwrap();

        assert!(build.is_dir());
        assert_eq!(outcome, CopyOutcome::File { target: build.join("app.txt") });
        assert_eq!(fs::read_to_string(build.join("app.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_copy_directory_tree() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("one.txt"), "1").unwrap();
        fs::write(source.join("sub/two.txt"), "2").unwrap();
        let destination = dir.path().join("dst");

        let outcome = copy(&args(&source, &destination, false)).unwrap();

        assert_eq!(outcome, CopyOutcome::Directory { files: 2 });
        assert_eq!(fs::read_to_string(destination.join("sub/two.txt")).unwrap(), "2");
    }

    #[test]
    fn test_copy_directory_into_itself() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("one.txt"), "1").unwrap();
        let destination = source.join("b");

        let outcome = copy(&args(&source, &destination, false)).unwrap();

        assert_eq!(outcome, CopyOutcome::Directory { files: 1 });
        assert_eq!(fs::read_to_string(destination.join("one.txt")).unwrap(), "1");
        assert!(!destination.join("b").exists());
    }

    #[test]
    fn test_copy_directory_onto_existing_fails() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let destination = dir.path().join("dst");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&destination).unwrap();

        let err = copy(&args(&source, &destination, false)).unwrap_err();
        assert!(err.to_string().contains("destination already exists"));
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let err = copy(&args(&dir.path().join("nope"), &dir.path().join("x"), false)).unwrap_err();
        assert!(matches!(err, CommanderError::Action { .. }));
        assert!(err.to_string().contains("source path does not exist"));
    }

    #[test]
    fn test_pass_if_exists_leaves_destination_alone() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        let destination = dir.path().join("b.txt");
        fs::write(&source, "new").unwrap();
        fs::write(&destination, "old").unwrap();

        let outcome = copy(&args(&source, &destination, true)).unwrap();

        assert_eq!(outcome, CopyOutcome::AlreadyExists);
        assert_eq!(fs::read_to_string(destination).unwrap(), "old");
    }
}
