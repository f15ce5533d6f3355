//! `REPLACE_TEXT` and `REGEX`: in-place file edits.
//!
//! Both rewrite the file through a temporary file in the same directory that
//! is renamed over the original, so readers never see a half-written file.

use regex::{Captures, NoExpand, Regex};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{CommanderError, Result};
use crate::script::{OperationKind, RegexArgs, ReplaceTextArgs};

/// Replace every literal occurrence of `oldValue` with `newValue`, line by
/// line. Returns the number of occurrences replaced.
///
/// Matching is per line, so an `oldValue` spanning a line break never matches.
/// An empty `oldValue` matches between every pair of characters.
pub fn replace_text(args: &ReplaceTextArgs) -> Result<usize> {
    let kind = OperationKind::ReplaceText;
    let path = Path::new(&args.file_path);
    let content = read(kind, path)?;

    let mut replaced = 0;
    let mut output = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        replaced += line.matches(args.old_value.as_str()).count();
        output.push_str(&line.replace(args.old_value.as_str(), &args.new_value));
    }

    write_atomically(kind, path, &output)?;
    tracing::debug!("Replaced {} occurrence(s) in {}", replaced, path.display());
    Ok(replaced)
}

/// Apply a regular expression to the whole file. Returns the match count.
///
/// With `append`, `text` is inserted after every match. Otherwise every match
/// is replaced by `text`, literally unless `expandCaptures` is set.
pub fn regex_edit(args: &RegexArgs) -> Result<usize> {
    let kind = OperationKind::Regex;
    let pattern = Regex::new(&args.regex_pattern).map_err(|e| {
        CommanderError::action(kind.as_ref(), format!("invalid pattern: {e}"))
    })?;

    let path = Path::new(&args.source);
    let content = read(kind, path)?;
    let matches = pattern.find_iter(&content).count();

    let updated = if args.append {
        pattern.replace_all(&content, |caps: &Captures| format!("{}{}", &caps[0], args.text))
    } else if args.expand_captures {
        pattern.replace_all(&content, args.text.as_str())
    } else {
        pattern.replace_all(&content, NoExpand(&args.text))
    };

    write_atomically(kind, path, &updated)?;
    tracing::debug!("{} match(es) of {:?} in {}", matches, args.regex_pattern, path.display());
    Ok(matches)
}

fn read(kind: OperationKind, path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        CommanderError::action(kind.as_ref(), format!("could not read {}: {e}", path.display()))
    })
}

fn write_atomically(kind: OperationKind, path: &Path, content: &str) -> Result<()> {
    let fail = |e: std::io::Error| {
        CommanderError::action(kind.as_ref(), format!("could not write {}: {e}", path.display()))
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(fail)?;
    temp.write_all(content.as_bytes()).map_err(fail)?;
    temp.flush().map_err(fail)?;

    // Keep the original file's mode rather than the temp file's 0600
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions()).map_err(fail)?;
    }

    temp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn regex_args(source: &Path, pattern: &str, text: &str, append: bool) -> RegexArgs {
        RegexArgs {
            source: source.display().to_string(),
            regex_pattern: pattern.to_string(),
            text: text.to_string(),
            append,
            expand_captures: false,
        }
    }

    #[test]
    fn test_replace_text_preserves_other_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.properties");
        fs::write(&path, "name=app\nversion=1.0\nbuild=7\n").unwrap();

        let count = replace_text(&ReplaceTextArgs {
            file_path: path.display().to_string(),
            old_value: "1.0".to_string(),
            new_value: "2.0".to_string(),
        })
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "name=app\nversion=2.0\nbuild=7\n"
        );
    }

    #[test]
    fn test_replace_text_does_not_cross_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "ab\ncd").unwrap();

        let count = replace_text(&ReplaceTextArgs {
            file_path: path.display().to_string(),
            old_value: "b\nc".to_string(),
            new_value: "X".to_string(),
        })
        .unwrap();

        assert_eq!(count, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "ab\ncd");
    }

    #[test]
    fn test_replace_text_empty_old_value_inserts_everywhere() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();

        let count = replace_text(&ReplaceTextArgs {
            file_path: path.display().to_string(),
            old_value: String::new(),
            new_value: "X".to_string(),
        })
        .unwrap();

        assert_eq!(count, 4);
        assert_eq!(fs::read_to_string(&path).unwrap(), "XaXbXcX");
    }

    #[test]
    fn test_replace_text_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = replace_text(&ReplaceTextArgs {
            file_path: dir.path().join("missing.txt").display().to_string(),
            old_value: "a".to_string(),
            new_value: "b".to_string(),
        })
        .unwrap_err();
        assert!(err.to_string().starts_with("REPLACE_TEXT failed"));
    }

    #[test]
    fn test_regex_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo bar foo").unwrap();

        let matches = regex_edit(&regex_args(&path, "foo", "!", true)).unwrap();

        assert_eq!(matches, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo! bar foo!");
    }

    #[test]
    fn test_regex_replace_is_literal_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "v1 v2").unwrap();

        regex_edit(&regex_args(&path, r"v(\d)", "$1", false)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "$1 $1");
    }

    #[test]
    fn test_regex_replace_with_captures() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "v1 v2").unwrap();

        let mut args = regex_args(&path, r"v(\d)", "r${1}", false);
        args.expand_captures = true;
        regex_edit(&args).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "r1 r2");
    }

    #[test]
    fn test_regex_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "x").unwrap();

        let err = regex_edit(&regex_args(&path, "(unclosed", "y", false)).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.sh");
        fs::write(&path, "echo 1.0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        replace_text(&ReplaceTextArgs {
            file_path: path.display().to_string(),
            old_value: "1.0".to_string(),
            new_value: "2.0".to_string(),
        })
        .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
