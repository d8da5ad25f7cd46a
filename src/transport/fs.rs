use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::constants::layout::JSON_EXTENSION;
use crate::errors::PipelineError;

/// True if the path has a `.json` extension (case-insensitive).
pub fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(JSON_EXTENSION))
        .unwrap_or(false)
}

/// JSON files directly inside `dir`, sorted by path.
pub fn json_files_in(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::NotFound {
            path: dir.to_path_buf(),
        });
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_json_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dir).map_err(|source| PipelineError::Write {
        path: dir.to_path_buf(),
        source,
    })
}

fn temp_beside(path: &Path) -> Result<NamedTempFile, PipelineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;
    NamedTempFile::new_in(parent).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Flush and fsync `tmp`, rename it over `path`, then fsync the directory so
/// the rename itself survives a crash.
pub(crate) fn finish(mut tmp: NamedTempFile, path: &Path) -> Result<(), PipelineError> {
    let wrap = |source: io::Error| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };
    tmp.flush().map_err(wrap)?;
    tmp.as_file().sync_all().map_err(wrap)?;
    tmp.persist(path).map_err(|err| wrap(err.error))?;
    sync_parent(path).map_err(wrap)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => File::open(".")?.sync_all(),
    }
}

// Directory handles cannot be fsynced here; the file sync above still applies.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Write `bytes` to a temp file next to `path`, then rename over `path`.
///
/// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let mut tmp = temp_beside(path)?;
    tmp.write_all(bytes).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    finish(tmp, path)
}

/// Pretty-printed JSON through [`write_atomic`].
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PipelineError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Copy `source` to `target` through a temp file in the target directory.
pub fn copy_atomic(source: &Path, target: &Path) -> Result<u64, PipelineError> {
    let mut input = File::open(source).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => PipelineError::NotFound {
            path: source.to_path_buf(),
        },
        _ => PipelineError::Io(err),
    })?;
    let mut tmp = temp_beside(target)?;
    let copied = io::copy(&mut input, &mut tmp).map_err(|err| PipelineError::Write {
        path: target.to_path_buf(),
        source: err,
    })?;
    finish(tmp, target)?;
    Ok(copied)
}

/// Read and decode a JSON file, mapping a missing file to `NotFound` and bad
/// content to `Parse`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => PipelineError::NotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::Io(err),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| PipelineError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_files_are_sorted_and_shallow() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        for name in ["b.json", "a.JSON", "notes.txt"] {
            fs::write(root.join(name), b"[]").unwrap();
        }
        fs::create_dir(root.join("nested")).unwrap();
        fs::write(root.join("nested").join("c.json"), b"[]").unwrap();

        let files = json_files_in(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let temp = tempdir().unwrap();
        let err = json_files_in(&temp.path().join("absent")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_temp_files() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("out").join("manifest.json");
        write_atomic(&target, b"first").unwrap();
        write_json_atomic(&target, &serde_json::json!({"n": 2})).unwrap();
        let text = fs::read_to_string(&target).unwrap();
        assert!(text.contains("\"n\": 2"));
        let entries = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn finish_persists_synced_content_at_the_target() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("nested").join("train.json");
        let mut tmp = temp_beside(&target).unwrap();
        tmp.write_all(b"{\"ok\": true}").unwrap();
        let staged = tmp.path().to_path_buf();

        finish(tmp, &target).unwrap();
        assert!(!staged.exists());
        assert_eq!(fs::read(&target).unwrap(), b"{\"ok\": true}");
    }

    #[test]
    fn finish_into_missing_directory_is_a_write_error() {
        let temp = tempdir().unwrap();
        let tmp = NamedTempFile::new_in(temp.path()).unwrap();
        let err = finish(tmp, &temp.path().join("gone").join("x.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Write { .. }));
    }

    #[test]
    fn copy_reports_missing_source() {
        let temp = tempdir().unwrap();
        let err = copy_atomic(&temp.path().join("nope.jpg"), &temp.path().join("x.jpg"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[test]
    fn read_json_distinguishes_missing_and_malformed() {
        let temp = tempdir().unwrap();
        let bad = temp.path().join("bad.json");
        fs::write(&bad, b"{not json").unwrap();
        assert!(matches!(
            read_json::<serde_json::Value>(&bad),
            Err(PipelineError::Parse { .. })
        ));
        assert!(matches!(
            read_json::<serde_json::Value>(&temp.path().join("gone.json")),
            Err(PipelineError::NotFound { .. })
        ));
    }
}
