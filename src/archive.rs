use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::errors::PipelineError;
use crate::transport::fs::finish;

fn archive_error(context: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Archive(format!("{context}: {err}"))
}

/// Deflate `dir` into `<dir>.zip` next to it.
///
/// Entry names are relative to the parent of `dir`, so they start with the
/// directory name. Entries are added in sorted path order.
pub fn archive_dir(dir: &Path) -> Result<PathBuf, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::NotFound {
            path: dir.to_path_buf(),
        });
    }
    let name = dir
        .file_name()
        .ok_or_else(|| archive_error("cannot archive", dir.display()))?;
    let parent = dir.parent().unwrap_or_else(|| Path::new("."));
    let target = parent.join(format!("{}.zip", name.to_string_lossy()));

    let tmp = NamedTempFile::new_in(parent).map_err(|source| PipelineError::Write {
        path: target.clone(),
        source,
    })?;
    let mut writer = ZipWriter::new(tmp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|err| archive_error("walk failed", err))?;
        let relative = entry
            .path()
            .strip_prefix(parent)
            .map_err(|err| archive_error("bad entry path", err))?
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type().is_dir() {
            writer
                .add_directory(relative, options)
                .map_err(|err| archive_error("add directory", err))?;
        } else if entry.file_type().is_file() {
            writer
                .start_file(relative, options)
                .map_err(|err| archive_error("start entry", err))?;
            let mut input = File::open(entry.path())?;
            io::copy(&mut input, &mut writer)?;
            entries += 1;
        }
    }
    let tmp = writer
        .finish()
        .map_err(|err| archive_error("finish archive", err))?;
    finish(tmp, &target)?;
    info!(archive = %target.display(), files = entries, "archived output");
    Ok(target)
}

/// [`archive_dir`], then delete `dir`.
pub fn archive_and_remove(dir: &Path) -> Result<PathBuf, PipelineError> {
    let target = archive_dir(dir)?;
    fs::remove_dir_all(dir)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn archive_contains_prefixed_entries_and_source_is_removed() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("spv2_coco");
        fs::create_dir_all(out.join("synthetic").join("annotations")).unwrap();
        fs::write(out.join("README.md"), b"readme").unwrap();
        fs::write(
            out.join("synthetic").join("annotations").join("train.json"),
            b"{}",
        )
        .unwrap();

        let zip_path = archive_and_remove(&out).unwrap();
        assert_eq!(zip_path, temp.path().join("spv2_coco.zip"));
        assert!(!out.exists());

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut readme = String::new();
        archive
            .by_name("spv2_coco/README.md")
            .unwrap()
            .read_to_string(&mut readme)
            .unwrap();
        assert_eq!(readme, "readme");
        assert!(
            archive
                .file_names()
                .any(|name| name == "spv2_coco/synthetic/annotations/train.json")
        );
    }

    #[test]
    fn archive_is_renamed_into_place_without_leftovers() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("translation");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("fixed_prompt_a.txt"), b"A").unwrap();

        let zip_path = archive_dir(&out).unwrap();
        let mut names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["translation", "translation.zip"]);
        assert_eq!(zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let temp = tempdir().unwrap();
        let err = archive_dir(&temp.path().join("absent")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }
}
