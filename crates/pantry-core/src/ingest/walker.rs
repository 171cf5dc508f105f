//! Recursive discovery of markdown source files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::IngestError;

const MARKDOWN_EXTENSION: &str = "md";

/// Collect every `.md` file under `root`, depth-first.
///
/// Entries within a directory are visited in file-name order so runs over
/// the same tree produce artifacts in the same order. Symlinks are not
/// followed, which also rules out cycles. An existing directory with no
/// markdown files yields an empty list; deciding whether that is fatal is
/// up to the caller.
pub fn collect_markdown_files(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext == MARKDOWN_EXTENSION)
        {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_directory_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = collect_markdown_files(&temp_dir.path().join("nope"));
        assert!(matches!(result, Err(IngestError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_empty_directory_yields_empty_list() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "not markdown").unwrap();

        let files = collect_markdown_files(temp_dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_walks_nested_directories_depth_first() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("aquatic")).unwrap();
        fs::create_dir_all(root.join("breakfast/eggs")).unwrap();
        fs::write(root.join("aquatic/清蒸鱼.md"), "# 清蒸鱼").unwrap();
        fs::write(root.join("breakfast/eggs/蒸蛋.md"), "# 蒸蛋").unwrap();
        fs::write(root.join("breakfast/toast.md"), "# toast").unwrap();
        fs::write(root.join("breakfast/photo.jpg"), [0u8; 4]).unwrap();
        fs::write(root.join("README.md"), "# index").unwrap();

        let files = collect_markdown_files(root).unwrap();
        let relative: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(
            relative,
            vec![
                "README.md",
                "aquatic/清蒸鱼.md",
                "breakfast/eggs/蒸蛋.md",
                "breakfast/toast.md",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_does_not_hang() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a/dish.md"), "# dish").unwrap();
        std::os::unix::fs::symlink(root, root.join("a/loop")).unwrap();

        let files = collect_markdown_files(root).unwrap();
        assert_eq!(files.len(), 1);
    }
}
