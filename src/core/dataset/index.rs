//! Annotation indexing: per-class object counts and the files that hold them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::label::{is_annotation_file, AnnotationRecord, ClassId, FileClassCounts, MalformedLine};

/// Class id -> number of object instances.
pub type ClassCount = BTreeMap<ClassId, usize>;

/// Annotation file name -> per-class multiplicity, for one folder.
///
/// Files with no valid object lines are kept with an empty count map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassFileIndex {
    files: BTreeMap<String, FileClassCounts>,
}

impl ClassFileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, counts: FileClassCounts) {
        self.files.insert(file_name.into(), counts);
    }

    pub fn remove(&mut self, file_name: &str) -> Option<FileClassCounts> {
        self.files.remove(file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&FileClassCounts> {
        self.files.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.files.contains_key(file_name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Files holding at least one instance of `class_id`, with that multiplicity,
    /// in file name order.
    pub fn files_with_class(&self, class_id: ClassId) -> Vec<(&str, usize)> {
        self.files
            .iter()
            .filter_map(|(name, counts)| {
                counts
                    .get(&class_id)
                    .filter(|&&n| n > 0)
                    .map(|&n| (name.as_str(), n))
            })
            .collect()
    }

    /// Sum of per-file multiplicities.
    pub fn class_counts(&self) -> ClassCount {
        let mut totals = ClassCount::new();
        for counts in self.files.values() {
            for (&class_id, &n) in counts {
                *totals.entry(class_id).or_insert(0) += n;
            }
        }
        totals
    }
}

/// Result of scanning one folder.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    pub folder: PathBuf,
    pub class_counts: ClassCount,
    pub files: ClassFileIndex,
    pub malformed: Vec<MalformedLine>,
    /// Annotation files that could not be read at all
    pub unreadable: Vec<String>,
}

impl FolderIndex {
    pub fn empty(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn count(&self, class_id: ClassId) -> usize {
        self.class_counts.get(&class_id).copied().unwrap_or(0)
    }

    pub fn total_objects(&self) -> usize {
        self.class_counts.values().sum()
    }

    /// Re-read a single file and update the index in place.
    /// A file that no longer exists is dropped.
    pub fn refresh_file(&mut self, file_name: &str) -> std::io::Result<()> {
        let path = self.folder.join(file_name);
        let previous = self.files.remove(file_name);

        if let Some(prev) = previous {
            for (class_id, n) in prev {
                if let Some(total) = self.class_counts.get_mut(&class_id) {
                    *total = total.saturating_sub(n);
                }
            }
            self.class_counts.retain(|_, n| *n > 0);
        }

        if !path.exists() {
            return Ok(());
        }

        let record = AnnotationRecord::read(&path)?;
        let counts = record.class_counts();
        for (&class_id, &n) in &counts {
            *self.class_counts.entry(class_id).or_insert(0) += n;
        }
        self.files.insert(file_name, counts);
        Ok(())
    }
}

/// List annotation file names in `folder`, sorted. Skips `classes.txt`.
pub fn list_annotation_files(folder: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_annotation_file(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Scan a folder of annotation files.
///
/// Never mutates the filesystem. Fails only if the folder itself cannot be
/// listed; unreadable files and malformed lines are recorded and skipped.
pub fn scan(folder: &Path) -> std::io::Result<FolderIndex> {
    info!("Indexing annotations in {:?}", folder);

    let mut index = FolderIndex::empty(folder);

    for name in list_annotation_files(folder)? {
        let path = folder.join(&name);
        match AnnotationRecord::read(&path) {
            Ok(record) => {
                let counts = record.class_counts();
                for (&class_id, &n) in &counts {
                    *index.class_counts.entry(class_id).or_insert(0) += n;
                }
                if counts.is_empty() {
                    debug!("{} has no object lines", name);
                }
                index.malformed.extend(record.malformed);
                index.files.insert(name, counts);
            }
            Err(e) => {
                warn!("Failed to read annotation file {:?}: {}", path, e);
                index.unreadable.push(name);
            }
        }
    }

    info!(
        "Indexed {} files, {} objects across {} classes in {:?}",
        index.files.len(),
        index.total_objects(),
        index.class_counts.len(),
        folder
    );

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_scan_counts_per_class_and_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "0 0.5 0.5 0.1 0.1\n0 0.2 0.2 0.1 0.1\n1 0.3 0.3 0.1 0.1\n");
        write(dir.path(), "b.txt", "1 0.5 0.5 0.1 0.1\n");
        write(dir.path(), "classes.txt", "0\n1\n2\n");
        write(dir.path(), "a.jpg", "img");

        let index = scan(dir.path()).unwrap();

        assert_eq!(index.count(0), 2);
        assert_eq!(index.count(1), 2);
        assert_eq!(index.files.len(), 2);
        assert!(!index.files.contains("classes.txt"));
        assert_eq!(index.files.files_with_class(1), vec![("a.txt", 1), ("b.txt", 1)]);
        assert_eq!(index.files.class_counts(), index.class_counts);
    }

    #[test]
    fn test_scan_indexes_empty_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "empty.txt", "");
        write(dir.path(), "mixed.txt", "x 0.1 0.1 0.1 0.1\n2: 0.1 0.1 0.1 0.1\n");

        let index = scan(dir.path()).unwrap();

        assert!(index.files.contains("empty.txt"));
        assert!(index.files.get("empty.txt").unwrap().is_empty());
        assert_eq!(index.count(2), 1);
        assert_eq!(index.malformed.len(), 1);
        assert_eq!(index.malformed[0].file, "mixed.txt");
    }

    #[test]
    fn test_scan_missing_folder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_refresh_file_tracks_edits_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "0 a\n0 b\n");
        let mut index = scan(dir.path()).unwrap();
        assert_eq!(index.count(0), 2);

        write(dir.path(), "a.txt", "0 a\n1 b\n");
        index.refresh_file("a.txt").unwrap();
        assert_eq!(index.count(0), 1);
        assert_eq!(index.count(1), 1);

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        index.refresh_file("a.txt").unwrap();
        assert_eq!(index.count(0), 0);
        assert!(index.files.is_empty());
    }
}
