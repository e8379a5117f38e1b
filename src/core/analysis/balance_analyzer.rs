use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::dataset::{class_name, is_annotation_file, ClassCount, ClassId};
use crate::core::operations::IMAGE_EXTENSIONS;

/// Signed distance of one class from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDelta {
    Shortfall(usize),
    Balanced,
    Excess(usize),
}

pub fn count_of(counts: &ClassCount, class_id: ClassId) -> usize {
    counts.get(&class_id).copied().unwrap_or(0)
}

pub fn class_delta(counts: &ClassCount, class_id: ClassId, target: usize) -> ClassDelta {
    let current = count_of(counts, class_id);
    if current < target {
        ClassDelta::Shortfall(target - current)
    } else if current > target {
        ClassDelta::Excess(current - target)
    } else {
        ClassDelta::Balanced
    }
}

/// Classes below target, with how many instances each is missing
pub fn shortfalls(
    counts: &ClassCount,
    known: &BTreeSet<ClassId>,
    target: usize,
) -> Vec<(ClassId, usize)> {
    known
        .iter()
        .filter_map(|&class_id| match class_delta(counts, class_id, target) {
            ClassDelta::Shortfall(n) => Some((class_id, n)),
            _ => None,
        })
        .collect()
}

/// Classes above target, with how many instances each has too many
pub fn excesses(
    counts: &ClassCount,
    known: &BTreeSet<ClassId>,
    target: usize,
) -> Vec<(ClassId, usize)> {
    known
        .iter()
        .filter_map(|&class_id| match class_delta(counts, class_id, target) {
            ClassDelta::Excess(n) => Some((class_id, n)),
            _ => None,
        })
        .collect()
}

/// Every known class sits exactly at target
pub fn is_balanced(counts: &ClassCount, known: &BTreeSet<ClassId>, target: usize) -> bool {
    known
        .iter()
        .all(|&class_id| class_delta(counts, class_id, target) == ClassDelta::Balanced)
}

/// Per-class table lines: `Class <id> (<name>): <count>`
pub fn format_class_counts(counts: &ClassCount, class_names: &[String]) -> Vec<String> {
    if counts.is_empty() {
        return vec!["No annotations found.".to_string()];
    }
    counts
        .iter()
        .map(|(&class_id, &count)| {
            format!(
                "Class {} ({}): {}",
                class_id,
                class_name(class_names, class_id),
                count
            )
        })
        .collect()
}

/// Log a class table under a heading
pub fn log_class_counts(heading: &str, counts: &ClassCount, class_names: &[String]) {
    info!("{}", heading);
    for line in format_class_counts(counts, class_names) {
        info!("  {}", line);
    }
}

// =============================================================================
// PAIRING INTEGRITY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssueType {
    /// Image file exists but no annotation file
    ImageWithoutLabel,
    /// Annotation file exists but no image
    LabelWithoutImage,
}

/// A single integrity issue
#[derive(Debug, Clone)]
pub struct IntegrityIssue {
    pub issue_type: IntegrityIssueType,
    pub path: PathBuf,
    /// The missing counterpart path
    pub expected_counterpart: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityStats {
    pub images_without_labels: Vec<IntegrityIssue>,
    pub labels_without_images: Vec<IntegrityIssue>,
}

impl IntegrityStats {
    pub fn total_issues(&self) -> usize {
        self.images_without_labels.len() + self.labels_without_images.len()
    }

    pub fn has_issues(&self) -> bool {
        self.total_issues() > 0
    }

    pub fn all_issues(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.labels_without_images
            .iter()
            .chain(self.images_without_labels.iter())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Find annotation files without an image and images without an annotation
/// in a flat folder.
pub fn analyze_pairing(folder: &Path) -> IntegrityStats {
    let mut stats = IntegrityStats::default();

    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read directory {:?}: {}", folder, e);
            return stats;
        }
    };

    let mut image_stems: HashSet<String> = HashSet::new();
    let mut label_stems: HashSet<String> = HashSet::new();
    let mut image_paths = Vec::new();
    let mut label_paths = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let (Some(name), Some(stem)) = (path.file_name(), path.file_stem()) else {
            continue;
        };
        let name = name.to_string_lossy().to_string();
        let stem = stem.to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        if is_annotation_file(&name) {
            label_stems.insert(stem);
            label_paths.push(path);
        } else if is_image_file(&path) {
            image_stems.insert(stem);
            image_paths.push(path);
        }
    }
    image_paths.sort();
    label_paths.sort();

    for image_path in image_paths {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if !label_stems.contains(&stem) {
            stats.images_without_labels.push(IntegrityIssue {
                issue_type: IntegrityIssueType::ImageWithoutLabel,
                expected_counterpart: folder.join(format!("{}.txt", stem)),
                path: image_path,
            });
        }
    }

    for label_path in label_paths {
        let stem = label_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if !image_stems.contains(&stem) {
            stats.labels_without_images.push(IntegrityIssue {
                issue_type: IntegrityIssueType::LabelWithoutImage,
                expected_counterpart: folder.join(format!("{}.{}", stem, IMAGE_EXTENSIONS[0])),
                path: label_path,
            });
        }
    }

    info!(
        "Pairing check of {:?}: {} images without labels, {} labels without images",
        folder,
        stats.images_without_labels.len(),
        stats.labels_without_images.len()
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(ids: &[ClassId]) -> BTreeSet<ClassId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_class_delta() {
        let counts = ClassCount::from([(0, 5), (1, 3)]);
        assert_eq!(class_delta(&counts, 0, 3), ClassDelta::Excess(2));
        assert_eq!(class_delta(&counts, 1, 3), ClassDelta::Balanced);
        assert_eq!(class_delta(&counts, 2, 3), ClassDelta::Shortfall(3));
    }

    #[test]
    fn test_shortfalls_and_excesses_cover_known_classes() {
        let counts = ClassCount::from([(0, 5), (1, 3)]);
        let classes = known(&[0, 1, 2]);

        assert_eq!(shortfalls(&counts, &classes, 3), vec![(2, 3)]);
        assert_eq!(excesses(&counts, &classes, 3), vec![(0, 2)]);
        assert!(!is_balanced(&counts, &classes, 3));
        assert!(is_balanced(&counts, &known(&[1]), 3));
    }

    #[test]
    fn test_format_class_counts() {
        let names = vec!["person".to_string()];
        let lines = format_class_counts(&ClassCount::from([(0, 4), (3, 1)]), &names);
        assert_eq!(lines, vec!["Class 0 (person): 4", "Class 3 (Unknown): 1"]);
        assert_eq!(format_class_counts(&ClassCount::new(), &names), vec!["No annotations found."]);
    }

    #[test]
    fn test_analyze_pairing_finds_orphans() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "a.jpg", "b.txt", "c.png", "classes.txt", "state.json"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let stats = analyze_pairing(dir.path());

        assert_eq!(stats.total_issues(), 2);
        assert_eq!(stats.labels_without_images[0].path, dir.path().join("b.txt"));
        assert_eq!(stats.images_without_labels[0].path, dir.path().join("c.png"));
        assert_eq!(
            stats.images_without_labels[0].expected_counterpart,
            dir.path().join("c.txt")
        );
    }
}
