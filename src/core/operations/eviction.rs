//! Removal of excess object instances from the output pool into the overflow
//! folder.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::dataset::{join_lines, AnnotationRecord, ClassId, FileClassCounts};
use crate::error::{FileOpError, FileOpResult};

use super::file_ops::{append_text, write_atomic};

/// How over-represented classes are trimmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Move whole pairs only when they hold nothing but the trimmed class;
    /// otherwise strip lines in place
    #[default]
    Isolating,
    /// Always strip lines in place; never move files
    LinesOnly,
    /// Move whole pairs whenever they fit in the remaining excess, even if
    /// that drops instances of other classes from the output
    WholeFile,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            EvictionPolicy::Isolating => "Isolating",
            EvictionPolicy::LinesOnly => "Lines Only",
            EvictionPolicy::WholeFile => "Whole File",
        }
    }
}

/// What to do with one candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionStep {
    /// Remove this many lines of the class, leaving the pair in place
    StripLines(usize),
    /// Move the whole annotation/image pair to the overflow folder
    MoveFile,
}

/// Decide how to absorb up to `remaining` excess instances of `class_id`
/// from a file with the given per-class counts.
pub fn choose_step(
    policy: EvictionPolicy,
    counts: &FileClassCounts,
    class_id: ClassId,
    remaining: usize,
) -> EvictionStep {
    let in_file = counts.get(&class_id).copied().unwrap_or(0);
    if in_file > remaining {
        return EvictionStep::StripLines(remaining);
    }

    let only_this_class = counts
        .iter()
        .all(|(&other, &n)| other == class_id || n == 0);

    match policy {
        EvictionPolicy::LinesOnly => EvictionStep::StripLines(in_file),
        EvictionPolicy::Isolating if !only_this_class => EvictionStep::StripLines(in_file),
        EvictionPolicy::Isolating | EvictionPolicy::WholeFile => EvictionStep::MoveFile,
    }
}

/// Remove up to `max` lines of `class_id` from `output/<file_name>` and append
/// them to `extra/<file_name>`.
///
/// The overflow append happens before the in-place rewrite, so a crash can
/// duplicate evicted lines but never lose them. Returns the number of lines
/// removed.
pub fn strip_class_lines(
    output_folder: &Path,
    extra_folder: &Path,
    file_name: &str,
    class_id: ClassId,
    max: usize,
) -> FileOpResult<usize> {
    let path = output_folder.join(file_name);
    let mut record = AnnotationRecord::read(&path).map_err(|e| FileOpError::Io {
        path: path.clone(),
        source: e,
    })?;

    let removed = record.take_class_lines(class_id, max);
    if removed.is_empty() {
        debug!("No lines of class {} left in {}", class_id, file_name);
        return Ok(0);
    }

    append_text(
        &extra_folder.join(file_name),
        &join_lines(removed.iter().map(String::as_str)),
    )?;
    write_atomic(&path, record.to_text().as_bytes())?;

    info!(
        "Evicted {} lines of class {} from {} ({} objects remain)",
        removed.len(),
        class_id,
        file_name,
        record.object_count()
    );
    Ok(removed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_choose_step_partial_when_file_exceeds_remaining() {
        let counts = FileClassCounts::from([(0, 5)]);
        for policy in [
            EvictionPolicy::Isolating,
            EvictionPolicy::LinesOnly,
            EvictionPolicy::WholeFile,
        ] {
            assert_eq!(choose_step(policy, &counts, 0, 2), EvictionStep::StripLines(2));
        }
    }

    #[test]
    fn test_choose_step_single_class_file_moves() {
        let counts = FileClassCounts::from([(0, 2)]);
        assert_eq!(choose_step(EvictionPolicy::Isolating, &counts, 0, 2), EvictionStep::MoveFile);
        assert_eq!(choose_step(EvictionPolicy::WholeFile, &counts, 0, 3), EvictionStep::MoveFile);
        assert_eq!(
            choose_step(EvictionPolicy::LinesOnly, &counts, 0, 3),
            EvictionStep::StripLines(2)
        );
    }

    #[test]
    fn test_choose_step_mixed_file_respects_other_classes() {
        let counts = FileClassCounts::from([(0, 1), (1, 4)]);
        assert_eq!(
            choose_step(EvictionPolicy::Isolating, &counts, 0, 3),
            EvictionStep::StripLines(1)
        );
        assert_eq!(choose_step(EvictionPolicy::WholeFile, &counts, 0, 3), EvictionStep::MoveFile);
    }

    #[test]
    fn test_strip_class_lines_exact_and_lossless() {
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("output");
        let extra = root.path().join("extra");
        fs::create_dir_all(&output).unwrap();
        fs::create_dir_all(&extra).unwrap();
        fs::write(
            output.join("a.txt"),
            "0 0.1 0.1 0.1 0.1\n1 0.2 0.2 0.2 0.2\n0 0.3 0.3 0.3 0.3\n0 0.4 0.4 0.4 0.4\n0 0.5 0.5 0.5 0.5\n",
        )
        .unwrap();
        fs::write(output.join("a.jpg"), "image").unwrap();

        let removed = strip_class_lines(&output, &extra, "a.txt", 0, 3).unwrap();

        assert_eq!(removed, 3);
        let kept = AnnotationRecord::read(&output.join("a.txt")).unwrap();
        assert_eq!(kept.count_of(0), 1);
        assert_eq!(kept.count_of(1), 1);
        assert_eq!(
            fs::read_to_string(extra.join("a.txt")).unwrap(),
            "0 0.1 0.1 0.1 0.1\n0 0.3 0.3 0.3 0.3\n0 0.4 0.4 0.4 0.4\n"
        );
        assert!(output.join("a.jpg").exists());
        assert!(!extra.join("a.jpg").exists());
    }

    #[test]
    fn test_strip_class_lines_appends_to_existing_overflow() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "0 x\n0 y\n").unwrap();
        let extra = root.path().join("extra");
        fs::create_dir_all(&extra).unwrap();
        fs::write(extra.join("a.txt"), "0 w\n").unwrap();

        strip_class_lines(root.path(), &extra, "a.txt", 0, 1).unwrap();

        assert_eq!(fs::read_to_string(extra.join("a.txt")).unwrap(), "0 w\n0 x\n");
        assert_eq!(fs::read_to_string(root.path().join("a.txt")).unwrap(), "0 y\n");
    }
}
