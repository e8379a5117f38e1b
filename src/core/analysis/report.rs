use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::dataset::{class_name, ClassCount, ClassId, MalformedLine};

/// Non-fatal conditions collected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceWarning {
    MalformedAnnotationLine(MalformedLine),
    MissingImageAsset {
        file: String,
        folder: PathBuf,
    },
    DestinationConflict {
        file: String,
        path: PathBuf,
    },
    /// A transfer or eviction failed with an I/O error and was skipped
    TransferFailed {
        file: String,
        reason: String,
    },
    UnsatisfiableClass {
        class_id: ClassId,
        final_count: usize,
        available: usize,
    },
    /// Under target at the end of the run while secondary files were left
    ClassShortfall {
        class_id: ClassId,
        final_count: usize,
        remaining_files: usize,
    },
    IterationBoundExceeded {
        iterations: usize,
    },
    FolderUnreadable {
        folder: PathBuf,
        reason: String,
    },
    UnpairedFile {
        path: PathBuf,
        expected_counterpart: PathBuf,
    },
}

impl BalanceWarning {
    pub fn describe(&self, class_names: &[String]) -> String {
        match self {
            BalanceWarning::MalformedAnnotationLine(line) => format!(
                "Malformed line {} in {}: {:?} ({})",
                line.line_number, line.file, line.content, line.reason
            ),
            BalanceWarning::MissingImageAsset { file, folder } => {
                format!("No image found for {} in {:?}", file, folder)
            }
            BalanceWarning::DestinationConflict { file, path } => {
                format!("Skipped {}: {:?} already exists", file, path)
            }
            BalanceWarning::TransferFailed { file, reason } => {
                format!("Failed to process {}: {}", file, reason)
            }
            BalanceWarning::UnsatisfiableClass {
                class_id,
                final_count,
                available,
            } => format!(
                "Class {} ({}) cannot reach target: {} in output, {} available in input + secondary",
                class_id,
                class_name(class_names, *class_id),
                final_count,
                available
            ),
            BalanceWarning::ClassShortfall {
                class_id,
                final_count,
                remaining_files,
            } => format!(
                "Class {} ({}) ended under target at {}; {} secondary file(s) still unused",
                class_id,
                class_name(class_names, *class_id),
                final_count,
                remaining_files
            ),
            BalanceWarning::IterationBoundExceeded { iterations } => format!(
                "Reached maximum of {} iterations; rebalancing may be incomplete",
                iterations
            ),
            BalanceWarning::FolderUnreadable { folder, reason } => {
                format!("Cannot read {:?}: {}", folder, reason)
            }
            BalanceWarning::UnpairedFile {
                path,
                expected_counterpart,
            } => format!("{:?} has no counterpart (expected {:?})", path, expected_counterpart),
        }
    }
}

/// Why the top-up/evict loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceOutcome {
    /// Every known class sits exactly at target
    Exact,
    /// A full pass changed nothing
    #[default]
    FixedPoint,
    IterationBound,
    Cancelled,
}

impl BalanceOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            BalanceOutcome::Exact => "Converged exactly",
            BalanceOutcome::FixedPoint => "Reached fixed point",
            BalanceOutcome::IterationBound => "Stopped at iteration bound",
            BalanceOutcome::Cancelled => "Cancelled",
        }
    }
}

/// End-of-run report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub target_count: usize,
    pub outcome: BalanceOutcome,
    pub iterations: usize,
    pub class_names: Vec<String>,
    pub final_counts: ClassCount,
    pub files_copied: usize,
    pub files_evicted: usize,
    pub lines_evicted: usize,
    pub warnings: Vec<BalanceWarning>,
}

impl BalanceReport {
    pub fn new(target_count: usize) -> Self {
        Self {
            target_count,
            ..Default::default()
        }
    }

    pub fn warn(&mut self, warning: BalanceWarning) {
        self.warnings.push(warning);
    }

    pub fn count(&self, class_id: ClassId) -> usize {
        self.final_counts.get(&class_id).copied().unwrap_or(0)
    }

    pub fn unsatisfiable_classes(&self) -> Vec<ClassId> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                BalanceWarning::UnsatisfiableClass { class_id, .. } => Some(*class_id),
                _ => None,
            })
            .collect()
    }

    pub fn missing_images(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, BalanceWarning::MissingImageAsset { .. }))
            .count()
    }

    pub fn is_balanced(&self) -> bool {
        self.outcome == BalanceOutcome::Exact
    }

    /// Human-readable summary, one entry per line
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} after {} iteration(s), target {} per class",
            self.outcome.as_str(),
            self.iterations,
            self.target_count
        ));

        if self.final_counts.is_empty() {
            lines.push("No annotations found.".to_string());
        }
        for (&class_id, &count) in &self.final_counts {
            let marker = if count == self.target_count { "✓" } else { "✗" };
            lines.push(format!(
                "{} Class {} ({}): {}",
                marker,
                class_id,
                class_name(&self.class_names, class_id),
                count
            ));
        }

        let total: usize = self.final_counts.values().sum();
        lines.push(format!("Total annotations: {}", total));
        if !self.final_counts.is_empty() {
            lines.push(format!(
                "Average annotations per class: {:.2}",
                total as f64 / self.final_counts.len() as f64
            ));
        }
        lines.push(format!(
            "Files copied: {}, files evicted: {}, lines evicted: {}",
            self.files_copied, self.files_evicted, self.lines_evicted
        ));

        if !self.warnings.is_empty() {
            lines.push(format!("{} warning(s):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  - {}", warning.describe(&self.class_names)));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_marks_classes_off_target() {
        let mut report = BalanceReport::new(2);
        report.class_names = vec!["person".to_string()];
        report.final_counts = ClassCount::from([(0, 2), (1, 1)]);
        report.warn(BalanceWarning::UnsatisfiableClass {
            class_id: 1,
            final_count: 1,
            available: 1,
        });

        let lines = report.summary_lines();

        assert!(lines.iter().any(|l| l == "✓ Class 0 (person): 2"));
        assert!(lines.iter().any(|l| l == "✗ Class 1 (Unknown): 1"));
        assert!(lines.iter().any(|l| l == "Total annotations: 3"));
        assert!(lines.iter().any(|l| l == "Average annotations per class: 1.50"));
        assert_eq!(report.unsatisfiable_classes(), vec![1]);
    }

    #[test]
    fn test_report_json_roundtrip() {
        let mut report = BalanceReport::new(3);
        report.outcome = BalanceOutcome::IterationBound;
        report.warn(BalanceWarning::IterationBoundExceeded { iterations: 5 });
        report.warn(BalanceWarning::MissingImageAsset {
            file: "a.txt".into(),
            folder: PathBuf::from("in"),
        });

        let json = serde_json::to_string(&report).unwrap();
        let loaded: BalanceReport = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded, report);
        assert_eq!(loaded.missing_images(), 1);
    }
}
