use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Integer category label of a detected object.
pub type ClassId = u32;

/// Per-class multiplicities of a single annotation file.
pub type FileClassCounts = BTreeMap<ClassId, usize>;

/// File name of the class-name metadata file. Never treated as an annotation.
pub const CLASSES_FILE: &str = "classes.txt";

/// A single object line of an annotation file.
///
/// Only the class id is interpreted. The geometry tail is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInstance {
    pub class_id: ClassId,
    pub geometry: String,
}

/// A line that could not yield a class id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedLine {
    pub file: String,
    pub line_number: usize,
    pub content: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationLine {
    Object { instance: ObjectInstance, raw: String },
    /// Blank, comment or malformed line, kept verbatim
    Passthrough(String),
}

impl AnnotationLine {
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            AnnotationLine::Object { instance, .. } => Some(instance.class_id),
            AnnotationLine::Passthrough(_) => None,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            AnnotationLine::Object { raw, .. } => raw,
            AnnotationLine::Passthrough(raw) => raw,
        }
    }
}

/// Parsed contents of one annotation file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub lines: Vec<AnnotationLine>,
    pub malformed: Vec<MalformedLine>,
}

/// Extract the class id from a single annotation line.
///
/// Format: `class_id x_center y_center width height`. A trailing `:` after the
/// class id is tolerated. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_class_id(line: &str) -> Result<Option<ObjectInstance>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (first, rest) = match line.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (line, ""),
    };
    let token = first.strip_suffix(':').unwrap_or(first);

    token
        .parse::<ClassId>()
        .map(|class_id| {
            Some(ObjectInstance {
                class_id,
                geometry: rest.to_string(),
            })
        })
        .map_err(|e| format!("invalid class id '{}': {}", token, e))
}

impl AnnotationRecord {
    /// Parse annotation text. Malformed lines are recorded and kept verbatim.
    pub fn parse(text: &str, file_name: &str) -> Self {
        let mut record = AnnotationRecord::default();

        for (idx, raw) in text.lines().enumerate() {
            match parse_class_id(raw) {
                Ok(Some(instance)) => record.lines.push(AnnotationLine::Object {
                    instance,
                    raw: raw.to_string(),
                }),
                Ok(None) => record.lines.push(AnnotationLine::Passthrough(raw.to_string())),
                Err(reason) => {
                    warn!(
                        "Skipping malformed line {} in {}: {:?} ({})",
                        idx + 1,
                        file_name,
                        raw.trim(),
                        reason
                    );
                    record.malformed.push(MalformedLine {
                        file: file_name.to_string(),
                        line_number: idx + 1,
                        content: raw.trim().to_string(),
                        reason,
                    });
                    record.lines.push(AnnotationLine::Passthrough(raw.to_string()));
                }
            }
        }

        record
    }

    /// Read and parse an annotation file.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::parse(&content, &file_name))
    }

    pub fn class_counts(&self) -> FileClassCounts {
        let mut counts = FileClassCounts::new();
        for class_id in self.lines.iter().filter_map(AnnotationLine::class_id) {
            *counts.entry(class_id).or_insert(0) += 1;
        }
        counts
    }

    pub fn object_count(&self) -> usize {
        self.lines.iter().filter(|l| l.class_id().is_some()).count()
    }

    pub fn count_of(&self, class_id: ClassId) -> usize {
        self.lines
            .iter()
            .filter(|l| l.class_id() == Some(class_id))
            .count()
    }

    /// Remove up to `max` object lines of `class_id`, first occurrences first.
    /// Lines of other classes and passthrough lines are untouched.
    pub fn take_class_lines(&mut self, class_id: ClassId, max: usize) -> Vec<String> {
        let mut removed = Vec::new();
        self.lines.retain(|line| {
            if removed.len() < max && line.class_id() == Some(class_id) {
                removed.push(line.raw().to_string());
                false
            } else {
                true
            }
        });
        debug!("Took {} lines of class {} from record", removed.len(), class_id);
        removed
    }

    /// Render back to text, one line per entry with a trailing newline.
    pub fn to_text(&self) -> String {
        join_lines(self.lines.iter().map(AnnotationLine::raw))
    }
}

/// Join lines with `\n`, terminating the last one.
pub fn join_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}

/// Whether a file name denotes a per-image annotation file.
pub fn is_annotation_file(file_name: &str) -> bool {
    file_name != CLASSES_FILE
        && Path::new(file_name)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false)
}

/// Load class names from `classes.txt` in `folder`.
///
/// Line `i` names class `i`; `"<id>: <name>"` lines yield `<name>`. Blank
/// lines keep their position as an empty name; trailing blank lines are dropped.
/// Returns an empty list if the file is absent.
pub fn load_class_names(folder: &Path) -> Vec<String> {
    let classes_path = folder.join(CLASSES_FILE);
    match fs::read_to_string(&classes_path) {
        Ok(content) => {
            let mut names: Vec<String> = content
                .lines()
                .map(str::trim)
                .map(|l| l.rsplit(": ").next().unwrap_or(l).to_string())
                .collect();
            while names.last().is_some_and(|n| n.is_empty()) {
                names.pop();
            }
            info!("Loaded {} class names from {:?}", names.len(), classes_path);
            names
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {:?}: {}", classes_path, e);
            } else {
                debug!("No {} in {:?}", CLASSES_FILE, folder);
            }
            Vec::new()
        }
    }
}

/// Get class name for a given class ID
pub fn class_name(names: &[String], class_id: ClassId) -> &str {
    names
        .get(class_id as usize)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or("Unknown")
}
