mod index;
mod label;

pub use index::{list_annotation_files, scan, ClassCount, ClassFileIndex, FolderIndex};
pub use label::{
    class_name, is_annotation_file, join_lines, load_class_names, parse_class_id,
    AnnotationLine, AnnotationRecord, ClassId, FileClassCounts, MalformedLine, ObjectInstance,
    CLASSES_FILE,
};
