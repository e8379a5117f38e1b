mod eviction;
mod file_ops;

pub use eviction::{choose_step, strip_class_lines, EvictionPolicy, EvictionStep};
pub use file_ops::{
    append_text, copy_verified, files_identical, find_image, transfer, write_atomic,
    TransferMode, TransferOutcome, IMAGE_EXTENSIONS,
};
