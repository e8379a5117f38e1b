use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{FileOpError, FileOpResult};

/// Companion image extensions, in lookup priority order.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    Copy,
    Move,
}

impl TransferMode {
    pub fn as_str(&self) -> &str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }
}

/// Outcome of transferring one annotation/image pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Annotation and image both landed in the destination
    Transferred { image: String },
    /// Annotation transferred, but no companion image was found in the source
    MissingImageAsset,
    /// Copy found a byte-identical pair already in place
    AlreadyPresent,
    /// A different file already exists at the destination; nothing was touched
    DestinationConflict { path: PathBuf },
}

impl TransferOutcome {
    /// Whether the annotation now lives in the destination because of this call
    pub fn landed(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Transferred { .. } | TransferOutcome::MissingImageAsset
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestinationState {
    Absent,
    Identical,
    Different,
}

fn io_err(path: &Path, source: std::io::Error) -> FileOpError {
    FileOpError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Find the companion image of an annotation file in `folder`.
/// Extensions are tried in `IMAGE_EXTENSIONS` order; the first hit wins.
pub fn find_image(folder: &Path, annotation_name: &str) -> Option<PathBuf> {
    let stem = Path::new(annotation_name).file_stem()?.to_string_lossy().to_string();
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| folder.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}

/// Byte-for-byte comparison of two files.
pub fn files_identical(a: &Path, b: &Path) -> std::io::Result<bool> {
    let (meta_a, meta_b) = (fs::metadata(a)?, fs::metadata(b)?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

fn destination_state(src: &Path, dest: &Path) -> FileOpResult<DestinationState> {
    if !dest.exists() {
        return Ok(DestinationState::Absent);
    }
    match files_identical(src, dest) {
        Ok(true) => Ok(DestinationState::Identical),
        Ok(false) => Ok(DestinationState::Different),
        Err(e) => Err(io_err(dest, e)),
    }
}

/// Sibling path used for staging writes to `path`.
fn staging_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}", name, suffix))
}

/// Copy `src` to `dest` through a staging file, verifying the size before the
/// final rename. A crash never leaves a truncated file at `dest`.
pub fn copy_verified(src: &Path, dest: &Path) -> FileOpResult<()> {
    let staging = staging_path(dest, "partial");

    let written = fs::copy(src, &staging).map_err(|e| {
        error!("Failed to copy file from {:?} to {:?}: {}", src, staging, e);
        let _ = fs::remove_file(&staging);
        FileOpError::CopyFailed {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            source: e,
        }
    })?;

    let expected = fs::metadata(src).map_err(|e| io_err(src, e))?.len();
    if written != expected {
        let _ = fs::remove_file(&staging);
        return Err(FileOpError::VerifyFailed {
            dest: dest.to_path_buf(),
            expected,
            actual: written,
        });
    }

    fs::rename(&staging, dest).map_err(|e| {
        let _ = fs::remove_file(&staging);
        io_err(dest, e)
    })?;

    debug!("Copied {:?} -> {:?} ({} bytes)", src, dest, written);
    Ok(())
}

/// Replace `path` with `contents` atomically (write sibling temp, then rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> FileOpResult<()> {
    let staging = staging_path(path, "tmp");
    let result = (|| {
        let mut file = fs::File::create(&staging)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&staging, path)
    })();

    result.map_err(|e| {
        error!("Atomic write to {:?} failed: {}", path, e);
        let _ = fs::remove_file(&staging);
        io_err(path, e)
    })
}

/// Append text to `path`, creating it if needed.
pub fn append_text(path: &Path, text: &str) -> FileOpResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(text.as_bytes()).map_err(|e| io_err(path, e))?;
    file.sync_all().map_err(|e| io_err(path, e))
}

fn remove_source(path: &Path) -> FileOpResult<()> {
    fs::remove_file(path).map_err(|e| {
        error!("Failed to remove source file {:?}: {}", path, e);
        FileOpError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Transfer an annotation file and its companion image from `src_folder` to
/// `dst_folder`.
///
/// Never overwrites a differing destination file. The image is copied before
/// the annotation, and for `Move` sources are removed only after both copies
/// are in place.
pub fn transfer(
    mode: TransferMode,
    file_name: &str,
    src_folder: &Path,
    dst_folder: &Path,
) -> FileOpResult<TransferOutcome> {
    let src_annotation = src_folder.join(file_name);
    let dst_annotation = dst_folder.join(file_name);

    if !src_annotation.is_file() {
        return Err(io_err(
            &src_annotation,
            std::io::Error::new(std::io::ErrorKind::NotFound, "annotation file not found"),
        ));
    }

    let src_image = find_image(src_folder, file_name);
    let dst_image = src_image
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| dst_folder.join(n));

    let annotation_state = destination_state(&src_annotation, &dst_annotation)?;
    if annotation_state == DestinationState::Different {
        warn!("Destination conflict, skipping {}: {:?} exists", file_name, dst_annotation);
        return Ok(TransferOutcome::DestinationConflict {
            path: dst_annotation,
        });
    }

    let image_state = match (&src_image, &dst_image) {
        (Some(src), Some(dst)) => Some(destination_state(src, dst)?),
        _ => None,
    };
    if image_state == Some(DestinationState::Different) {
        let path = dst_image.unwrap_or_default();
        warn!("Destination conflict, skipping {}: {:?} exists", file_name, path);
        return Ok(TransferOutcome::DestinationConflict { path });
    }

    let annotation_present = annotation_state == DestinationState::Identical;
    let image_present = image_state.map_or(true, |s| s == DestinationState::Identical);
    if mode == TransferMode::Copy && annotation_present && image_present {
        debug!("{} already present in {:?}", file_name, dst_folder);
        return Ok(TransferOutcome::AlreadyPresent);
    }

    if let (Some(src), Some(dst), Some(DestinationState::Absent)) = (&src_image, &dst_image, image_state) {
        copy_verified(src, dst)?;
    }
    if annotation_state == DestinationState::Absent {
        copy_verified(&src_annotation, &dst_annotation)?;
    }

    if mode == TransferMode::Move {
        remove_source(&src_annotation)?;
        if let Some(src) = &src_image {
            remove_source(src)?;
        }
    }

    match src_image.as_ref().and_then(|p| p.file_name()) {
        Some(image) => {
            info!(
                "{} {} (+{}) {:?} -> {:?}",
                mode.as_str(),
                file_name,
                image.to_string_lossy(),
                src_folder,
                dst_folder
            );
            Ok(TransferOutcome::Transferred {
                image: image.to_string_lossy().to_string(),
            })
        }
        None => {
            warn!("No companion image for {} in {:?}", file_name, src_folder);
            Ok(TransferOutcome::MissingImageAsset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        let dst = root.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        (root, src, dst)
    }

    #[test]
    fn test_find_image_priority_order() {
        let (_root, src, _dst) = setup();
        fs::write(src.join("a.png"), "png").unwrap();
        fs::write(src.join("a.jpeg"), "jpeg").unwrap();
        fs::write(src.join("b.bmp"), "bmp").unwrap();

        assert_eq!(find_image(&src, "a.txt"), Some(src.join("a.jpeg")));
        assert_eq!(find_image(&src, "b.txt"), Some(src.join("b.bmp")));
        assert_eq!(find_image(&src, "c.txt"), None);
    }

    #[test]
    fn test_copy_keeps_source_pair() {
        let (_root, src, dst) = setup();
        fs::write(src.join("a.txt"), "0 0.5 0.5 0.1 0.1\n").unwrap();
        fs::write(src.join("a.jpg"), "image").unwrap();

        let outcome = transfer(TransferMode::Copy, "a.txt", &src, &dst).unwrap();

        assert_eq!(outcome, TransferOutcome::Transferred { image: "a.jpg".into() });
        assert!(src.join("a.txt").exists() && src.join("a.jpg").exists());
        assert!(dst.join("a.txt").exists() && dst.join("a.jpg").exists());
        assert!(!dst.join(".a.txt.partial").exists());
    }

    #[test]
    fn test_move_removes_source_pair() {
        let (_root, src, dst) = setup();
        fs::write(src.join("a.txt"), "0 x\n").unwrap();
        fs::write(src.join("a.png"), "image").unwrap();

        let outcome = transfer(TransferMode::Move, "a.txt", &src, &dst).unwrap();

        assert!(outcome.landed());
        assert!(!src.join("a.txt").exists() && !src.join("a.png").exists());
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "0 x\n");
        assert!(dst.join("a.png").exists());
    }

    #[test]
    fn test_missing_image_still_transfers_annotation() {
        let (_root, src, dst) = setup();
        fs::write(src.join("a.txt"), "0 x\n").unwrap();

        let outcome = transfer(TransferMode::Copy, "a.txt", &src, &dst).unwrap();

        assert_eq!(outcome, TransferOutcome::MissingImageAsset);
        assert!(dst.join("a.txt").exists());
    }

    #[test]
    fn test_destination_conflict_is_noop() {
        let (_root, src, dst) = setup();
        fs::write(src.join("a.txt"), "0 x\n").unwrap();
        fs::write(src.join("a.jpg"), "image").unwrap();
        fs::write(dst.join("a.txt"), "1 y\n").unwrap();

        let outcome = transfer(TransferMode::Move, "a.txt", &src, &dst).unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::DestinationConflict { path: dst.join("a.txt") }
        );
        assert!(src.join("a.txt").exists() && src.join("a.jpg").exists());
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "1 y\n");
        assert!(!dst.join("a.jpg").exists());
    }

    #[test]
    fn test_image_conflict_is_noop() {
        let (_root, src, dst) = setup();
        fs::write(src.join("a.txt"), "0 x\n").unwrap();
        fs::write(src.join("a.jpg"), "image").unwrap();
        fs::write(dst.join("a.jpg"), "other image").unwrap();

        let outcome = transfer(TransferMode::Copy, "a.txt", &src, &dst).unwrap();

        assert!(matches!(outcome, TransferOutcome::DestinationConflict { .. }));
        assert!(!dst.join("a.txt").exists());
    }

    #[test]
    fn test_copy_onto_identical_pair_is_already_present() {
        let (_root, src, dst) = setup();
        for dir in [&src, &dst] {
            fs::write(dir.join("a.txt"), "0 x\n").unwrap();
            fs::write(dir.join("a.jpg"), "image").unwrap();
        }

        let outcome = transfer(TransferMode::Copy, "a.txt", &src, &dst).unwrap();
        assert_eq!(outcome, TransferOutcome::AlreadyPresent);
        assert!(!outcome.landed());
    }

    #[test]
    fn test_move_completes_interrupted_move() {
        let (_root, src, dst) = setup();
        fs::write(src.join("a.txt"), "0 x\n").unwrap();
        fs::write(src.join("a.jpg"), "image").unwrap();
        // Previous run copied the image, then stopped
        fs::write(dst.join("a.jpg"), "image").unwrap();

        let outcome = transfer(TransferMode::Move, "a.txt", &src, &dst).unwrap();

        assert!(outcome.landed());
        assert!(!src.join("a.txt").exists() && !src.join("a.jpg").exists());
        assert!(dst.join("a.txt").exists() && dst.join("a.jpg").exists());
    }

    #[test]
    fn test_transfer_missing_source_is_error() {
        let (_root, src, dst) = setup();
        assert!(transfer(TransferMode::Copy, "nope.txt", &src, &dst).is_err());
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let (_root, src, _dst) = setup();
        let path = src.join("state.json");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!src.join(".state.json.tmp").exists());
    }

    #[test]
    fn test_append_text_creates_and_appends() {
        let (_root, src, _dst) = setup();
        let path = src.join("a.txt");
        append_text(&path, "0 a\n").unwrap();
        append_text(&path, "0 b\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0 a\n0 b\n");
    }
}
