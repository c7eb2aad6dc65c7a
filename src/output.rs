//! Output directory preparation and frame file naming.
//!
//! Frames are written as `frame-0001.jpg`, `frame-0002.jpg`, ... so that,
//! for up to 9999 frames, lexicographic and numeric ordering of the file
//! names coincide.

use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use crate::error::KeyframeError;

/// The engine's output file-name pattern (image2 muxer syntax).
pub const FRAME_PATTERN: &str = "frame-%04d.jpg";

const FRAME_PREFIX: &str = "frame-";
const FRAME_EXTENSION: &str = ".jpg";
/// Number of digits in a frame index before names stop sorting correctly.
pub const FRAME_INDEX_WIDTH: usize = 4;
/// Highest frame index whose file name still sorts lexicographically.
pub const MAX_SORTABLE_FRAMES: u64 = 10_u64.pow(FRAME_INDEX_WIDTH as u32) - 1;

/// Create `path` (and its parents) unless it already exists.
///
/// Returns `true` when the directory was created by this call. Calling it
/// again on the same path is a no-op, and several jobs racing to create the
/// same directory all succeed.
///
/// # Errors
///
/// Returns [`KeyframeError::Filesystem`] if the directory cannot be created,
/// if `path` exists but is not a directory, or if a file cannot be created
/// inside it.
pub async fn ensure_directory(path: &Path) -> Result<bool, KeyframeError> {
    let filesystem_error = |source| KeyframeError::Filesystem {
        path: path.to_path_buf(),
        source,
    };

    let existed = tokio::fs::try_exists(path).await.map_err(filesystem_error)?;
    if !existed {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(filesystem_error)?;
        log::debug!("Created output directory {}", path.display());
    }

    let metadata = tokio::fs::metadata(path).await.map_err(filesystem_error)?;
    if !metadata.is_dir() {
        return Err(filesystem_error(IoError::new(
            ErrorKind::AlreadyExists,
            "path exists and is not a directory",
        )));
    }

    // Permission bits say nothing about ownership or privileges, so try an
    // actual write. The scratch file is removed when it is dropped.
    let directory = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(".keyframes-")
            .tempfile_in(&directory)
            .map(drop)
    })
    .await
    .map_err(|error| filesystem_error(IoError::other(error)))?
    .map_err(filesystem_error)?;

    Ok(!existed)
}

/// File name of the `index`-th frame (1-based), e.g. `frame-0007.jpg`.
pub fn frame_file_name(index: u64) -> String {
    format!("{FRAME_PREFIX}{index:0width$}{FRAME_EXTENSION}", width = FRAME_INDEX_WIDTH)
}

/// Parse the frame index out of a file name produced by [`FRAME_PATTERN`].
///
/// ```
/// use keyframes::output::parse_frame_index;
///
/// assert_eq!(parse_frame_index("frame-0042.jpg"), Some(42));
/// assert_eq!(parse_frame_index("frame-12345.jpg"), Some(12345));
/// assert_eq!(parse_frame_index("thumbnail.jpg"), None);
/// ```
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXTENSION)?;
    if digits.len() < FRAME_INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// List the frame files in `directory`, ordered by frame index.
///
/// Files that do not match [`FRAME_PATTERN`] are ignored. Sorting is
/// numeric, so the order stays correct past frame 9999 where the names
/// gain a fifth digit.
///
/// # Errors
///
/// Returns [`KeyframeError::Filesystem`] if `directory` cannot be read.
pub fn list_frames(directory: &Path) -> Result<Vec<PathBuf>, KeyframeError> {
    let entries = std::fs::read_dir(directory).map_err(|source| KeyframeError::Filesystem {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut frames: Vec<(u64, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let index = parse_frame_index(entry.file_name().to_str()?)?;
            entry
                .file_type()
                .ok()
                .filter(|file_type| file_type.is_file())
                .map(|_| (index, entry.path()))
        })
        .collect();

    frames.sort_by_key(|(index, _)| *index);
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// [`list_frames`] on the blocking thread pool.
pub(crate) async fn collect_frames(directory: &Path) -> Result<Vec<PathBuf>, KeyframeError> {
    let owned = directory.to_path_buf();
    tokio::task::spawn_blocking(move || list_frames(&owned))
        .await
        .map_err(|error| KeyframeError::Filesystem {
            path: directory.to_path_buf(),
            source: IoError::other(error),
        })?
}
