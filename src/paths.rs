/*!
 * Destination path resolution
 *
 * Governs how remote keys map to filesystem paths below the mount root.
 */

use std::path::{Path, PathBuf};

use crate::types::ObjectToDownload;

/// Compute the destination for a discovered object.
///
/// - the listed prefix is peeled off keys found under it, preserving the
///   subtree structure;
/// - a single file listed by its own name lands at `mount_path/<basename>`;
/// - anything else keeps its key verbatim below the mount root.
pub fn resolve_target_path(mount_path: &Path, file: &ObjectToDownload) -> PathBuf {
    let prefix = format!("{}/", file.path);

    let rel_path: &str = if let Some(stripped) = file.actual_path.strip_prefix(&prefix) {
        stripped
    } else if file.actual_path == file.path {
        base_name(&file.path)
    } else {
        &file.actual_path
    };

    mount_path.join(rel_path)
}

/// Heuristic used to classify repository paths: a string refers to a file
/// iff it is non-empty, does not end in `/`, and its basename contains a
/// dot.
pub fn is_file(path: &str) -> bool {
    !path.is_empty() && !path.ends_with('/') && base_name(path).contains('.')
}

fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
