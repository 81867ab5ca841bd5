/*!
 * Resource bundle packaging
 *
 * Ancillary files (service-account keys and similar) travel from the
 * controller to the worker as a JSON map of relative path to base64
 * content. Dot-prefixed files are excluded, dot-prefixed directories in
 * their entirety.
 */

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use walkdir::WalkDir;

use crate::error::{Result, VolareError};

/// Encode a directory tree into a map of relative path to base64 content,
/// skipping dot-prefixed entries.
pub fn read_files_as_base64(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
    });

    for entry in walker {
        let entry = entry.map_err(|e| VolareError::Io(io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| VolareError::Io(io::Error::other(e)))?
            .to_string_lossy()
            .into_owned();

        let content = fs::read(entry.path())?;
        files.insert(rel_path, BASE64.encode(content));
    }

    Ok(files)
}

/// Reconstruct a directory tree from a JSON map produced by
/// [`read_files_as_base64`]. Directories are created as needed (0755),
/// files written with default permissions (0644).
pub fn write_resources_dir(data: &str, path: &Path) -> Result<()> {
    let resource_map: BTreeMap<String, String> =
        serde_json::from_str(data).map_err(VolareError::ResourcesJson)?;

    fs::create_dir_all(path).map_err(|source| VolareError::CreateDir {
        path: path.to_path_buf(),
        source,
    })?;

    for (rel_path, encoded) in resource_map {
        let bytes = BASE64
            .decode(&encoded)
            .map_err(|source| VolareError::ResourceDecode {
                path: rel_path.clone(),
                source,
            })?;

        let full_path = path.join(&rel_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|source| VolareError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&full_path, bytes).map_err(|source| VolareError::WriteFile {
            path: full_path.clone(),
            source,
        })?;
    }

    Ok(())
}
