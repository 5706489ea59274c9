//! Destination naming for rewritten images.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Marker inserted before the extension of a sibling output
pub const ROTATED_MARKER: &str = "-rotated";

/// Sibling path for a rotated copy: the marker goes before the first dot of
/// the file name, so `trip.2020.jpg` becomes `trip-rotated.2020.jpg`.
///
/// A leading dot (hidden file) is not treated as an extension separator.
/// Directory components are never modified.
pub fn rotated_path(path: &Path) -> PathBuf {
    let Some(file_name) = path.file_name() else {
        return path.to_path_buf();
    };

    let renamed = match file_name.to_str() {
        Some(name) => OsString::from(insert_marker(name)),
        None => {
            // Non UTF-8 name: fall back to stem + marker + last extension
            let mut renamed = path.file_stem().map(OsString::from).unwrap_or_default();
            renamed.push(ROTATED_MARKER);
            if let Some(ext) = path.extension() {
                renamed.push(".");
                renamed.push(ext);
            }
            renamed
        }
    };

    path.with_file_name(renamed)
}

fn insert_marker(name: &str) -> String {
    let search_from = usize::from(name.starts_with('.'));
    match name[search_from..].find('.') {
        Some(idx) => {
            let split = search_from + idx;
            format!("{}{}{}", &name[..split], ROTATED_MARKER, &name[split..])
        }
        None => format!("{}{}", name, ROTATED_MARKER),
    }
}
