//! File filtering logic for the scanner.

use super::ImageFormat;
use crate::core::transform::ROTATED_MARKER;
use std::collections::HashSet;
use std::path::Path;

/// Extensions accepted when no allow-list is configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Filters files to determine if they are candidate images
pub struct ImageFilter {
    /// Lowercased file extensions to include
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
    /// Whether to drop files that already carry the rotated marker
    skip_rotated_outputs: bool,
}

impl ImageFilter {
    /// Create a new filter with default supported extensions
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: true,
            skip_rotated_outputs: true,
        }
    }

    /// Include (default) or skip hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Override the list of extensions to accept
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Skip (or keep) files whose stem already ends in the rotated marker
    pub fn with_skip_rotated_outputs(mut self, skip: bool) -> Self {
        self.skip_rotated_outputs = skip;
        self
    }

    /// Check if a file should be included
    pub fn should_include(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            // Non UTF-8 names still go through the extension check
            return self.extension_matches(path);
        };

        if !self.include_hidden && name.starts_with('.') {
            return false;
        }

        if self.skip_rotated_outputs && is_rotated_output(name) {
            return false;
        }

        self.extension_matches(path)
    }

    fn extension_matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Get the image format for a path
    pub fn get_format(&self, path: &Path) -> ImageFormat {
        path.extension()
            .and_then(|e| e.to_str())
            .map(ImageFormat::from_extension)
            .unwrap_or(ImageFormat::Unknown)
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// A file written by a previous run: the marker sits right before the first dot
fn is_rotated_output(name: &str) -> bool {
    let body = name.strip_prefix('.').unwrap_or(name);
    let stem = match body.find('.') {
        Some(idx) => &body[..idx],
        None => body,
    };
    stem.ends_with(ROTATED_MARKER)
}
