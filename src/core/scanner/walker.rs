//! Directory walking implementation using walkdir.

use super::{filter::ImageFilter, ImageFile, ImageScanner, ScanResult};
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for the directory scanner
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether to follow symbolic links to directories
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories (dot-prefixed names)
    pub include_hidden: bool,
    /// Custom extensions to include (None = jpg, jpeg, png)
    pub extensions: Option<Vec<String>>,
    /// Skip files that already carry the rotated marker
    pub skip_rotated_outputs: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            extensions: None,
            skip_rotated_outputs: true,
        }
    }
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: ImageFilter,
}

impl WalkDirScanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Self {
        let mut filter = ImageFilter::new()
            .with_hidden(config.include_hidden)
            .with_skip_rotated_outputs(config.skip_rotated_outputs);

        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions.clone());
        }

        Self { config, filter }
    }

    fn is_hidden_dir(&self, entry: &DirEntry) -> bool {
        !self.config.include_hidden
            && entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with('.'))
                .unwrap_or(false)
    }

    fn entry_error(err: walkdir::Error) -> ScanError {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();

        if err.loop_ancestor().is_some() {
            return ScanError::SymlinkLoop { path };
        }

        match err.into_io_error() {
            Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                ScanError::PermissionDenied { path }
            }
            Some(io) => ScanError::ReadEntry { path, source: io },
            None => ScanError::ReadEntry {
                path,
                source: std::io::Error::other("unreadable directory entry"),
            },
        }
    }

    fn record_error(errors: &mut Vec<ScanError>, error: ScanError, path: PathBuf, events: &EventSender) {
        warn!(path = %path.display(), "Skipping entry: {}", error);
        events.send(Event::Scan(ScanEvent::Error {
            path,
            message: error.to_string(),
        }));
        errors.push(error);
    }
}

impl ImageScanner for WalkDirScanner {
    fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        self.scan_with_events(root, &crate::events::null_sender())
    }

    fn scan_with_events(&self, root: &Path, events: &EventSender) -> Result<ScanResult, ScanError> {
        if !root.exists() {
            return Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        if !root.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        events.send(Event::Scan(ScanEvent::Started {
            root: root.to_path_buf(),
        }));

        let mut images = Vec::new();
        let mut errors = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_hidden_dir(entry));

        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    Self::record_error(&mut errors, Self::entry_error(e), path, events);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if !self.filter.should_include(path) {
                continue;
            }

            // fs::metadata follows symlinks, so a dangling link shows up here
            match fs::metadata(path) {
                Ok(metadata) if metadata.is_file() => {
                    debug!(path = %path.display(), "Found image");
                    events.send(Event::Scan(ScanEvent::ImageFound {
                        path: path.to_path_buf(),
                    }));
                    images.push(ImageFile {
                        path: path.to_path_buf(),
                        format: self.filter.get_format(path),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    let error = if e.kind() == std::io::ErrorKind::PermissionDenied {
                        ScanError::PermissionDenied {
                            path: path.to_path_buf(),
                        }
                    } else {
                        ScanError::ReadEntry {
                            path: path.to_path_buf(),
                            source: e,
                        }
                    };
                    Self::record_error(&mut errors, error, path.to_path_buf(), events);
                }
            }
        }

        events.send(Event::Scan(ScanEvent::Completed {
            total_images: images.len(),
        }));

        Ok(ScanResult { images, errors })
    }
}
