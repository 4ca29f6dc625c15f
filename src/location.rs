//! Stream locator.
//!
//! Turns classpath references into [`Location`]s and opens the matching
//! traversal. The directory/archive decision is made by a [`Classifier`]
//! handed to the locator at construction time.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::error::ScanError;
use crate::filter::EntryFilter;
use crate::traverse::{ArchiveSource, ClassSource, ClassStream, DirectorySource};

/// A resolved scan root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Directory(PathBuf),
    Archive(PathBuf),
}

impl Location {
    pub fn path(&self) -> &Path {
        match self {
            Self::Directory(path) | Self::Archive(path) => path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(path) => write!(f, "directory {}", path.display()),
            Self::Archive(path) => write!(f, "archive {}", path.display()),
        }
    }
}

pub type Classifier = fn(&Path) -> Location;

/// Resolves the path to a real filesystem path first; only a path that cannot
/// be resolved at all is assumed to be an archive.
pub fn classify(path: &Path) -> Location {
    match fs::canonicalize(path) {
        Ok(real) if real.is_dir() => Location::Directory(real),
        Ok(real) => Location::Archive(real),
        Err(_) => Location::Archive(path.to_path_buf()),
    }
}

/// Accepts plain paths and `file:` URLs. Percent-encoded URLs are decoded;
/// when a URL cannot be mapped to a local path its raw path component is used.
pub fn resolve_reference(reference: &str) -> PathBuf {
    match Url::parse(reference) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .unwrap_or_else(|()| PathBuf::from(url.path())),
        _ => PathBuf::from(reference),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamLocator {
    classify: Classifier,
}

impl Default for StreamLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamLocator {
    pub fn new() -> Self {
        Self::with_classifier(classify)
    }

    pub fn with_classifier(classify: Classifier) -> Self {
        Self { classify }
    }

    pub fn locate(&self, path: &Path) -> Location {
        (self.classify)(path)
    }

    pub fn locate_reference(&self, reference: &str) -> Location {
        self.locate(&resolve_reference(reference))
    }

    /// Opens the underlying handle for `location`. The returned source owns it
    /// and releases it when dropped.
    pub fn open(&self, location: &Location) -> Result<Box<dyn ClassSource>, ScanError> {
        debug!("Opening {location}");
        match location {
            Location::Directory(path) => Ok(Box::new(DirectorySource::open(path)?)),
            Location::Archive(path) => Ok(Box::new(ArchiveSource::open(path)?)),
        }
    }

    pub fn for_each_class(
        &self,
        location: &Location,
        filter: &EntryFilter,
        visit: &mut dyn FnMut(ClassStream<'_>) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        self.open(location)?.for_each_class(filter, visit)
    }
}
