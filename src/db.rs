//! Index lifecycle.
//!
//! [`AnnotationDb`] owns the indices of the last successful scan together with
//! the options that produced them. A scan always starts from empty indices and
//! only replaces the current ones once every location has been read, so a
//! failed scan leaves the previous result in place.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use tracing::{debug, info};

use crate::error::ScanError;
use crate::filter::EntryFilter;
use crate::index::{AnnotationIndex, ClassIndex, Index, ScanOptions, TypeIndex};
use crate::location::{Location, StreamLocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexState {
    Fresh,
    Populated,
    Cleared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub locations: usize,
    pub classes_read: usize,
    pub classes_indexed: usize,
    pub classes_ignored: usize,
}

#[derive(Debug, Clone)]
pub struct AnnotationDb {
    options: ScanOptions,
    locator: StreamLocator,
    filter: EntryFilter,
    index: Index,
    summary: ScanSummary,
    state: IndexState,
}

/// Everything a dump shows, in one serializable value.
#[derive(Serialize)]
struct Report<'a> {
    state: IndexState,
    options: &'a ScanOptions,
    summary: ScanSummary,
    index: &'a Index,
}

impl Default for AnnotationDb {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

impl AnnotationDb {
    pub fn new(options: ScanOptions) -> Self {
        Self::with_locator(options, StreamLocator::new())
    }

    pub fn with_locator(options: ScanOptions, locator: StreamLocator) -> Self {
        Self {
            options,
            locator,
            filter: EntryFilter,
            index: Index::default(),
            summary: ScanSummary::default(),
            state: IndexState::Fresh,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn locator(&self) -> &StreamLocator {
        &self.locator
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Counts of the scan that produced the current indices.
    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn annotation_index(&self) -> &AnnotationIndex {
        &self.index.annotations
    }

    pub fn type_index(&self) -> &TypeIndex {
        &self.index.types
    }

    pub fn class_index(&self) -> &ClassIndex {
        &self.index.classes
    }

    /// Empties every index. Options are kept.
    pub fn clear(&mut self) {
        self.index.clear();
        self.summary = ScanSummary::default();
        self.state = IndexState::Cleared;
    }

    /// Scans `locations` in order and replaces the current indices with the
    /// result. On error nothing changes.
    pub fn scan(&mut self, locations: &[Location]) -> Result<ScanSummary, ScanError> {
        self.options.validate()?;

        let targets = self.options.targets();
        let ignored = self.options.ignored_packages();
        let mut staged = Index::default();
        let mut summary = ScanSummary::default();

        for location in locations {
            debug!("Scanning {location}");
            summary.locations += 1;
            self.locator.for_each_class(location, &self.filter, &mut |stream| {
                let entry_name = stream.name().to_string();
                let facts = stream
                    .read_facts(targets)
                    .map_err(|e| ScanError::malformed(location.path(), entry_name, e))?;
                summary.classes_read += 1;
                if staged.fold(&facts, ignored) {
                    summary.classes_indexed += 1;
                } else {
                    summary.classes_ignored += 1;
                }
                Ok(())
            })?;
        }

        info!(
            "Scanned {} location(s): {} classes read, {} indexed, {} ignored",
            summary.locations,
            summary.classes_read,
            summary.classes_indexed,
            summary.classes_ignored
        );
        self.index = staged;
        self.summary = summary;
        self.state = IndexState::Populated;
        Ok(summary)
    }

    pub fn write_annotation_index(&self, out: &mut impl Write) -> io::Result<()> {
        write_mapping(out, "Annotation index", &self.index.annotations)
    }

    pub fn write_type_index(&self, out: &mut impl Write) -> io::Result<()> {
        write_mapping(out, "Type index", &self.index.types)
    }

    /// State, options, summary and all three indices as pretty JSON.
    pub fn write_json_report(&self, out: &mut impl Write) -> io::Result<()> {
        let report = Report {
            state: self.state,
            options: &self.options,
            summary: self.summary,
            index: &self.index,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)
    }

    /// The annotation index as text, for diagnostic logging.
    pub fn annotation_index_report(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_annotation_index(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

fn write_mapping(
    out: &mut impl Write,
    title: &str,
    mapping: &BTreeMap<String, BTreeSet<String>>,
) -> io::Result<()> {
    writeln!(out, "{title} ({} entries)", mapping.len())?;
    for (key, classes) in mapping {
        writeln!(out, "  {key}")?;
        for class in classes {
            writeln!(out, "    {class}")?;
        }
    }
    Ok(())
}
