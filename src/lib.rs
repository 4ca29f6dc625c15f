//! # entity-finder
//!
//! Scans classpath directories and jars for annotated classes without loading
//! them, and lists the persistence entities it finds as properties.
//!
//! ## Architecture
//!
//! - **location**: Classpath reference resolution and directory/archive classification
//! - **traverse**: Directory walking and forward-only archive reading
//! - **filter**: Class entry filter and location include/exclude patterns
//! - **classfile**: Class file metadata reader (names, super types, annotations)
//! - **index**: Annotation, type and class indices, scan options
//! - **db**: Index lifecycle (scan, clear, clone, debug dump)
//! - **properties**: Property-name lookup, decoration and properties rendering
//! - **output**: Output file resolution and validation

pub mod classfile;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod index;
pub mod location;
pub mod logging;
pub mod output;
pub mod properties;
pub mod traverse;

#[cfg(test)]
#[allow(dead_code)]
#[path = "../tests/support/classgen.rs"]
mod classgen;
