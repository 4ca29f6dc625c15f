use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::cli::{Cli, ScanArgs};
use crate::filter::LocationFilter;
use crate::index::ScanOptions;
use crate::location::{Location, StreamLocator};
use crate::properties::{DEFAULT_ANNOTATIONS, Decoration, PropertyNames};

pub const BUILD_DIR_ENV: &str = "ENTITY_FINDER_BUILD_DIR";

/// Platform and provider packages that never hold application entities.
pub const DEFAULT_IGNORED_PACKAGES: [&str; 11] = [
    "com.google",
    "com.sun",
    "java",
    "javax",
    "liquibase",
    "org.eclipse",
    "org.glassfish",
    "org.hamcrest",
    "org.hibernate",
    "org.jboss",
    "org.junit",
];

pub fn resolve_build_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.build_dir.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(BUILD_DIR_ENV)
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    let cwd = env::current_dir().context("Failed to resolve current directory")?;
    Ok(cwd.join("target"))
}

pub fn scan_options(args: &ScanArgs) -> ScanOptions {
    let ignored_package_prefixes = if args.no_default_ignores {
        Vec::new()
    } else if args.ignored_packages.is_empty() {
        DEFAULT_IGNORED_PACKAGES.iter().map(|p| p.to_string()).collect()
    } else {
        args.ignored_packages.clone()
    };

    ScanOptions {
        scan_class_annotations: !args.skip_classes,
        scan_method_annotations: args.scan_methods,
        scan_parameter_annotations: args.scan_parameters,
        scan_field_annotations: args.scan_fields,
        ignored_package_prefixes,
    }
}

/// Resolves the classpath references into scan locations. Unreadable
/// elements and elements rejected by the include/exclude patterns are
/// dropped; duplicates are scanned once.
pub fn resolve_locations(args: &ScanArgs, locator: &StreamLocator) -> Vec<Location> {
    let filter = LocationFilter::new(&args.includes, &args.excludes);
    let mut locations: Vec<Location> = Vec::with_capacity(args.classpath.len());

    if args.classpath.is_empty() {
        warn!("The classpath contained no elements; no entities can be found");
    }

    for reference in &args.classpath {
        let location = locator.locate_reference(reference);
        if fs::metadata(location.path()).is_err() {
            warn!("The classpath element {reference} could not be read");
            continue;
        }
        if !filter.accept(location.path()) {
            debug!("Classpath element {reference} filtered out");
            continue;
        }
        if !locations.contains(&location) {
            locations.push(location);
        }
    }

    if locations.is_empty() && !args.classpath.is_empty() {
        warn!("No usable locations were found on the classpath {:?}", args.classpath);
    }
    locations
}

pub fn tracked_annotations(annotations: &[String]) -> Vec<String> {
    if annotations.is_empty() {
        DEFAULT_ANNOTATIONS.iter().map(|a| a.to_string()).collect()
    } else {
        annotations.to_vec()
    }
}

pub fn property_names(
    default_property: Option<&str>,
    mappings: &[(String, String)],
) -> PropertyNames {
    let mut names = PropertyNames::new(default_property);
    for (package, property) in mappings {
        names.insert(package.clone(), property.clone());
    }
    names
}

pub fn decoration(
    first_item_prefix: &str,
    prefix: &str,
    suffix: &str,
    last_item_suffix: &str,
    keep_quotes: bool,
) -> Decoration {
    let decoration = Decoration {
        first_item_prefix: first_item_prefix.to_string(),
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        last_item_suffix: last_item_suffix.to_string(),
    };
    if keep_quotes {
        decoration
    } else {
        decoration.strip_quotes()
    }
}
