use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::classfile::{ClassFacts, TargetSelection};
use crate::error::ScanError;

/// Annotation type -> classes carrying it.
pub type AnnotationIndex = BTreeMap<String, BTreeSet<String>>;
/// Super class or interface -> classes declaring it.
pub type TypeIndex = BTreeMap<String, BTreeSet<String>>;
/// Class -> annotation types found on it.
pub type ClassIndex = BTreeMap<String, BTreeSet<String>>;

const IMPLICIT_SUPERCLASS: &str = "java.lang.Object";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOptions {
    pub scan_class_annotations: bool,
    pub scan_method_annotations: bool,
    pub scan_parameter_annotations: bool,
    pub scan_field_annotations: bool,
    pub ignored_package_prefixes: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scan_class_annotations: true,
            scan_method_annotations: true,
            scan_parameter_annotations: true,
            scan_field_annotations: true,
            ignored_package_prefixes: Vec::new(),
        }
    }
}

impl ScanOptions {
    pub fn targets(&self) -> TargetSelection {
        TargetSelection {
            types: self.scan_class_annotations,
            methods: self.scan_method_annotations,
            fields: self.scan_field_annotations,
            parameters: self.scan_parameter_annotations,
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        for prefix in &self.ignored_package_prefixes {
            let malformed = prefix.is_empty()
                || prefix.chars().any(char::is_whitespace)
                || prefix.starts_with('.')
                || prefix.ends_with('.')
                || prefix.contains("..");
            if malformed {
                return Err(ScanError::Configuration {
                    message: format!("ignored package prefix {prefix:?} is not a package name"),
                });
            }
        }
        Ok(())
    }

    pub fn ignored_packages(&self) -> IgnoredPackages<'_> {
        IgnoredPackages {
            prefixes: &self.ignored_package_prefixes,
        }
    }
}

/// Matches packages against ignored prefixes segment by segment: `javax`
/// covers `javax.persistence` but not `javaxx`.
#[derive(Debug, Clone, Copy)]
pub struct IgnoredPackages<'a> {
    prefixes: &'a [String],
}

impl IgnoredPackages<'_> {
    pub fn contains_package(&self, package: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            package
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
    }
}

/// The accumulated indices of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Index {
    pub annotations: AnnotationIndex,
    pub types: TypeIndex,
    pub classes: ClassIndex,
}

impl Index {
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.types.is_empty() && self.classes.is_empty()
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.types.clear();
        self.classes.clear();
    }

    /// Folds one class into the indices. Returns `false` when the class lives
    /// under an ignored package and was left out.
    pub fn fold(&mut self, facts: &ClassFacts, ignored: IgnoredPackages<'_>) -> bool {
        if ignored.contains_package(facts.package()) {
            return false;
        }

        let names = facts.annotation_names();
        for annotation in &names {
            self.annotations
                .entry((*annotation).to_string())
                .or_default()
                .insert(facts.name.clone());
        }
        self.classes
            .entry(facts.name.clone())
            .or_default()
            .extend(names.into_iter().map(str::to_string));

        let declared = facts
            .super_name
            .iter()
            .filter(|name| name.as_str() != IMPLICIT_SUPERCLASS)
            .chain(facts.interfaces.iter());
        for supertype in declared {
            self.types
                .entry(supertype.clone())
                .or_default()
                .insert(facts.name.clone());
        }
        true
    }
}
