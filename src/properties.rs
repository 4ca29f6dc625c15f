//! Grouping of annotated classes into output properties.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use tracing::debug;

use crate::filter::TextMatcher;
use crate::index::AnnotationIndex;

pub const DEFAULT_PROPERTY_NAME: &str = "entityClassnames";

pub const DEFAULT_ANNOTATIONS: [&str; 4] = [
    "javax.persistence.Entity",
    "javax.persistence.MappedSuperclass",
    "javax.persistence.Embeddable",
    "javax.persistence.IdClass",
];

const QUOTED: &str = r#"(?s)^(?:'(.+)'|"(.+)")$"#;

/// Property names keyed by package prefix.
#[derive(Debug, Clone)]
pub struct PropertyNames {
    by_package: BTreeMap<String, String>,
    default_name: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PropertyNames {
    /// A blank default name falls back to [`DEFAULT_PROPERTY_NAME`].
    pub fn new(default_name: Option<&str>) -> Self {
        let default_name = default_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PROPERTY_NAME);
        Self {
            by_package: BTreeMap::new(),
            default_name: default_name.to_string(),
        }
    }

    pub fn insert(&mut self, package: impl Into<String>, property: impl Into<String>) {
        self.by_package.insert(package.into(), property.into());
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Looks up the class's package, then each parent package down to the
    /// default package, and falls back to the default name.
    pub fn lookup(&self, class_name: &str) -> &str {
        let class_name = class_name.trim();
        if class_name.is_empty() || self.by_package.is_empty() {
            return &self.default_name;
        }

        let mut package = class_name.rfind('.').map_or("", |dot| &class_name[..dot]);
        loop {
            if let Some(property) = self.by_package.get(package) {
                debug!("{class_name} -> {property} (package {package:?})");
                return property;
            }
            if package.is_empty() {
                return &self.default_name;
            }
            package = package.rfind('.').map_or("", |dot| &package[..dot]);
        }
    }
}

/// Assigns every class carrying one of `annotations` to its property.
pub fn group_by_property(
    index: &AnnotationIndex,
    annotations: &[String],
    names: &PropertyNames,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for annotation in annotations {
        let Some(classes) = index.get(annotation) else {
            continue;
        };
        for class in classes {
            groups
                .entry(names.lookup(class).to_string())
                .or_default()
                .insert(class.clone());
        }
    }
    groups
}

/// Strips one pair of matching surrounding quotes.
#[derive(Debug, Clone)]
pub struct QuoteStripper {
    pattern: TextMatcher,
}

impl Default for QuoteStripper {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteStripper {
    pub fn new() -> Self {
        Self {
            pattern: TextMatcher::new(QUOTED),
        }
    }

    pub fn strip<'t>(&self, text: &'t str) -> &'t str {
        match &self.pattern {
            TextMatcher::Pattern(regex) => regex
                .captures(text)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                .map_or(text, |inner| inner.as_str()),
            TextMatcher::Exact(_) => text,
        }
    }
}

pub fn strip_quotes(text: &str) -> &str {
    QuoteStripper::new().strip(text)
}

/// Text wrapped around each class name of a property value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoration {
    pub first_item_prefix: String,
    pub prefix: String,
    pub suffix: String,
    pub last_item_suffix: String,
}

impl Decoration {
    pub fn strip_quotes(self) -> Self {
        let quotes = QuoteStripper::new();
        Self {
            first_item_prefix: quotes.strip(&self.first_item_prefix).to_string(),
            prefix: quotes.strip(&self.prefix).to_string(),
            suffix: quotes.strip(&self.suffix).to_string(),
            last_item_suffix: quotes.strip(&self.last_item_suffix).to_string(),
        }
    }

    pub fn decorate<'a>(&self, classes: impl IntoIterator<Item = &'a String>) -> String {
        let mut value = String::new();
        let mut classes = classes.into_iter().peekable();
        let mut first = true;
        while let Some(class) = classes.next() {
            value.push_str(if first { &self.first_item_prefix } else { &self.prefix });
            value.push_str(class);
            value.push_str(if classes.peek().is_some() {
                &self.suffix
            } else {
                &self.last_item_suffix
            });
            first = false;
        }
        value
    }
}

pub fn render_values(
    groups: &BTreeMap<String, BTreeSet<String>>,
    decoration: &Decoration,
) -> BTreeMap<String, String> {
    groups
        .iter()
        .map(|(property, classes)| (property.clone(), decoration.decorate(classes)))
        .collect()
}

/// Writes `properties` in Java properties format, sorted by key.
pub fn write_properties(
    out: &mut impl Write,
    comment: &str,
    properties: &BTreeMap<String, String>,
) -> io::Result<()> {
    for line in comment.lines() {
        writeln!(out, "#{line}")?;
    }
    for (key, value) in properties {
        writeln!(out, "{}={}", escape(key, true), escape(value, false))?;
    }
    Ok(())
}

pub fn write_json(out: &mut impl Write, properties: &BTreeMap<String, String>) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, properties)?;
    writeln!(out)
}

fn escape(text: &str, is_key: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            ' ' if i == 0 || is_key => escaped.push_str("\\ "),
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\x0c' => escaped.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
