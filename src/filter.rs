use regex::Regex;
use std::path::Path;
use tracing::warn;

pub const CLASS_SUFFIX: &str = ".class";
const MODULE_DESCRIPTOR: &str = "module-info.class";

/// Decides which entries of a location are opened as class files. Both
/// traversal strategies consult the same filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryFilter;

impl EntryFilter {
    /// Module descriptors end in `.class` but declare no class.
    pub fn accepts(&self, name: &str, is_dir: bool) -> bool {
        let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        !is_dir
            && !name.ends_with('/')
            && name.ends_with(CLASS_SUFFIX)
            && file_name != MODULE_DESCRIPTOR
    }
}

/// Converts an entry or relative file name to a qualified class name:
/// `org/example/Foo.class` -> `org.example.Foo`.
pub fn qualified_name(entry_name: &str) -> String {
    let stem = entry_name.strip_suffix(CLASS_SUFFIX).unwrap_or(entry_name);
    stem.trim_start_matches(['/', '\\']).replace(['/', '\\'], ".")
}

/// A text predicate compiled from a pattern. Patterns that fail to compile
/// degrade to exact string comparison instead of failing.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    Pattern(Regex),
    Exact(String),
}

impl TextMatcher {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => Self::Pattern(regex),
            Err(err) => {
                warn!("Pattern {pattern:?} does not compile ({err}); using exact comparison");
                Self::Exact(pattern.to_string())
            }
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Pattern(regex) => regex.is_match(text),
            Self::Exact(expected) => expected == text,
        }
    }
}

/// Accept/reject predicate over classpath locations, applied before scanning.
#[derive(Debug, Clone, Default)]
pub struct LocationFilter {
    includes: Vec<TextMatcher>,
    excludes: Vec<TextMatcher>,
}

impl LocationFilter {
    pub fn new<I, E, S>(includes: I, excludes: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            includes: includes.into_iter().map(|p| TextMatcher::new(p.as_ref())).collect(),
            excludes: excludes.into_iter().map(|p| TextMatcher::new(p.as_ref())).collect(),
        }
    }

    pub fn accept(&self, location: &Path) -> bool {
        let text = location.to_string_lossy();
        let included =
            self.includes.is_empty() || self.includes.iter().any(|m| m.is_match(&text));
        included && !self.excludes.iter().any(|m| m.is_match(&text))
    }
}
