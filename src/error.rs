use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a classpath scan. Any of them aborts the scan in progress.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot read location {location}: {source}")]
    LocationAccess {
        location: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed class metadata for {class} in {location}: {source}")]
    MalformedClassMetadata {
        location: PathBuf,
        class: String,
        #[source]
        source: ClassFormatError,
    },
    #[error("invalid scan configuration: {message}")]
    Configuration { message: String },
}

impl ScanError {
    pub(crate) fn access(location: impl Into<PathBuf>, source: impl Into<io::Error>) -> Self {
        Self::LocationAccess {
            location: location.into(),
            source: source.into(),
        }
    }

    pub(crate) fn malformed(
        location: impl Into<PathBuf>,
        class: impl Into<String>,
        source: ClassFormatError,
    ) -> Self {
        Self::MalformedClassMetadata {
            location: location.into(),
            class: class.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("malformed modified UTF-8 in constant pool entry {index}")]
    InvalidUtf8 { index: u16 },
    #[error("unknown annotation element tag '{}'", *.0 as char)]
    InvalidElementTag(u8),
    #[error("annotation element values nested too deeply")]
    NestingTooDeep,
    #[error("malformed type descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("failed to read class data: {0}")]
    Io(#[from] io::Error),
}
