//! Directory and archive traversal.
//!
//! Both strategies hand every accepted entry to a visitor as a [`ClassStream`].
//! Handles are owned by the source and closed when it goes out of scope, on
//! success and on error alike. Archives are read front to back through their
//! local headers only; the central directory is never consulted.

use flate2::bufread::DeflateDecoder;
use ignore::WalkBuilder;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::read::read_zipfile_from_stream;

use crate::classfile::{ClassFacts, TargetSelection, read_class_from};
use crate::error::{ClassFormatError, ScanError};
use crate::filter::{EntryFilter, qualified_name};

const LOCAL_FILE_HEADER: &[u8] = b"PK\x03\x04";
const CENTRAL_DIRECTORY_HEADER: &[u8] = b"PK\x01\x02";
const END_OF_CENTRAL_DIRECTORY: &[u8] = b"PK\x05\x06";
const ZIP64_END_OF_CENTRAL_DIRECTORY: &[u8] = b"PK\x06\x06";
const DATA_DESCRIPTOR: &[u8; 4] = b"PK\x07\x08";
const LOCAL_HEADER_LEN: usize = 30;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const METHOD_DEFLATED: u16 = 8;
const ZIP64_EXTRA_FIELD: u16 = 0x0001;

pub type Visitor<'v> = dyn FnMut(ClassStream<'_>) -> Result<(), ScanError> + 'v;

/// One discovered class: its name as derived from the entry path, and the
/// raw bytes behind it. Read at most once.
pub struct ClassStream<'a> {
    name: String,
    source: Box<dyn Read + 'a>,
}

impl<'a> ClassStream<'a> {
    pub fn new(name: String, source: impl Read + 'a) -> Self {
        Self {
            name,
            source: Box::new(source),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_facts(self, targets: TargetSelection) -> Result<ClassFacts, ClassFormatError> {
        read_class_from(self.source, targets)
    }

    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.source.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

pub trait ClassSource {
    /// Visits every entry accepted by `filter`. Stops at the first error,
    /// whether it comes from the traversal or from `visit`.
    fn for_each_class(
        self: Box<Self>,
        filter: &EntryFilter,
        visit: &mut Visitor<'_>,
    ) -> Result<(), ScanError>;
}

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn open(root: &Path) -> Result<Self, ScanError> {
        fs::read_dir(root).map_err(|e| ScanError::access(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl ClassSource for DirectorySource {
    fn for_each_class(
        self: Box<Self>,
        filter: &EntryFilter,
        visit: &mut Visitor<'_>,
    ) -> Result<(), ScanError> {
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(false)
            .follow_links(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) if is_loop(&err) => {
                    warn!("Skipping symlink loop under {}: {err}", self.root.display());
                    continue;
                }
                Err(err) if is_dangling(&err) => {
                    warn!("Skipping dangling link under {}: {err}", self.root.display());
                    continue;
                }
                Err(err) => return Err(ScanError::access(&self.root, io::Error::other(err))),
            };

            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if !filter.accepts(&relative, is_dir) {
                continue;
            }

            let file = File::open(entry.path()).map_err(|e| ScanError::access(entry.path(), e))?;
            visit(ClassStream::new(qualified_name(&relative), BufReader::new(file)))?;
        }
        Ok(())
    }
}

fn is_loop(err: &ignore::Error) -> bool {
    match err {
        ignore::Error::Loop { .. } => true,
        ignore::Error::WithPath { err, .. }
        | ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => is_loop(err),
        _ => false,
    }
}

fn is_dangling(err: &ignore::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

pub struct ArchiveSource {
    path: PathBuf,
    file: File,
}

impl ArchiveSource {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let file = File::open(path).map_err(|e| ScanError::access(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl ClassSource for ArchiveSource {
    fn for_each_class(
        self: Box<Self>,
        filter: &EntryFilter,
        visit: &mut Visitor<'_>,
    ) -> Result<(), ScanError> {
        let ArchiveSource { path, file } = *self;
        let mut reader = BufReader::new(file);

        while let Some(header) =
            LocalHeader::read(&mut reader).map_err(|e| ScanError::access(&path, e))?
        {
            if header.flags & FLAG_DATA_DESCRIPTOR != 0 {
                visit_described_entry(&path, &mut reader, &header, filter, visit)?;
                continue;
            }

            // Sizes are known up front: hand the header back to the zip reader.
            let mut framed = Cursor::new(header.raw).chain(&mut reader);
            let entry = match read_zipfile_from_stream(&mut framed) {
                Ok(Some(entry)) => entry,
                Ok(None) => return Ok(()),
                Err(err) => return Err(ScanError::access(&path, err)),
            };
            if !filter.accepts(entry.name(), entry.is_dir()) {
                continue;
            }
            let class_name = qualified_name(entry.name());
            visit(ClassStream::new(class_name, entry))?;
        }
        Ok(())
    }
}

/// Local file header of one archive entry, name and extra field included.
struct LocalHeader {
    raw: Vec<u8>,
    flags: u16,
    method: u16,
    name: String,
    zip64: bool,
}

impl LocalHeader {
    /// Returns `None` once the local entries are exhausted: at the central
    /// directory, at the end record, or at the end of the stream.
    fn read(reader: &mut impl BufRead) -> io::Result<Option<Self>> {
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let mut raw = vec![0u8; LOCAL_HEADER_LEN];
        reader.read_exact(&mut raw[..4])?;
        match &raw[..4] {
            LOCAL_FILE_HEADER => {}
            CENTRAL_DIRECTORY_HEADER
            | END_OF_CENTRAL_DIRECTORY
            | ZIP64_END_OF_CENTRAL_DIRECTORY => return Ok(None),
            _ => return Err(invalid_data("not a zip local file header".to_string())),
        }
        reader.read_exact(&mut raw[4..])?;

        let flags = le_u16(&raw[6..]);
        let method = le_u16(&raw[8..]);
        let name_len = le_u16(&raw[26..]) as usize;
        let extra_len = le_u16(&raw[28..]) as usize;
        raw.resize(LOCAL_HEADER_LEN + name_len + extra_len, 0);
        reader.read_exact(&mut raw[LOCAL_HEADER_LEN..])?;

        let (name, extra) = raw[LOCAL_HEADER_LEN..].split_at(name_len);
        let name = String::from_utf8_lossy(name).into_owned();
        let zip64 = has_zip64_field(extra);
        Ok(Some(Self {
            raw,
            flags,
            method,
            name,
            zip64,
        }))
    }
}

fn has_zip64_field(mut extra: &[u8]) -> bool {
    while extra.len() >= 4 {
        let id = le_u16(extra);
        let size = le_u16(&extra[2..]) as usize;
        if id == ZIP64_EXTRA_FIELD {
            return true;
        }
        extra = extra.get(4 + size..).unwrap_or_default();
    }
    false
}

/// Reads an entry whose CRC and sizes follow its data. The compressed data
/// is framed by the end of the deflate stream itself, then the descriptor
/// is checked against what was inflated.
fn visit_described_entry<R: BufRead>(
    path: &Path,
    reader: &mut R,
    header: &LocalHeader,
    filter: &EntryFilter,
    visit: &mut Visitor<'_>,
) -> Result<(), ScanError> {
    if header.method != METHOD_DEFLATED {
        let reason = format!(
            "entry {} has a trailing data descriptor but compression method {}",
            header.name, header.method
        );
        return Err(ScanError::access(path, invalid_data(reason)));
    }

    let mut entry = DescribedEntry::new(&mut *reader);
    if filter.accepts(&header.name, header.name.ends_with('/')) {
        visit(ClassStream::new(qualified_name(&header.name), &mut entry))?;
    }
    entry
        .finish(header.zip64)
        .map_err(|e| ScanError::access(path, e))?;
    debug!("Read {} up to its data descriptor", header.name);
    Ok(())
}

struct DescribedEntry<R: BufRead> {
    inflater: DeflateDecoder<R>,
    crc: crc32fast::Hasher,
}

impl<R: BufRead> DescribedEntry<R> {
    fn new(reader: R) -> Self {
        Self {
            inflater: DeflateDecoder::new(reader),
            crc: crc32fast::Hasher::new(),
        }
    }

    /// Drains what the visitor left unread and verifies the descriptor.
    fn finish(mut self, zip64: bool) -> io::Result<()> {
        io::copy(&mut self, &mut io::sink())?;
        let Self { inflater, crc } = self;
        let compressed_size = inflater.total_in();
        let size = inflater.total_out();
        let crc = crc.finalize();

        let mut reader = inflater.into_inner();
        let descriptor = DataDescriptor::read(&mut reader, zip64)?;
        if descriptor.crc != crc {
            return Err(invalid_data(format!(
                "CRC mismatch: descriptor {:#010x}, data {crc:#010x}",
                descriptor.crc
            )));
        }
        if descriptor.compressed_size != compressed_size || descriptor.size != size {
            return Err(invalid_data(format!(
                "size mismatch: descriptor {}/{}, data {compressed_size}/{size}",
                descriptor.compressed_size, descriptor.size
            )));
        }
        Ok(())
    }
}

impl<R: BufRead> Read for DescribedEntry<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inflater.read(buf)?;
        self.crc.update(&buf[..n]);
        Ok(n)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct DataDescriptor {
    crc: u32,
    compressed_size: u64,
    size: u64,
}

impl DataDescriptor {
    /// The signature is optional; sizes are eight bytes wide for zip64 entries.
    fn read(reader: &mut impl Read, zip64: bool) -> io::Result<Self> {
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        if word == *DATA_DESCRIPTOR {
            reader.read_exact(&mut word)?;
        }
        let crc = u32::from_le_bytes(word);

        let (compressed_size, size) = if zip64 {
            let mut sizes = [0u8; 16];
            reader.read_exact(&mut sizes)?;
            (le_u64(&sizes[..8]), le_u64(&sizes[8..]))
        } else {
            let mut sizes = [0u8; 8];
            reader.read_exact(&mut sizes)?;
            (le_u32(&sizes[..4]) as u64, le_u32(&sizes[4..]) as u64)
        };
        Ok(Self {
            crc,
            compressed_size,
            size,
        })
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_u64(bytes: &[u8]) -> u64 {
    (le_u32(bytes) as u64) | ((le_u32(&bytes[4..]) as u64) << 32)
}
