//! Class metadata reader.
//!
//! Walks the class-file layout (constant pool, super types, fields, methods,
//! attributes) far enough to recover the class name, its declared super types
//! and the types of the annotations attached to it. Bytecode is skipped, never
//! interpreted.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use crate::error::ClassFormatError;

const MAGIC: u32 = 0xCAFE_BABE;
const MIN_MAJOR_VERSION: u16 = 45;
const MAX_ELEMENT_DEPTH: usize = 64;

const RUNTIME_VISIBLE_ANNOTATIONS: &[u8] = b"RuntimeVisibleAnnotations";
const RUNTIME_INVISIBLE_ANNOTATIONS: &[u8] = b"RuntimeInvisibleAnnotations";
const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &[u8] = b"RuntimeVisibleParameterAnnotations";
const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &[u8] = b"RuntimeInvisibleParameterAnnotations";

/// Granularity an annotation was found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    Type,
    Method,
    Field,
    Parameter,
}

/// Which target kinds the reader decodes. Attributes of a disabled kind are
/// skipped without being looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSelection {
    pub types: bool,
    pub methods: bool,
    pub fields: bool,
    pub parameters: bool,
}

impl TargetSelection {
    pub const fn all() -> Self {
        Self {
            types: true,
            methods: true,
            fields: true,
            parameters: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            types: false,
            methods: false,
            fields: false,
            parameters: false,
        }
    }

    pub fn contains(&self, kind: TargetKind) -> bool {
        match kind {
            TargetKind::Type => self.types,
            TargetKind::Method => self.methods,
            TargetKind::Field => self.fields,
            TargetKind::Parameter => self.parameters,
        }
    }
}

impl Default for TargetSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// Facts extracted from one class file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFacts {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: BTreeMap<TargetKind, BTreeSet<String>>,
}

impl ClassFacts {
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    pub fn annotations_at(&self, kind: TargetKind) -> Option<&BTreeSet<String>> {
        self.annotations.get(&kind)
    }

    /// Every annotation type found, regardless of target kind.
    pub fn annotation_names(&self) -> BTreeSet<&str> {
        self.annotations
            .values()
            .flat_map(|names| names.iter().map(String::as_str))
            .collect()
    }
}

/// Package part of a qualified class name; empty for the default package.
pub fn package_of(class_name: &str) -> &str {
    class_name
        .rsplit_once('.')
        .map(|(pkg, _)| pkg)
        .unwrap_or("")
}

pub fn read_class_from(
    mut source: impl Read,
    targets: TargetSelection,
) -> Result<ClassFacts, ClassFormatError> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    read_class(&bytes, targets)
}

pub fn read_class(bytes: &[u8], targets: TargetSelection) -> Result<ClassFacts, ClassFormatError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let minor = reader.read_u2()?;
    let major = reader.read_u2()?;
    if major < MIN_MAJOR_VERSION {
        return Err(ClassFormatError::UnsupportedVersion { major, minor });
    }
    let pool = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let name = pool.class_name(this_class)?;
    let super_name = match super_class {
        0 => None,
        index => Some(pool.class_name(index)?),
    };

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(pool.class_name(reader.read_u2()?)?);
    }

    let mut annotations = BTreeMap::new();

    let fields_count = reader.read_u2()?;
    for _ in 0..fields_count {
        read_member(&mut reader, &pool, Owner::Field, targets, &mut annotations)?;
    }

    let methods_count = reader.read_u2()?;
    for _ in 0..methods_count {
        read_member(&mut reader, &pool, Owner::Method, targets, &mut annotations)?;
    }

    let attributes_count = reader.read_u2()?;
    read_attributes(
        &mut reader,
        &pool,
        attributes_count,
        Owner::Class,
        targets,
        &mut annotations,
    )?;

    Ok(ClassFacts {
        name,
        super_name,
        interfaces,
        annotations,
    })
}

#[derive(Debug, Clone, Copy)]
enum Owner {
    Class,
    Field,
    Method,
}

type Found = BTreeMap<TargetKind, BTreeSet<String>>;

fn read_member(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool<'_>,
    owner: Owner,
    targets: TargetSelection,
    found: &mut Found,
) -> Result<(), ClassFormatError> {
    reader.read_u2()?; // access_flags
    reader.read_u2()?; // name_index
    reader.read_u2()?; // descriptor_index
    let attributes_count = reader.read_u2()?;
    read_attributes(reader, pool, attributes_count, owner, targets, found)
}

fn read_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool<'_>,
    count: u16,
    owner: Owner,
    targets: TargetSelection,
    found: &mut Found,
) -> Result<(), ClassFormatError> {
    let annotations_kind = match owner {
        Owner::Class => TargetKind::Type,
        Owner::Field => TargetKind::Field,
        Owner::Method => TargetKind::Method,
    };
    let wants_annotations = targets.contains(annotations_kind);
    let wants_parameters = matches!(owner, Owner::Method) && targets.parameters;

    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let body = reader.read_slice(length)?;

        if !wants_annotations && !wants_parameters {
            continue;
        }

        let name = pool.utf8_bytes(name_index)?;
        if wants_annotations
            && (name == RUNTIME_VISIBLE_ANNOTATIONS || name == RUNTIME_INVISIBLE_ANNOTATIONS)
        {
            let mut sub = ClassReader::new(body);
            let names = read_annotations(&mut sub, pool)?;
            record(found, annotations_kind, names);
        } else if wants_parameters
            && (name == RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
                || name == RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS)
        {
            let mut sub = ClassReader::new(body);
            let parameters = sub.read_u1()?;
            let mut names = Vec::new();
            for _ in 0..parameters {
                names.extend(read_annotations(&mut sub, pool)?);
            }
            record(found, TargetKind::Parameter, names);
        }
    }
    Ok(())
}

fn record(found: &mut Found, kind: TargetKind, names: Vec<String>) {
    if names.is_empty() {
        return;
    }
    found.entry(kind).or_default().extend(names);
}

fn read_annotations(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool<'_>,
) -> Result<Vec<String>, ClassFormatError> {
    let count = reader.read_u2()?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_index = reader.read_u2()?;
        let descriptor = pool.utf8(type_index)?;
        names.push(descriptor_to_class_name(&descriptor)?);
        skip_element_pairs(reader, 0)?;
    }
    Ok(names)
}

fn skip_element_pairs(reader: &mut ClassReader<'_>, depth: usize) -> Result<(), ClassFormatError> {
    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        reader.skip(2)?; // element_name_index
        skip_element_value(reader, depth)?;
    }
    Ok(())
}

fn skip_element_value(reader: &mut ClassReader<'_>, depth: usize) -> Result<(), ClassFormatError> {
    if depth > MAX_ELEMENT_DEPTH {
        return Err(ClassFormatError::NestingTooDeep);
    }
    let tag = reader.read_u1()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2),
        b'e' => reader.skip(4),
        b'@' => {
            reader.skip(2)?; // type_index
            skip_element_pairs(reader, depth + 1)
        }
        b'[' => {
            let values = reader.read_u2()?;
            for _ in 0..values {
                skip_element_value(reader, depth + 1)?;
            }
            Ok(())
        }
        other => Err(ClassFormatError::InvalidElementTag(other)),
    }
}

/// `Ljavax/persistence/Entity;` -> `javax.persistence.Entity`
fn descriptor_to_class_name(descriptor: &str) -> Result<String, ClassFormatError> {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|name| !name.is_empty())
        .map(|name| name.replace('/', "."))
        .ok_or_else(|| ClassFormatError::InvalidDescriptor(descriptor.to_string()))
}

#[derive(Debug, Clone, Copy)]
enum Constant<'a> {
    Utf8(&'a [u8]),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool<'a> {
    entries: Vec<Constant<'a>>,
}

impl<'a> ConstantPool<'a> {
    fn parse(reader: &mut ClassReader<'a>) -> Result<Self, ClassFormatError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(reader.read_slice(length)?)
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // Eight-byte constants occupy two slots.
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    Constant::Unusable
                }
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassFormatError::UnsupportedConstant { tag: other }),
            };
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<Constant<'a>, ClassFormatError> {
        self.entries
            .get(index as usize)
            .copied()
            .ok_or(ClassFormatError::InvalidConstantIndex { index })
    }

    fn utf8_bytes(&self, index: u16) -> Result<&'a [u8], ClassFormatError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(ClassFormatError::InvalidConstantIndex { index }),
        }
    }

    fn utf8(&self, index: u16) -> Result<String, ClassFormatError> {
        decode_modified_utf8(self.utf8_bytes(index)?)
            .ok_or(ClassFormatError::InvalidUtf8 { index })
    }

    fn class_name(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(name_index)?.replace('/', ".")),
            _ => Err(ClassFormatError::InvalidConstantIndex { index }),
        }
    }
}

/// Decodes the JVM's modified UTF-8: NUL is two bytes and supplementary
/// characters are written as surrogate pairs of three bytes each.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_owned());
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        let b0 = bytes[pos] as u16;
        if b0 & 0x80 == 0 {
            units.push(b0);
            pos += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, pos + 1)?;
            units.push(((b0 & 0x1F) << 6) | b1);
            pos += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, pos + 1)?;
            let b2 = continuation(bytes, pos + 2)?;
            units.push(((b0 & 0x0F) << 12) | (b1 << 6) | b2);
            pos += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

fn continuation(bytes: &[u8], pos: usize) -> Option<u16> {
    let b = *bytes.get(pos)?;
    (b & 0xC0 == 0x80).then_some((b & 0x3F) as u16)
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn expect_magic(&mut self) -> Result<(), ClassFormatError> {
        let magic = self.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::InvalidMagic(magic));
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassFormatError> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    fn read_u2(&mut self) -> Result<u16, ClassFormatError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    fn read_u4(&mut self) -> Result<u32, ClassFormatError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ClassFormatError> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        if self.remaining() < len {
            return Err(ClassFormatError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassFormatError> {
        self.read_slice(len).map(|_| ())
    }
}
