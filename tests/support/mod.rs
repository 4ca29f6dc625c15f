#![allow(dead_code)]

pub mod classgen;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

use classgen::ClassFile;

/// Entry name of a class inside a directory or jar: `a.b.Foo` -> `a/b/Foo.class`.
pub fn entry_name(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

pub fn write_class(root: &Path, class_name: &str, class: &ClassFile) -> PathBuf {
    let path = root.join(entry_name(class_name));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, class.to_bytes()).unwrap();
    path
}

pub fn write_jar(path: &Path, entries: &[(String, Vec<u8>)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(name.as_str(), options).unwrap();
        } else {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content).unwrap();
        }
    }
    zip.finish().unwrap();
}

pub fn class_entry(class_name: &str, class: &ClassFile) -> (String, Vec<u8>) {
    (entry_name(class_name), class.to_bytes())
}

/// Writes an archive by hand the way streaming archivers do: the first
/// entry is stored with its sizes up front, every later entry keeps its CRC
/// and sizes in a data descriptor after the data. Descriptor signatures
/// alternate between present and absent.
#[derive(Debug, Clone, Copy)]
pub struct StreamedJar {
    pub central_directory: bool,
    pub store_described_entries: bool,
}

impl Default for StreamedJar {
    fn default() -> Self {
        Self {
            central_directory: true,
            store_described_entries: false,
        }
    }
}

impl StreamedJar {
    pub fn write(&self, path: &Path, entries: &[(String, Vec<u8>)]) {
        fs::write(path, self.to_bytes(entries)).unwrap();
    }

    pub fn to_bytes(&self, entries: &[(String, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for (i, (name, content)) in entries.iter().enumerate() {
            let described = i > 0;
            let deflated = described && !self.store_described_entries;
            let flags: u16 = if described { 0x0008 } else { 0 };
            let method: u16 = if deflated { 8 } else { 0 };
            let data = if deflated { deflate(content) } else { content.clone() };
            let crc = crc32fast::hash(content);
            let size = content.len() as u32;
            let compressed_size = data.len() as u32;
            let offset = out.len() as u32;

            put_u32(&mut out, 0x0403_4b50);
            put_u16(&mut out, 20);
            put_u16(&mut out, flags);
            put_u16(&mut out, method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0x0021);
            if described {
                put_u32(&mut out, 0);
                put_u32(&mut out, 0);
                put_u32(&mut out, 0);
            } else {
                put_u32(&mut out, crc);
                put_u32(&mut out, compressed_size);
                put_u32(&mut out, size);
            }
            put_u16(&mut out, name.len() as u16);
            put_u16(&mut out, 0);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&data);
            if described {
                if i % 2 == 1 {
                    put_u32(&mut out, 0x0807_4b50);
                }
                put_u32(&mut out, crc);
                put_u32(&mut out, compressed_size);
                put_u32(&mut out, size);
            }

            put_u32(&mut central, 0x0201_4b50);
            put_u16(&mut central, 20);
            put_u16(&mut central, 20);
            put_u16(&mut central, flags);
            put_u16(&mut central, method);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0x0021);
            put_u32(&mut central, crc);
            put_u32(&mut central, compressed_size);
            put_u32(&mut central, size);
            put_u16(&mut central, name.len() as u16);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u32(&mut central, 0);
            put_u32(&mut central, offset);
            central.extend_from_slice(name.as_bytes());
        }

        if !self.central_directory {
            return out;
        }
        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);
        put_u32(&mut out, 0x0605_4b50);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, entries.len() as u16);
        put_u16(&mut out, entries.len() as u16);
        put_u32(&mut out, central.len() as u32);
        put_u32(&mut out, central_offset);
        put_u16(&mut out, 0);
        out
    }
}

pub fn write_jar_with_data_descriptors(path: &Path, entries: &[(String, Vec<u8>)]) {
    StreamedJar::default().write(path, entries);
}

fn deflate(content: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
