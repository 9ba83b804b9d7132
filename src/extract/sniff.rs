//! Content-type and executable sniffing.
//!
//! Content types are derived from the leading bytes of a resource, never
//! from its extension. Executable sniffing understands ELF, Mach-O and PE
//! headers; any parse failure simply means "no executable metadata".

use serde_json::Value;
use std::io::{Read, Seek, SeekFrom};

use super::Metadata;

/// Number of leading bytes considered by [`content_type`].
pub const SNIFF_LEN: usize = 512;

/// Fallback content type for unrecognized binary data.
pub const OCTET_STREAM: &str = "application/octet-stream";

const TEXT_UTF8: &str = "text/plain; charset=utf-8";

/// Upper bound for an ELF interpreter path.
const MAX_INTERP_LEN: u64 = 4096;

/// Magic-number signatures, checked in order.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"\xFD7zXZ\x00", "application/x-xz"),
    (b"Rar!\x1A\x07", "application/x-rar-compressed"),
    (b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    (b"\x00asm", "application/wasm"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_UTF8),
];

/// Sniff a content type from a content prefix.
pub fn content_type(prefix: &[u8]) -> String {
    let data = &prefix[..prefix.len().min(SNIFF_LEN)];

    if data.is_empty() {
        return TEXT_UTF8.to_string();
    }

    for (magic, mime) in SIGNATURES {
        if data.starts_with(magic) {
            return mime.to_string();
        }
    }

    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp".to_string();
    }

    let markup_start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let markup = data[markup_start..]
        .iter()
        .take(16)
        .map(|b| b.to_ascii_lowercase())
        .collect::<Vec<u8>>();
    if markup.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8".to_string();
    }
    if markup.starts_with(b"<!doctype html") || markup.starts_with(b"<html") {
        return "text/html; charset=utf-8".to_string();
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        return OCTET_STREAM.to_string();
    }
    TEXT_UTF8.to_string()
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Metadata sniffed from an executable header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableInfo {
    /// Container format (`elf`, `macho`, `pe`).
    pub format: &'static str,
    /// Target operating system family.
    pub platform: &'static str,
    /// Target architecture, GOARCH-style (`amd64`, `arm64`, ...).
    pub architecture: String,
    /// Linked program interpreter, for dynamically linked ELF executables.
    pub interpreter: Option<String>,
    /// Refined content type.
    pub content_type: &'static str,
}

impl ExecutableInfo {
    /// Metadata entries to merge into an artifact.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("format".to_string(), Value::from(self.format));
        metadata.insert("platform".to_string(), Value::from(self.platform));
        metadata.insert(
            "architecture".to_string(),
            Value::from(self.architecture.clone()),
        );
        if let Some(ref interp) = self.interpreter {
            metadata.insert("interpreter".to_string(), Value::from(interp.clone()));
        }
        metadata
    }
}

/// Sniff executable metadata. `None` means "not an executable we
/// understand", which is a normal outcome.
pub fn executable_info<R: Read + Seek>(reader: &mut R) -> Option<ExecutableInfo> {
    let magic = read_at(reader, 0, 4)?;
    match magic.as_slice() {
        [0x7F, b'E', b'L', b'F'] => elf_info(reader),
        [0xFE, 0xED, 0xFA, 0xCE]
        | [0xCE, 0xFA, 0xED, 0xFE]
        | [0xFE, 0xED, 0xFA, 0xCF]
        | [0xCF, 0xFA, 0xED, 0xFE]
        | [0xCA, 0xFE, 0xBA, 0xBE] => macho_info(reader, &magic),
        [b'M', b'Z', _, _] => pe_info(reader),
        _ => None,
    }
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> Option<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset)).ok()?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// Fixed-width integer decoding for either byte order.
#[derive(Clone, Copy)]
struct Endian {
    little: bool,
}

impl Endian {
    fn u16(&self, b: &[u8], at: usize) -> Option<u16> {
        let bytes: [u8; 2] = b.get(at..at + 2)?.try_into().ok()?;
        Some(if self.little {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    }

    fn u32(&self, b: &[u8], at: usize) -> Option<u32> {
        let bytes: [u8; 4] = b.get(at..at + 4)?.try_into().ok()?;
        Some(if self.little {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    fn u64(&self, b: &[u8], at: usize) -> Option<u64> {
        let bytes: [u8; 8] = b.get(at..at + 8)?.try_into().ok()?;
        Some(if self.little {
            u64::from_le_bytes(bytes)
        } else {
            u64::from_be_bytes(bytes)
        })
    }
}

const ET_REL: u16 = 1;
const ET_DYN: u16 = 3;
const PT_INTERP: u32 = 3;

fn elf_info<R: Read + Seek>(reader: &mut R) -> Option<ExecutableInfo> {
    let header = read_at(reader, 0, 64).or_else(|| read_at(reader, 0, 52))?;
    let is_64 = match header[4] {
        1 => false,
        2 => true,
        _ => return None,
    };
    let endian = match header[5] {
        1 => Endian { little: true },
        2 => Endian { little: false },
        _ => return None,
    };

    let e_type = endian.u16(&header, 16)?;
    let machine = endian.u16(&header, 18)?;
    let (ph_off, ph_entsize, ph_num) = if is_64 {
        (
            endian.u64(&header, 32)?,
            endian.u16(&header, 54)?,
            endian.u16(&header, 56)?,
        )
    } else {
        (
            u64::from(endian.u32(&header, 28)?),
            endian.u16(&header, 42)?,
            endian.u16(&header, 44)?,
        )
    };

    let mut interpreter = None;
    for i in 0..u64::from(ph_num) {
        let entry_off = ph_off.checked_add(i.checked_mul(u64::from(ph_entsize))?)?;
        let entry = read_at(reader, entry_off, usize::from(ph_entsize))?;
        if endian.u32(&entry, 0)? != PT_INTERP {
            continue;
        }
        let (offset, size) = if is_64 {
            (endian.u64(&entry, 8)?, endian.u64(&entry, 32)?)
        } else {
            (
                u64::from(endian.u32(&entry, 4)?),
                u64::from(endian.u32(&entry, 16)?),
            )
        };
        if size == 0 || size > MAX_INTERP_LEN {
            break;
        }
        let raw = read_at(reader, offset, usize::try_from(size).ok()?)?;
        let path = String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .to_string();
        if !path.is_empty() {
            interpreter = Some(path);
        }
        break;
    }

    let content_type = match e_type {
        ET_REL => "application/x-object",
        ET_DYN if interpreter.is_none() => "application/x-sharedlib",
        _ => "application/x-executable",
    };

    let platform = match header[7] {
        9 => "freebsd",
        12 => "openbsd",
        2 => "netbsd",
        _ => "linux",
    };

    Some(ExecutableInfo {
        format: "elf",
        platform,
        architecture: elf_arch(machine, is_64),
        interpreter,
        content_type,
    })
}

fn elf_arch(machine: u16, is_64: bool) -> String {
    match machine {
        3 => "386".to_string(),
        8 if is_64 => "mips64".to_string(),
        8 => "mips".to_string(),
        20 => "ppc".to_string(),
        21 => "ppc64".to_string(),
        22 => "s390x".to_string(),
        40 => "arm".to_string(),
        62 => "amd64".to_string(),
        183 => "arm64".to_string(),
        243 if is_64 => "riscv64".to_string(),
        243 => "riscv".to_string(),
        other => format!("unknown({})", other),
    }
}

const FAT_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Java class files share the fat Mach-O magic; a universal binary never
/// carries more than a handful of slices.
const MAX_FAT_ARCHS: u32 = 20;

fn macho_info<R: Read + Seek>(reader: &mut R, magic: &[u8]) -> Option<ExecutableInfo> {
    let header = read_at(reader, 0, 8)?;

    let architecture = if magic == FAT_MAGIC {
        let count = Endian { little: false }.u32(&header, 4)?;
        if count == 0 || count > MAX_FAT_ARCHS {
            return None;
        }
        "universal".to_string()
    } else {
        let endian = Endian {
            little: magic[0] == 0xCE || magic[0] == 0xCF,
        };
        macho_arch(endian.u32(&header, 4)?)
    };

    Some(ExecutableInfo {
        format: "macho",
        platform: "darwin",
        architecture,
        interpreter: None,
        content_type: "application/x-mach-binary",
    })
}

fn macho_arch(cpu_type: u32) -> String {
    match cpu_type {
        7 => "386".to_string(),
        0x0100_0007 => "amd64".to_string(),
        12 => "arm".to_string(),
        0x0100_000C => "arm64".to_string(),
        18 => "ppc".to_string(),
        0x0100_0012 => "ppc64".to_string(),
        other => format!("unknown({})", other),
    }
}

fn pe_info<R: Read + Seek>(reader: &mut R) -> Option<ExecutableInfo> {
    let le = Endian { little: true };
    let lfanew_raw = read_at(reader, 0x3C, 4)?;
    let lfanew = u64::from(le.u32(&lfanew_raw, 0)?);
    let pe_header = read_at(reader, lfanew, 6)?;
    if &pe_header[..4] != b"PE\0\0" {
        return None;
    }

    let architecture = match le.u16(&pe_header, 4)? {
        0x014C => "386".to_string(),
        0x8664 => "amd64".to_string(),
        0x01C0 | 0x01C4 => "arm".to_string(),
        0xAA64 => "arm64".to_string(),
        other => format!("unknown({:#06x})", other),
    };

    Some(ExecutableInfo {
        format: "pe",
        platform: "windows",
        architecture,
        interpreter: None,
        content_type: "application/vnd.microsoft.portable-executable",
    })
}
