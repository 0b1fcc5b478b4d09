//! Entry metadata: what an archive knows about each file it holds.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use codepage_437::*;

use crate::dos_time::DosDateTime;
use crate::result::*;
use crate::spec::{CentralDirectoryHeader, LocalFileHeader};

/// The storage method used for an entry's data
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The data is stored uncompressed (method 0)
    Stored,
    /// The data is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d
    /// (method 8). This is the most common format used by ZIP archives.
    Deflate,
}

impl CompressionMethod {
    pub(crate) fn from_u16(raw: u16) -> ZipResult<Self> {
        match raw {
            0 => Ok(CompressionMethod::Stored),
            8 => Ok(CompressionMethod::Deflate),
            v => Err(ZipError::Unsupported(format!("compression method: {}", v))),
        }
    }

    pub(crate) fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }

    /// The "version needed to extract" an entry with this method:
    /// 1.0 for stored data, 2.0 for DEFLATE
    pub fn version_needed(self) -> u16 {
        match self {
            CompressionMethod::Stored => 10,
            CompressionMethod::Deflate => 20,
        }
    }
}

/// How [`ZipArchive::entry`](crate::read::ZipArchive::entry) compares
/// entry names
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchPath {
    /// Compare the full name, path and all
    Match,
    /// Compare only the part after the last `/`
    Ignore,
}

/// The external-attributes word historically written by info-zip for a
/// plain `rw-rw-r--` file on Unix. No ZIP tool agrees on what these
/// bits mean across platforms, so we default to the value everyone has
/// been copying from each other for decades.
pub const DEFAULT_EXTERNAL_ATTRIBUTES: u32 = 0x81B4_0000;

/// Metadata for a file or directory in the archive
///
/// The reader builds these from central directory headers; the writer
/// accepts them from the caller, stamps its sticky method and level at
/// append time, and back-patches the CRC and sizes once the entry's
/// data has been streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Path within the archive, forward-slash separated.
    /// A trailing slash marks a directory.
    pub name: String,

    /// Per-entry comment, stored in the central directory
    pub comment: Vec<u8>,

    /// Opaque extra-field bytes
    pub extra: Vec<u8>,

    /// Storage method for the entry's data
    pub method: CompressionMethod,

    /// Compression level for the writer: ≤ 0 means default, 1..=9 are
    /// the usual zlib levels, anything above 9 is clamped to 9.
    /// Ignored when the method is [`CompressionMethod::Stored`].
    pub level: i32,

    /// Uncompressed size of the data in bytes
    pub size: u32,

    /// Compressed size of the data in bytes
    pub compressed_size: u32,

    /// CRC-32 of the uncompressed data
    pub crc32: u32,

    /// Last-modified date and time
    pub dos_time: DosDateTime,

    /// General-purpose bit flags. Carried through as-is, except bit 3
    /// (trailing data descriptor), which is rejected on read and
    /// cleared on write.
    pub flags: u16,

    /// External file attributes written to the central directory
    pub external_attributes: u32,

    /// Offset of the local header from the archive's virtual start
    pub(crate) header_offset: u32,

    /// Offset of the first byte of entry data: the local header offset
    /// plus the *local* header's size (its extra field can differ from
    /// the central directory's).
    pub(crate) data_offset: u64,
}

impl ZipEntry {
    /// Creates metadata for a new entry, timestamped with the current
    /// local time (or the DOS epoch if the clock is out of DOS range).
    pub fn new(name: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0);
        ZipEntry {
            name: name.into(),
            comment: Vec::new(),
            extra: Vec::new(),
            method: CompressionMethod::Deflate,
            level: 6,
            size: 0,
            compressed_size: 0,
            crc32: 0,
            dos_time: DosDateTime::from_unix(now).unwrap_or(DosDateTime::MIN),
            flags: 0,
            external_attributes: DEFAULT_EXTERNAL_ATTRIBUTES,
            header_offset: 0,
            data_offset: 0,
        }
    }

    /// Returns true if the entry is a directory (its name ends in `/`)
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Returns true if the entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// The part of the name after the last `/`
    /// (empty for directory entries)
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Offset of the entry's local header from the archive's virtual start
    pub fn header_offset(&self) -> u32 {
        self.header_offset
    }

    /// Builds entry metadata from a decoded central directory header.
    pub(crate) fn from_central(header: CentralDirectoryHeader) -> ZipResult<Self> {
        let method = CompressionMethod::from_u16(header.compression_method)?;
        let name = decode_name(&header.path, header.flags)?;

        let entry = ZipEntry {
            name,
            comment: header.file_comment,
            extra: header.extra_field,
            method,
            level: 0,
            size: header.uncompressed_size,
            compressed_size: header.compressed_size,
            crc32: header.crc32,
            dos_time: DosDateTime::from_raw(header.dos_time),
            flags: header.flags,
            external_attributes: header.external_file_attributes,
            header_offset: header.header_offset,
            data_offset: 0, // filled in once the local header has been read
        };

        if entry.is_dir() && (entry.size != 0 || entry.compressed_size != 0) {
            return Err(ZipError::InvalidArchive("directory entry with a payload"));
        }

        Ok(entry)
    }

    /// The local header for this entry's current field values.
    pub(crate) fn to_local_header(&self) -> LocalFileHeader {
        LocalFileHeader {
            minimum_extract_version: self.method.version_needed(),
            flags: self.wire_flags(),
            compression_method: self.method.to_u16(),
            dos_time: self.dos_time.as_u32(),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.size,
            path: self.name.clone().into_bytes(),
            extra_field: self.extra.clone(),
        }
    }

    /// The central directory header for this entry's current field values.
    pub(crate) fn to_central_header(&self) -> CentralDirectoryHeader {
        CentralDirectoryHeader {
            source_version: VERSION_MADE_BY,
            minimum_extract_version: self.method.version_needed(),
            flags: self.wire_flags(),
            compression_method: self.method.to_u16(),
            dos_time: self.dos_time.as_u32(),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.size,
            disk_number: 0,
            internal_file_attributes: 0,
            external_file_attributes: self.external_attributes,
            header_offset: self.header_offset,
            path: self.name.clone().into_bytes(),
            extra_field: self.extra.clone(),
            file_comment: self.comment.clone(),
        }
    }

    /// Flags as written to disk: bit 3 (trailing data descriptor) must
    /// stay clear, and bit 11 marks the name as UTF-8 when it needs it.
    fn wire_flags(&self) -> u16 {
        let mut flags = self.flags & !0x0008;
        if !self.name.is_ascii() {
            flags |= 0x0800;
        }
        flags
    }
}

/// "Version made by": Unix attribute conventions, format version 2.0
const VERSION_MADE_BY: u16 = (3 << 8) | 20;

/// Decodes a raw name per the general-purpose flags: bit 11 promises
/// UTF-8, anything else is CP437 per appendix D of the spec.
fn decode_name(raw: &[u8], flags: u16) -> ZipResult<String> {
    // Bit 11: Language encoding flag (EFS).  If this bit is set,
    //         the filename and comment fields for this file
    //         MUST be encoded using UTF-8. (see APPENDIX D)
    if flags & (1 << 11) != 0 {
        match std::str::from_utf8(raw) {
            Ok(name) => Ok(name.to_owned()),
            Err(_) => Err(ZipError::InvalidArchive("file name is not valid UTF-8")),
        }
    } else {
        let decoded: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
        Ok(decoded.into_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn directory_entries_are_detected_by_name() {
        let dir = ZipEntry::new("assets/textures/");
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert_eq!(dir.basename(), "");

        let file = ZipEntry::new("assets/textures/grass.png");
        assert!(file.is_file());
        assert_eq!(file.basename(), "grass.png");

        let bare = ZipEntry::new("README");
        assert_eq!(bare.basename(), "README");
    }

    #[test]
    fn non_ascii_names_get_the_utf8_flag() {
        let plain = ZipEntry::new("hello.txt");
        assert_eq!(plain.to_local_header().flags & 0x0800, 0);

        let accented = ZipEntry::new("smörgåsbord.txt");
        assert_ne!(accented.to_local_header().flags & 0x0800, 0);
    }

    #[test]
    fn descriptor_flag_never_reaches_the_wire() {
        let mut entry = ZipEntry::new("x");
        entry.flags = 0x0008;
        assert_eq!(entry.to_local_header().flags & 0x0008, 0);
    }

    #[test]
    fn cp437_names_decode() {
        assert_eq!(decode_name(b"hello.txt", 0).unwrap(), "hello.txt");
        // 0x81 is ü in CP437
        assert_eq!(decode_name(&[0x81, b'.', b't'], 0).unwrap(), "ü.t");
        // With the EFS bit set the same bytes are bogus UTF-8.
        assert!(decode_name(&[0x81, b'.', b't'], 1 << 11).is_err());
    }

    #[test]
    fn directory_with_payload_is_rejected() {
        let mut header = ZipEntry::new("dir/").to_central_header();
        header.uncompressed_size = 10;
        header.compressed_size = 10;
        assert!(matches!(
            ZipEntry::from_central(header),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn central_header_round_trips_through_metadata() {
        let mut original = ZipEntry::new("docs/a.txt");
        original.size = 40;
        original.compressed_size = 22;
        original.crc32 = 0x1234_5678;
        original.comment = b"note".to_vec();
        original.header_offset = 99;

        let rebuilt = ZipEntry::from_central(original.to_central_header()).unwrap();
        assert_eq!(rebuilt.name, original.name);
        assert_eq!(rebuilt.method, original.method);
        assert_eq!(rebuilt.size, original.size);
        assert_eq!(rebuilt.compressed_size, original.compressed_size);
        assert_eq!(rebuilt.crc32, original.crc32);
        assert_eq!(rebuilt.comment, original.comment);
        assert_eq!(rebuilt.header_offset, original.header_offset);
    }
}
