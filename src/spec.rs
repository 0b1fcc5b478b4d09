//! Code specific to the ZIP file format specification.
//!
//! The nitty gritty of the on-disk records lives here: one definition
//! of each structure's layout, used for both parsing and emitting, so
//! the two directions can't drift apart.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::io::{Read, Write};

use crate::result::*;

// Magic numbers denoting the sections of a ZIP archive

/// Local file header magic number
pub const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];
/// Central directory magic number
pub const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// End of central directory magic number
pub const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];

/// Fixed size of a local file header, before its variable-length tail
pub const LOCAL_HEADER_FIXED_SIZE: u64 = 30;
/// Fixed size of a central directory header, before its tail
pub const CENTRAL_HEADER_FIXED_SIZE: u64 = 46;
/// Fixed size of the End of central directory record, before its comment
pub const EOCDR_FIXED_SIZE: usize = 22;

/// The highest "version needed to extract" this crate understands.
/// 2.0 covers DEFLATE; everything past it (Zip64, strong crypto, ...)
/// is out of scope.
const MAX_EXTRACT_VERSION: u16 = 20;

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

fn write_u16<W: Write>(to: &mut W, value: u16) -> std::io::Result<()> {
    to.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(to: &mut W, value: u32) -> std::io::Result<()> {
    to.write_all(&value.to_le_bytes())
}

/// Rejects entries that use features outside the classic 2.0 subset.
///
/// Shared between local and central headers, which carry the same
/// version/flags/method triple.
fn check_supported(minimum_extract_version: u16, flags: u16, compression_method: u16) -> ZipResult<()> {
    // Bit 3: the crc-32, compressed size and uncompressed size are set
    // to zero in the local header and a data descriptor trails the data.
    // We rely on local headers being complete, so no.
    if flags & 0x0008 != 0 {
        return Err(ZipError::Unsupported(String::from(
            "trailing data descriptor",
        )));
    }
    // Bit 0: if set, indicates that the file is encrypted.
    if flags & 0x0001 != 0 {
        return Err(ZipError::Unsupported(String::from("encrypted entry")));
    }
    if minimum_extract_version > MAX_EXTRACT_VERSION {
        return Err(ZipError::Unsupported(format!(
            "version needed to extract: {}",
            minimum_extract_version
        )));
    }
    if compression_method != 0 && compression_method != 8 {
        return Err(ZipError::Unsupported(format!(
            "compression method: {}",
            compression_method
        )));
    }
    Ok(())
}

/// A local file header, immediately preceding an entry's data
///
/// The sizes, CRC, and extra field here may disagree with the central
/// directory in the wild; [`matches_central`](Self::matches_central)
/// compares only the fields that must agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    /// Packed DOS date/time, `(date << 16) | time`
    pub dos_time: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    /// Parses a local file header from the reader's current position.
    pub fn parse<R: Read>(from: &mut R) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        let mut signature = [0u8; 4];
        from.read_exact(&mut signature)?;
        if signature != LOCAL_FILE_HEADER_MAGIC {
            return Err(ZipError::InvalidArchive("invalid local file header"));
        }

        let mut fixed = [0u8; 26];
        from.read_exact(&mut fixed)?;
        let mut fields = &fixed[..];
        let minimum_extract_version = read_u16(&mut fields);
        let flags = read_u16(&mut fields);
        let compression_method = read_u16(&mut fields);
        let last_modified_time = read_u16(&mut fields);
        let last_modified_date = read_u16(&mut fields);
        let crc32 = read_u32(&mut fields);
        let compressed_size = read_u32(&mut fields);
        let uncompressed_size = read_u32(&mut fields);
        let path_length = read_u16(&mut fields);
        let extra_field_length = read_u16(&mut fields);

        check_supported(minimum_extract_version, flags, compression_method)?;

        let mut path = vec![0u8; usize::from(path_length)];
        from.read_exact(&mut path)?;
        let mut extra_field = vec![0u8; usize::from(extra_field_length)];
        from.read_exact(&mut extra_field)?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            dos_time: u32::from(last_modified_date) << 16 | u32::from(last_modified_time),
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }

    /// Writes the header at the writer's current position.
    ///
    /// Oversized variable-length fields fail with [`ZipError::TooLarge`]
    /// before anything is written.
    pub fn write<W: Write>(&self, to: &mut W) -> ZipResult<()> {
        let path_length = length_field(self.path.len(), "file name longer than 65535 bytes")?;
        let extra_length =
            length_field(self.extra_field.len(), "extra field longer than 65535 bytes")?;

        to.write_all(&LOCAL_FILE_HEADER_MAGIC)?;
        write_u16(to, self.minimum_extract_version)?;
        write_u16(to, self.flags)?;
        write_u16(to, self.compression_method)?;
        write_u16(to, self.dos_time as u16)?;
        write_u16(to, (self.dos_time >> 16) as u16)?;
        write_u32(to, self.crc32)?;
        write_u32(to, self.compressed_size)?;
        write_u32(to, self.uncompressed_size)?;
        write_u16(to, path_length)?;
        write_u16(to, extra_length)?;
        to.write_all(&self.path)?;
        to.write_all(&self.extra_field)?;
        Ok(())
    }

    /// The header's on-disk footprint, including its variable tail
    pub fn size_in_file(&self) -> u64 {
        LOCAL_HEADER_FIXED_SIZE + self.path.len() as u64 + self.extra_field.len() as u64
    }

    /// Checks this header for consistency with its central directory twin.
    ///
    /// Not all fields need to be identical: the CRC and sizes may live
    /// only in the central directory for some archivers, and experience
    /// has shown that the extra fields differ too. Version, flags,
    /// method, timestamp, and the file name byte-for-byte must agree.
    pub fn matches_central(&self, central: &CentralDirectoryHeader) -> bool {
        self.minimum_extract_version == central.minimum_extract_version
            && self.flags == central.flags
            && self.compression_method == central.compression_method
            && self.dos_time == central.dos_time
            && self.path == central.path
    }
}

/// A central directory header
///
/// One per entry, holding everything the local header holds plus the
/// entry's comment, attributes, and the offset of its local header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    /// Packed DOS date/time, `(date << 16) | time`
    pub dos_time: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub file_comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Parses a central directory header from the reader's current position.
    pub fn parse<R: Read>(from: &mut R) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        let mut signature = [0u8; 4];
        from.read_exact(&mut signature)?;
        if signature != CENTRAL_DIRECTORY_MAGIC {
            return Err(ZipError::InvalidArchive("invalid central directory header"));
        }

        let mut fixed = [0u8; 42];
        from.read_exact(&mut fixed)?;
        let mut fields = &fixed[..];
        let source_version = read_u16(&mut fields);
        let minimum_extract_version = read_u16(&mut fields);
        let flags = read_u16(&mut fields);
        let compression_method = read_u16(&mut fields);
        let last_modified_time = read_u16(&mut fields);
        let last_modified_date = read_u16(&mut fields);
        let crc32 = read_u32(&mut fields);
        let compressed_size = read_u32(&mut fields);
        let uncompressed_size = read_u32(&mut fields);
        let path_length = read_u16(&mut fields);
        let extra_field_length = read_u16(&mut fields);
        let file_comment_length = read_u16(&mut fields);
        let disk_number = read_u16(&mut fields);
        let internal_file_attributes = read_u16(&mut fields);
        let external_file_attributes = read_u32(&mut fields);
        let header_offset = read_u32(&mut fields);

        check_supported(minimum_extract_version, flags, compression_method)?;
        if disk_number != 0 {
            return Err(ZipError::Unsupported(format!(
                "spanned archive: entry claims to start on disk {}",
                disk_number
            )));
        }

        let mut path = vec![0u8; usize::from(path_length)];
        from.read_exact(&mut path)?;
        let mut extra_field = vec![0u8; usize::from(extra_field_length)];
        from.read_exact(&mut extra_field)?;
        let mut file_comment = vec![0u8; usize::from(file_comment_length)];
        from.read_exact(&mut file_comment)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            dos_time: u32::from(last_modified_date) << 16 | u32::from(last_modified_time),
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }

    /// Writes the header at the writer's current position.
    pub fn write<W: Write>(&self, to: &mut W) -> ZipResult<()> {
        let path_length = length_field(self.path.len(), "file name longer than 65535 bytes")?;
        let extra_length =
            length_field(self.extra_field.len(), "extra field longer than 65535 bytes")?;
        let comment_length = length_field(
            self.file_comment.len(),
            "entry comment longer than 65535 bytes",
        )?;

        to.write_all(&CENTRAL_DIRECTORY_MAGIC)?;
        write_u16(to, self.source_version)?;
        write_u16(to, self.minimum_extract_version)?;
        write_u16(to, self.flags)?;
        write_u16(to, self.compression_method)?;
        write_u16(to, self.dos_time as u16)?;
        write_u16(to, (self.dos_time >> 16) as u16)?;
        write_u32(to, self.crc32)?;
        write_u32(to, self.compressed_size)?;
        write_u32(to, self.uncompressed_size)?;
        write_u16(to, path_length)?;
        write_u16(to, extra_length)?;
        write_u16(to, comment_length)?;
        write_u16(to, self.disk_number)?;
        write_u16(to, self.internal_file_attributes)?;
        write_u32(to, self.external_file_attributes)?;
        write_u32(to, self.header_offset)?;
        to.write_all(&self.path)?;
        to.write_all(&self.extra_field)?;
        to.write_all(&self.file_comment)?;
        Ok(())
    }
}

/// The End of central directory record
///
/// Found at the back of the archive; tells us where the central
/// directory lives, along with lots of stuff that stopped being
/// relevant when ZIP archives stopped spanning multiple floppies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Attempts to parse an EOCD record at `buf[pos..]`.
    ///
    /// Returns `Ok(None)` for a false positive: too few bytes for the
    /// fixed record, a signature mismatch, or a comment length that
    /// runs past the buffer. The back-buffer scan keeps going in that
    /// case. A record that parses but describes a spanned archive
    /// (nonzero disk numbers, mismatched entry counts) is a hard
    /// [`ZipError::Unsupported`].
    pub fn parse(buf: &[u8], pos: usize) -> ZipResult<Option<Self>> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        // zipfile comment (variable size)
        if buf.len().saturating_sub(pos) < EOCDR_FIXED_SIZE {
            return Ok(None);
        }
        if buf[pos..pos + 4] != EOCDR_MAGIC {
            return Ok(None);
        }

        let mut fields = &buf[pos + 4..pos + EOCDR_FIXED_SIZE];
        let disk_number = read_u16(&mut fields);
        let disk_with_central_directory = read_u16(&mut fields);
        let entries_on_this_disk = read_u16(&mut fields);
        let entries = read_u16(&mut fields);
        let central_directory_size = read_u32(&mut fields);
        let central_directory_offset = read_u32(&mut fields);
        let comment_length = usize::from(read_u16(&mut fields));

        let comment_start = pos + EOCDR_FIXED_SIZE;
        if comment_start + comment_length > buf.len() {
            // The signature bytes showed up in the middle of something
            // else; a real comment fits before end-of-archive.
            return Ok(None);
        }

        if disk_number != 0 || disk_with_central_directory != 0 {
            return Err(ZipError::Unsupported(format!(
                "spanned archive: end of central directory on disk {}",
                disk_number
            )));
        }
        if entries_on_this_disk != entries {
            return Err(ZipError::Unsupported(String::from(
                "spanned archive: entry counts differ between disks",
            )));
        }

        Ok(Some(Self {
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment: buf[comment_start..comment_start + comment_length].to_vec(),
        }))
    }

    /// Writes the record at the writer's current position.
    pub fn write<W: Write>(&self, to: &mut W) -> ZipResult<()> {
        let comment_length = length_field(
            self.file_comment.len(),
            "archive comment longer than 65535 bytes",
        )?;

        to.write_all(&EOCDR_MAGIC)?;
        write_u16(to, 0)?; // this disk
        write_u16(to, 0)?; // disk with the central directory
        write_u16(to, self.entries)?; // entries on this disk...
        write_u16(to, self.entries)?; // ...and overall: one disk, same count
        write_u32(to, self.central_directory_size)?;
        write_u32(to, self.central_directory_offset)?;
        write_u16(to, comment_length)?;
        to.write_all(&self.file_comment)?;
        Ok(())
    }
}

fn length_field(len: usize, what: &'static str) -> ZipResult<u16> {
    u16::try_from(len).map_err(|_| ZipError::TooLarge(what))
}
