//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, open a [`ZipArchive`] from its file:
//!
//! ```no_run
//! # use std::io;
//! # use tailzip::*;
//! let archive = ZipArchive::open("foo.zip")?;
//! for entry in archive.entries() {
//!     let mut reader = archive.read(entry)?;
//!     let mut save_to = io::sink(); // or a File, a Vec, ...
//!     io::copy(&mut reader, &mut save_to)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! An archive doesn't have to own its whole file. For a ZIP appended to
//! a host file with a trailing 4-byte offset (the `appendzip`
//! convention), use [`ZipArchive::open_embedded`]; for any other layout,
//! give [`ZipArchive::open_at`] the embedded region's offsets directly.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use log::*;
use memchr::memmem;

use crate::back_buffer::BackBuffer;
use crate::crc_reader::Crc32Reader;
use crate::entry::{CompressionMethod, MatchPath, ZipEntry};
use crate::result::*;
use crate::seek::VirtualSeeker;
use crate::spec::{
    CentralDirectoryHeader, EndOfCentralDirectory, LocalFileHeader, EOCDR_MAGIC,
};

/// How much of the archive's tail the EOCD hunt pulls in per step.
/// Anything past the 22-byte fixed record works; a whole KiB finds
/// real-world comment-free archives in a single read.
const EOCD_SCAN_CHUNK: usize = 1024;

/// A ZIP archive opened for reading
///
/// Opening walks the entire metadata of the archive once: the End of
/// central directory is located by scanning backward from the end, the
/// central directory is decoded, and every local header is checked for
/// consistency against its central directory twin. After that,
/// [`read`](Self::read) hands out independent streams over entry data.
pub struct ZipArchive {
    path: PathBuf,
    vs: VirtualSeeker,
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
}

impl ZipArchive {
    /// Opens a freestanding ZIP archive file.
    pub fn open<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        Self::open_at(path, 0, 0)
    }

    /// Opens a ZIP archive that was appended to `path` with a trailing
    /// little-endian u32 giving the archive's start offset (the
    /// `appendzip` convention; see [`ZipWriter::append_to`]).
    ///
    /// [`ZipWriter::append_to`]: crate::write::ZipWriter::append_to
    pub fn open_embedded<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let path = path.as_ref();
        let start = {
            let mut file = File::open(path)?;
            file.seek(SeekFrom::End(-4))?;
            let mut trailer = [0u8; 4];
            file.read_exact(&mut trailer)?;
            u32::from_le_bytes(trailer)
        };
        trace!("embedded archive starts at {}", start);
        Self::open_at(path, u64::from(start), 4)
    }

    /// Opens a ZIP archive embedded in a larger file.
    ///
    /// `start` is the archive's first byte from the start of the file;
    /// `end_from_end` is how many trailing bytes of the file belong to
    /// the host, not the archive.
    pub fn open_at<P: AsRef<Path>>(path: P, start: u64, end_from_end: u64) -> ZipResult<Self> {
        let path = path.as_ref().to_owned();
        let vs = VirtualSeeker::new(start, end_from_end);
        let mut file = BufReader::new(File::open(&path)?);

        let eocd = find_eocd(&mut file, vs)?;
        trace!("{:?}", eocd);

        // Decode the central directory in on-disk order.
        vs.seek(
            &mut file,
            SeekFrom::Start(u64::from(eocd.central_directory_offset)),
        )?;
        let mut headers = Vec::with_capacity(usize::from(eocd.entries));
        for _ in 0..eocd.entries {
            let header = CentralDirectoryHeader::parse(&mut file)?;
            trace!("{:?}", header);
            headers.push(header);
        }

        // The directory must end exactly where the EOCD's size field
        // says it does.
        let directory_end = vs.tell(&mut file)?;
        let declared_end = u64::from(eocd.central_directory_offset)
            + u64::from(eocd.central_directory_size);
        if directory_end != declared_end {
            return Err(ZipError::InvalidArchive(
                "central directory size disagrees with its contents",
            ));
        }

        // Every local header must agree with its central directory
        // twin. While we're at each one, note where the entry's data
        // begins; the local header's extra field (and so its size) can
        // legitimately differ from the central one's.
        let mut entries = Vec::with_capacity(headers.len());
        for header in headers {
            vs.seek(&mut file, SeekFrom::Start(u64::from(header.header_offset)))?;
            let local = LocalFileHeader::parse(&mut file)?;
            if !local.matches_central(&header) {
                return Err(ZipError::InvalidArchive(
                    "local file header disagrees with the central directory",
                ));
            }
            let data_offset = u64::from(header.header_offset) + local.size_in_file();

            let mut entry = ZipEntry::from_central(header)?;
            entry.data_offset = data_offset;
            debug!("{:?}", entry);
            entries.push(entry);
        }

        Ok(ZipArchive {
            path,
            vs,
            entries,
            comment: eocd.file_comment,
        })
    }

    /// Returns the archive's entries in central directory order.
    ///
    /// No effort is made to deduplicate them; ZIP makes no promises.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// The archive-level comment from the End of central directory
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Looks up an entry by name.
    ///
    /// [`MatchPath::Match`] compares whole names; [`MatchPath::Ignore`]
    /// compares only the part after the last `/`. The first match in
    /// directory order wins. A missing name is `None`, not an error.
    pub fn entry(&self, name: &str, match_path: MatchPath) -> Option<&ZipEntry> {
        match match_path {
            MatchPath::Match => self.entries.iter().find(|entry| entry.name == name),
            MatchPath::Ignore => self.entries.iter().find(|entry| entry.basename() == name),
        }
    }

    /// Opens a stream over the named entry's uncompressed bytes,
    /// or `None` if no entry matches.
    pub fn input_stream(
        &self,
        name: &str,
        match_path: MatchPath,
    ) -> ZipResult<Option<EntryReader>> {
        match self.entry(name, match_path) {
            Some(entry) => Ok(Some(self.read(entry)?)),
            None => Ok(None),
        }
    }

    /// Opens a stream over the given entry's uncompressed bytes.
    ///
    /// Each stream is an independent handle on the archive file, so any
    /// number can be open (and read) at once. The stream does *not*
    /// verify the CRC-32; use [`read_verified`](Self::read_verified)
    /// for that.
    pub fn read(&self, entry: &ZipEntry) -> ZipResult<EntryReader> {
        debug!("reading {:?}", entry.name);
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(
            self.vs.start_offset() + entry.data_offset,
        ))?;
        let raw = BufReader::new(file).take(u64::from(entry.compressed_size));

        let inner = match entry.method {
            CompressionMethod::Stored => EntryReaderInner::Stored(raw),
            CompressionMethod::Deflate => {
                EntryReaderInner::Deflated(DeflateDecoder::new(raw).take(u64::from(entry.size)))
            }
        };
        Ok(EntryReader { inner })
    }

    /// Like [`read`](Self::read), but checks the stream against the
    /// entry's CRC-32 when it reaches end-of-file.
    pub fn read_verified(&self, entry: &ZipEntry) -> ZipResult<Box<dyn Read + Send>> {
        Ok(Box::new(Crc32Reader::new(self.read(entry)?, entry.crc32)))
    }
}

/// Scans backward through the archive's tail for the End of central
/// directory record.
///
/// It should be right at the end of the file, but its variable-size
/// comment means we can't jump to a known offset. Chunks load back to
/// front; each newly widened window is searched forward, and every
/// signature hit is test-parsed so stray `PK\x05\x06` bytes in entry
/// data or comments don't fool us.
fn find_eocd<S: Read + Seek>(stream: &mut S, vs: VirtualSeeker) -> ZipResult<EndOfCentralDirectory> {
    let mut back_buffer = BackBuffer::new(stream, vs, EOCD_SCAN_CHUNK)?;
    let finder = memmem::Finder::new(&EOCDR_MAGIC);

    let mut read_pointer = 0;
    while back_buffer.read_chunk(stream, &mut read_pointer)? {
        let mut search_from = read_pointer;
        while let Some(hit) = finder.find(&back_buffer[search_from..]) {
            let candidate = search_from + hit;
            if let Some(eocd) = EndOfCentralDirectory::parse(&back_buffer, candidate)? {
                return Ok(eocd);
            }
            search_from = candidate + 1;
        }
    }
    Err(ZipError::InvalidArchive(
        "no end of central directory record found",
    ))
}

/// A readable stream over one entry's uncompressed bytes
///
/// Reading is bounded by the entry's recorded sizes; reads past the
/// bound return a clean end-of-file. Created by [`ZipArchive::read`].
pub struct EntryReader {
    inner: EntryReaderInner,
}

enum EntryReaderInner {
    Stored(io::Take<BufReader<File>>),
    Deflated(io::Take<DeflateDecoder<io::Take<BufReader<File>>>>),
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            EntryReaderInner::Stored(stored) => stored.read(buf),
            EntryReaderInner::Deflated(deflated) => deflated.read(buf),
        }
    }
}
