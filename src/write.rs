//! Tools for writing a ZIP archive.
//!
//! A [`ZipWriter`] consumes `(metadata, byte stream)` pairs and emits a
//! well-formed archive:
//!
//! ```no_run
//! # use tailzip::*;
//! let mut writer = ZipWriter::create("out.zip")?;
//! writer.put_next_entry(ZipEntry::new("hello.txt"), &mut &b"hi\n"[..])?;
//! writer.put_next_entry(ZipEntry::new("empty/"), &mut std::io::empty())?;
//! writer.close()?;
//! # Ok::<(), tailzip::ZipError>(())
//! ```
//!
//! The format forces a seek-and-patch strategy: an entry's CRC and
//! sizes aren't known until its data has been streamed, so each local
//! header is written as a placeholder and rewritten once the entry is
//! done. The sink therefore has to be seekable; pure streaming output
//! (with trailing data descriptors) is deliberately not supported.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::*;

use crate::entry::{CompressionMethod, ZipEntry};
use crate::result::*;
use crate::spec::EndOfCentralDirectory;

const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Where the writer is in its life: accepting entries, cleanly closed,
/// or dead after an error. Any I/O failure mid-entry can leave a
/// half-written archive behind, so a failed writer refuses everything
/// from then on.
enum WriterState {
    Idle,
    Closed,
    Failed,
}

/// Writes a ZIP archive to a seekable sink.
///
/// Entries appear in the central directory in the order they were
/// added. The storage method and compression level are *sticky*
/// writer-level settings ([`set_method`](Self::set_method) /
/// [`set_level`](Self::set_level)), stamped onto each entry as it is
/// appended. Nothing is final until [`close`](Self::close) succeeds.
pub struct ZipWriter<W: Write + Seek> {
    sink: W,
    /// Underlying position of the archive's byte 0; nonzero when the
    /// archive is being appended to a host file.
    start: u64,
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
    next_method: CompressionMethod,
    next_level: i32,
    state: WriterState,
    /// Write the 4-byte start-offset trailer after the EOCD
    embedded_trailer: bool,
}

impl ZipWriter<BufWriter<File>> {
    /// Creates (or truncates) a file and writes a freestanding archive
    /// to it.
    pub fn create<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }

    /// Appends an archive to an existing host file, `appendzip`-style.
    ///
    /// The archive starts at the host's current end, and
    /// [`close`](Self::close) writes a trailing little-endian u32 with
    /// that start offset so [`ZipArchive::open_embedded`] can find it.
    ///
    /// [`ZipArchive::open_embedded`]: crate::read::ZipArchive::open_embedded
    pub fn append_to<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let mut host = OpenOptions::new().write(true).open(path)?;
        host.seek(SeekFrom::End(0))?;
        let mut writer = Self::new(BufWriter::new(host))?;
        if u32::try_from(writer.start).is_err() {
            return Err(ZipError::TooLarge(
                "host file too large for the 32-bit start-offset trailer",
            ));
        }
        writer.embedded_trailer = true;
        Ok(writer)
    }
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Wraps a sink. The sink's current position becomes the archive's
    /// byte 0, so offsets inside the archive stay self-consistent even
    /// when other data precedes it.
    pub fn new(mut sink: W) -> ZipResult<Self> {
        let start = sink.stream_position()?;
        Ok(ZipWriter {
            sink,
            start,
            entries: Vec::new(),
            comment: Vec::new(),
            next_method: CompressionMethod::Deflate,
            next_level: 6,
            state: WriterState::Idle,
            embedded_trailer: false,
        })
    }

    /// Sets the archive-level comment written with the EOCD.
    pub fn set_comment(&mut self, comment: impl Into<Vec<u8>>) {
        self.comment = comment.into();
    }

    /// Sets the storage method for subsequent entries.
    pub fn set_method(&mut self, method: CompressionMethod) {
        self.next_method = method;
    }

    /// Sets the compression level for subsequent entries: ≤ 0 for the
    /// zlib default, 1..=9 for explicit levels (clamped above 9).
    /// Level 0 with [`CompressionMethod::Deflate`] stores instead.
    pub fn set_level(&mut self, level: i32) {
        self.next_level = level;
    }

    /// The entries finalized so far, in archive order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Appends one entry, streaming `source` to end-of-file as its data.
    ///
    /// The sticky method and level are stamped onto `entry`, a
    /// placeholder local header is written, the data is streamed
    /// through the compressor (or copied raw when stored), and the
    /// header is patched with the final CRC-32 and sizes.
    ///
    /// Any error puts the writer into its failed state; later calls
    /// return [`ZipError::InvalidState`].
    pub fn put_next_entry<R: Read>(&mut self, entry: ZipEntry, source: &mut R) -> ZipResult<()> {
        self.check_writable()?;
        match self.write_entry(entry, source) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.state = WriterState::Failed;
                Err(error)
            }
        }
    }

    /// Writes the central directory and the End of central directory
    /// record, completing the archive.
    ///
    /// Once `close` returns `Ok`, the sink holds a complete well-formed
    /// archive. Closing twice (or after a failure) returns
    /// [`ZipError::InvalidState`].
    pub fn close(&mut self) -> ZipResult<()> {
        self.check_writable()?;
        match self.write_trailer() {
            Ok(()) => {
                self.state = WriterState::Closed;
                Ok(())
            }
            Err(error) => {
                self.state = WriterState::Failed;
                Err(error)
            }
        }
    }

    /// Hands back the sink, e.g. to recover an in-memory buffer.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn check_writable(&self) -> ZipResult<()> {
        match self.state {
            WriterState::Idle => Ok(()),
            WriterState::Closed => Err(ZipError::InvalidState("writer is closed")),
            WriterState::Failed => Err(ZipError::InvalidState("writer failed earlier")),
        }
    }

    fn write_entry<R: Read>(&mut self, mut entry: ZipEntry, source: &mut R) -> ZipResult<()> {
        entry.method = self.next_method;
        entry.level = self.next_level;
        // Deflating at level 0 just wastes five bytes per block; store.
        if entry.method == CompressionMethod::Deflate && entry.level == 0 {
            entry.method = CompressionMethod::Stored;
        }
        // A directory holds no data, and even an empty deflate stream is
        // two bytes long. Directories must read back with zero sizes.
        if entry.is_dir() {
            entry.method = CompressionMethod::Stored;
        }
        if entry.method == CompressionMethod::Stored {
            entry.level = 0;
        }

        let header_position = self.sink.stream_position()?;
        entry.header_offset = u32::try_from(header_position - self.start)
            .map_err(|_| ZipError::TooLarge("local header offset past 4 GiB"))?;
        entry.crc32 = 0;
        entry.size = 0;
        entry.compressed_size = 0;
        debug!("writing {:?} at offset {}", entry.name, entry.header_offset);

        let placeholder = entry.to_local_header();
        placeholder.write(&mut self.sink)?;
        entry.data_offset = u64::from(entry.header_offset) + placeholder.size_in_file();

        let (crc32, uncompressed, compressed) = match entry.method {
            CompressionMethod::Stored => self.copy_stored(source)?,
            CompressionMethod::Deflate => {
                let mut filter = DeflateSink::new(&mut self.sink, entry.level);
                io::copy(source, &mut filter)?;
                filter.finish()?
            }
        };
        trace!(
            "{:?}: {} bytes in, {} bytes out, crc {:08x}",
            entry.name,
            uncompressed,
            compressed,
            crc32
        );

        if entry.is_dir() && uncompressed != 0 {
            return Err(ZipError::InvalidValue("directory entry with a payload"));
        }
        entry.crc32 = crc32;
        entry.size = u32::try_from(uncompressed)
            .map_err(|_| ZipError::TooLarge("entry data larger than 4 GiB"))?;
        entry.compressed_size = u32::try_from(compressed)
            .map_err(|_| ZipError::TooLarge("compressed entry data larger than 4 GiB"))?;

        // The placeholder becomes the real header now that the CRC and
        // sizes are known.
        let end_position = self.sink.stream_position()?;
        self.sink.seek(SeekFrom::Start(header_position))?;
        entry.to_local_header().write(&mut self.sink)?;
        self.sink.seek(SeekFrom::Start(end_position))?;

        self.entries.push(entry);
        Ok(())
    }

    /// Stored entries bypass the deflate filter; the raw bytes go
    /// straight to the sink while we hash and count them here.
    fn copy_stored<R: Read>(&mut self, source: &mut R) -> ZipResult<(u32, u64, u64)> {
        let mut crc = Hasher::new();
        let mut copied: u64 = 0;
        let mut buf = [0u8; COPY_BUFFER_SIZE];
        loop {
            let count = source.read(&mut buf)?;
            if count == 0 {
                break;
            }
            crc.update(&buf[..count]);
            self.sink.write_all(&buf[..count])?;
            copied += count as u64;
        }
        Ok((crc.finalize(), copied, copied))
    }

    fn write_trailer(&mut self) -> ZipResult<()> {
        // Everything the classic format caps gets checked before any
        // trailer bytes go out.
        let entry_count = u16::try_from(self.entries.len())
            .map_err(|_| ZipError::TooLarge("more than 65535 entries"))?;
        if self.comment.len() > usize::from(u16::MAX) {
            return Err(ZipError::TooLarge("archive comment longer than 65535 bytes"));
        }

        let directory_position = self.sink.stream_position()?;
        let directory_offset = u32::try_from(directory_position - self.start)
            .map_err(|_| ZipError::TooLarge("central directory offset past 4 GiB"))?;
        debug!(
            "central directory: {} entries at offset {}",
            entry_count, directory_offset
        );

        for entry in &self.entries {
            entry.to_central_header().write(&mut self.sink)?;
        }

        let directory_size = u32::try_from(self.sink.stream_position()? - directory_position)
            .map_err(|_| ZipError::TooLarge("central directory larger than 4 GiB"))?;

        EndOfCentralDirectory {
            entries: entry_count,
            central_directory_size: directory_size,
            central_directory_offset: directory_offset,
            file_comment: self.comment.clone(),
        }
        .write(&mut self.sink)?;

        if self.embedded_trailer {
            self.sink.write_all(&(self.start as u32).to_le_bytes())?;
        }
        self.sink.flush()?;
        Ok(())
    }
}

/// The deflate write filter: compresses what's written through it into
/// the sink, keeping a running CRC-32 of the input and counts of both
/// the input and output bytes.
///
/// [`finish`](Self::finish) consumes the filter, so nothing can be
/// written after the deflate tail has been flushed.
struct DeflateSink<W: Write> {
    encoder: DeflateEncoder<CountingWriter<W>>,
    crc: Hasher,
    uncompressed: u64,
}

impl<W: Write> DeflateSink<W> {
    fn new(sink: W, level: i32) -> Self {
        DeflateSink {
            encoder: DeflateEncoder::new(
                CountingWriter { inner: sink, written: 0 },
                compression_for_level(level),
            ),
            crc: Hasher::new(),
            uncompressed: 0,
        }
    }

    /// Flushes the deflate tail and reports
    /// `(crc32, uncompressed bytes, compressed bytes)`.
    fn finish(self) -> io::Result<(u32, u64, u64)> {
        let counter = self.encoder.finish()?;
        Ok((self.crc.finalize(), self.uncompressed, counter.written))
    }
}

impl<W: Write> Write for DeflateSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.encoder.write(buf)?;
        self.crc.update(&buf[..count]);
        self.uncompressed += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Counts the bytes that reach the sink (i.e. the compressed side).
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.inner.write(buf)?;
        self.written += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Maps this crate's level convention onto zlib's: ≤ 0 is the default
/// (6), 9 and up pin the slowest/strongest setting.
fn compression_for_level(level: i32) -> Compression {
    if level <= 0 {
        Compression::default()
    } else {
        Compression::new(level.min(9) as u32)
    }
}
