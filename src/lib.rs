//! tailzip reads and writes ZIP archives through seekable streams.
//!
//! Reading:
//!
//! ```no_run
//! # use std::io::Read;
//! # use tailzip::*;
//! let archive = ZipArchive::open("assets.zip")?;
//! if let Some(mut reader) = archive.input_stream("textures/grass.png", MatchPath::Match)? {
//!     let mut bytes = Vec::new();
//!     reader.read_to_end(&mut bytes)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Writing:
//!
//! ```no_run
//! # use tailzip::*;
//! let mut writer = ZipWriter::create("assets.zip")?;
//! writer.put_next_entry(ZipEntry::new("hello.txt"), &mut &b"Hello!\n"[..])?;
//! writer.close()?;
//! # Ok::<(), ZipError>(())
//! ```
//!
//! The trick in the name: a ZIP archive announces itself from its
//! *tail* (the End of central directory record), which means one can be
//! glued onto the back of any other file and still be found. tailzip
//! reads and writes such embedded archives as first-class citizens:
//! [`ZipWriter::append_to`] sticks an archive (plus a 4-byte locator)
//! onto an existing file, and [`ZipArchive::open_embedded`] opens it
//! again, with every internal offset translated so the archive behaves
//! as if it began at byte 0.
//!
//! Scope: the classic PKWARE 2.0 format — stored and DEFLATE entries,
//! single volume, no encryption, no ZIP64. Archives past 4 GiB or
//! 65535 entries are refused rather than silently mangled.
//!
//! [`ZipWriter::append_to`]: write::ZipWriter::append_to
//! [`ZipArchive::open_embedded`]: read::ZipArchive::open_embedded

pub mod dos_time;
pub mod entry;
pub mod read;
pub mod result;
pub mod write;

pub use dos_time::DosDateTime;
pub use entry::{CompressionMethod, MatchPath, ZipEntry};
pub use read::ZipArchive;
pub use result::{ZipError, ZipResult};
pub use write::ZipWriter;

mod back_buffer;
mod crc_reader;
mod seek;
mod spec;
