//! Reading a stream backward in chunks.
//!
//! The End of central directory record sits at the back of a ZIP
//! archive, at an unknown distance from end-of-file because of its
//! variable-length comment. A [`BackBuffer`] pulls fixed-size chunks
//! from the end of the virtual region toward its start, prepending them
//! to a growing buffer, so the caller can hunt for the trailing
//! signature without loading the whole archive.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;

use crate::result::*;
use crate::seek::VirtualSeeker;

/// A sliding buffer over the tail of a seekable stream.
///
/// Each [`read_chunk`](Self::read_chunk) call loads the chunk *before*
/// the buffered region and prepends it; the buffer always holds a
/// contiguous run of bytes ending at the virtual end of the stream.
pub struct BackBuffer {
    buf: Vec<u8>,
    vs: VirtualSeeker,
    chunk_size: u64,
    /// Virtual offset of the first buffered byte; read_chunk moves it left.
    file_pos: u64,
}

impl BackBuffer {
    /// Positions the scan at the virtual end of `stream`.
    ///
    /// A zero `chunk_size` fails with [`ZipError::InvalidValue`]; a
    /// stream that can't be seeked fails with [`ZipError::Io`].
    pub fn new<S: Read + Seek>(
        stream: &mut S,
        vs: VirtualSeeker,
        chunk_size: usize,
    ) -> ZipResult<Self> {
        if chunk_size == 0 {
            return Err(ZipError::InvalidValue("chunk size must be positive"));
        }
        let file_pos = vs.seek(stream, SeekFrom::End(0))?;
        Ok(BackBuffer {
            buf: Vec::new(),
            vs,
            chunk_size: chunk_size as u64,
            file_pos,
        })
    }

    /// Prepends the next chunk (moving toward the virtual start).
    ///
    /// Returns `false` once the whole region has been buffered.
    /// On success, `read_pointer` is set to the buffer index at which
    /// the newly loaded bytes begin; scan forward from there. Bytes at
    /// higher indices were already visible on earlier calls, but a
    /// signature can straddle the boundary, so scans must be allowed to
    /// run past it.
    pub fn read_chunk<S: Read + Seek>(
        &mut self,
        stream: &mut S,
        read_pointer: &mut usize,
    ) -> ZipResult<bool> {
        if self.file_pos == 0 {
            return Ok(false);
        }

        let loaded = self.chunk_size.min(self.file_pos) as usize;
        self.file_pos -= loaded as u64;
        self.vs.seek(stream, SeekFrom::Start(self.file_pos))?;
        self.buf.splice(0..0, std::iter::repeat(0u8).take(loaded));
        stream.read_exact(&mut self.buf[..loaded])?;

        *read_pointer = 0;
        Ok(true)
    }
}

impl Deref for BackBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn counting_file() -> Cursor<Vec<u8>> {
        Cursor::new((0..=255u8).collect())
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut file = counting_file();
        match BackBuffer::new(&mut file, VirtualSeeker::default(), 0) {
            Err(ZipError::InvalidValue(_)) => {}
            other => panic!("expected InvalidValue, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn chunks_reassemble_the_whole_file() {
        let mut file = counting_file();
        let mut bb = BackBuffer::new(&mut file, VirtualSeeker::default(), 16).unwrap();

        let mut read_p = usize::MAX;
        let mut chunks = 0;
        while bb.read_chunk(&mut file, &mut read_p).unwrap() {
            assert_eq!(read_p, 0);
            chunks += 1;
        }
        assert_eq!(chunks, 16);
        assert_eq!(&bb[..], &file.get_ref()[..]);

        // Exhausted; further calls keep returning false.
        assert!(!bb.read_chunk(&mut file, &mut read_p).unwrap());
    }

    #[test]
    fn short_final_chunk_reaches_the_start() {
        let mut file = counting_file();
        let mut bb = BackBuffer::new(&mut file, VirtualSeeker::default(), 100).unwrap();

        let mut read_p = 0;
        assert!(bb.read_chunk(&mut file, &mut read_p).unwrap());
        assert_eq!(bb.len(), 100);
        assert_eq!(bb[0], 156);
        assert!(bb.read_chunk(&mut file, &mut read_p).unwrap());
        assert!(bb.read_chunk(&mut file, &mut read_p).unwrap());
        assert_eq!(bb.len(), 256);
        assert!(!bb.read_chunk(&mut file, &mut read_p).unwrap());
        assert_eq!(&bb[..], &file.get_ref()[..]);
    }

    #[test]
    fn respects_the_virtual_region() {
        let mut file = counting_file();
        let vs = VirtualSeeker::new(64, 32);
        let mut bb = BackBuffer::new(&mut file, vs, 50).unwrap();

        let mut read_p = 0;
        while bb.read_chunk(&mut file, &mut read_p).unwrap() {}
        // 256 - 64 - 32 bytes, starting at the virtual start (byte 64).
        assert_eq!(bb.len(), 160);
        assert_eq!(bb[0], 64);
        assert_eq!(bb[159], 223);
    }
}
