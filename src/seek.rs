//! Offset translation for ZIP archives embedded in larger files.
//!
//! A ZIP archive doesn't have to start at byte 0: self-extracting
//! executables and the append-a-zip trick put arbitrary data in front of
//! (and sometimes behind) the archive proper. A [`VirtualSeeker`] maps a
//! window `[start, file_size - end_from_end)` of the underlying stream
//! onto virtual positions starting at 0, so the rest of the crate can
//! pretend every archive is freestanding.

use std::io::{self, Seek, SeekFrom};

/// Translates seeks and tells between an embedded archive's coordinates
/// and the underlying stream's.
///
/// `start` is the archive's first byte, measured from the start of the
/// file; `end_from_end` is the number of trailing bytes that belong to
/// the host file, measured back from end-of-file. Both default to zero,
/// which makes the seeker a no-op for freestanding archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualSeeker {
    start: u64,
    end_from_end: u64,
}

impl VirtualSeeker {
    pub fn new(start: u64, end_from_end: u64) -> Self {
        VirtualSeeker {
            start,
            end_from_end,
        }
    }

    /// The archive's first byte, from the start of the underlying stream
    pub fn start_offset(&self) -> u64 {
        self.start
    }

    /// Trailing host-file bytes, measured back from end-of-file
    pub fn end_from_end(&self) -> u64 {
        self.end_from_end
    }

    /// Seeks `stream` to the given *virtual* position and returns the
    /// resulting virtual position.
    ///
    /// `Start` is relative to `start`, `End` to the virtual end
    /// (`file_size - end_from_end`), and `Current` passes through
    /// unchanged. Seeking to a spot before `start` is an error.
    pub fn seek<S: Seek>(&self, stream: &mut S, pos: SeekFrom) -> io::Result<u64> {
        let underlying = match pos {
            SeekFrom::Start(offset) => {
                let target = self
                    .start
                    .checked_add(offset)
                    .ok_or_else(|| out_of_range("seek offset overflows"))?;
                stream.seek(SeekFrom::Start(target))?
            }
            SeekFrom::End(delta) => {
                let end_adjust = i64::try_from(self.end_from_end)
                    .map_err(|_| out_of_range("end offset overflows"))?;
                let adjusted = delta
                    .checked_sub(end_adjust)
                    .ok_or_else(|| out_of_range("seek offset overflows"))?;
                stream.seek(SeekFrom::End(adjusted))?
            }
            SeekFrom::Current(delta) => stream.seek(SeekFrom::Current(delta))?,
        };
        underlying
            .checked_sub(self.start)
            .ok_or_else(|| out_of_range("seek before the start of the virtual region"))
    }

    /// The stream's current position in virtual coordinates
    pub fn tell<S: Seek>(&self, stream: &mut S) -> io::Result<u64> {
        let underlying = stream.stream_position()?;
        underlying
            .checked_sub(self.start)
            .ok_or_else(|| out_of_range("position before the start of the virtual region"))
    }
}

fn out_of_range(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, Read};

    fn counting_file() -> Cursor<Vec<u8>> {
        Cursor::new((0..=255u8).collect())
    }

    #[test]
    fn default_seeker_is_transparent() {
        let mut file = counting_file();
        let vs = VirtualSeeker::default();

        assert_eq!(vs.seek(&mut file, SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(vs.tell(&mut file).unwrap(), 10);
        assert_eq!(vs.seek(&mut file, SeekFrom::End(0)).unwrap(), 256);
    }

    #[test]
    fn virtual_positions_offset_the_underlying_stream() {
        let mut file = counting_file();
        let vs = VirtualSeeker::new(100, 16);
        assert_eq!(vs.start_offset(), 100);
        assert_eq!(vs.end_from_end(), 16);

        assert_eq!(vs.seek(&mut file, SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(file.position(), 100);
        assert_eq!(vs.tell(&mut file).unwrap(), 0);

        let mut buf = [0u8; 4];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [100, 101, 102, 103]);
        assert_eq!(vs.tell(&mut file).unwrap(), 4);

        // The virtual end sits end_from_end bytes before the real one.
        assert_eq!(vs.seek(&mut file, SeekFrom::End(0)).unwrap(), 140);
        assert_eq!(file.position(), 240);
        assert_eq!(vs.seek(&mut file, SeekFrom::End(-4)).unwrap(), 136);
        file.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [236, 237, 238, 239]);
    }

    #[test]
    fn current_deltas_pass_through() {
        let mut file = counting_file();
        let vs = VirtualSeeker::new(100, 16);

        vs.seek(&mut file, SeekFrom::Start(8)).unwrap();
        assert_eq!(vs.seek(&mut file, SeekFrom::Current(4)).unwrap(), 12);
        assert_eq!(vs.seek(&mut file, SeekFrom::Current(-8)).unwrap(), 4);
    }

    #[test]
    fn seeking_before_the_region_is_an_error() {
        let mut file = counting_file();
        let vs = VirtualSeeker::new(100, 0);

        assert!(vs.seek(&mut file, SeekFrom::End(-200)).is_err());
        file.set_position(50);
        assert!(vs.tell(&mut file).is_err());
    }
}
