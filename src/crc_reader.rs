//! A read adapter that checks a CRC-32 at end-of-stream.

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

/// Hashes everything read through it and reports a mismatch against the
/// expected CRC-32 as an error on the read that reaches end-of-stream.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    expected: u32,
    checked: bool,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, expected: u32) -> Self {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            expected,
            checked: false,
        }
    }

}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let count = self.inner.read(buf)?;
        if count > 0 {
            self.hasher.update(&buf[..count]);
        } else if !self.checked {
            self.checked = true;
            if self.hasher.clone().finalize() != self.expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "CRC-32 mismatch",
                ));
            }
        }
        Ok(count)
    }
}
