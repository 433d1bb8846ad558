//! Positional reads against a shared file handle
//!
//! Lookups never move a shared cursor, so any number of them can run on the
//! same handle at once.

use std::fs::File;
use std::io::{self, Read};

/// `Read` adapter that starts at `pos` and reads through `read_at`
pub(crate) struct PositionalReader<'a> {
    file: &'a File,
    pos: u64,
}

impl<'a> PositionalReader<'a> {
    pub(crate) fn new(file: &'a File, pos: u64) -> Self {
        Self { file, pos }
    }
}

impl Read for PositionalReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_at(self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
