//! Chunk assembly from a sequential byte source.
//!
//! [`ChunkReader`] owns the source for the whole run and is only ever driven
//! from the ingestion thread. Each chunk is one bounded read of up to
//! `buffer_size` bytes, then, in delimiter mode, every byte up to and
//! including the next delimiter, even when the bounded read already ended on
//! one. A source without delimiters therefore ends up as a single chunk.

use std::io::{self, BufRead, BufReader, Read};

use bytes::BytesMut;

use crate::chunk::Chunk;

/// Reads delimiter-aligned (or fixed-size) chunks into caller-supplied buffers.
pub(crate) struct ChunkReader<R> {
    inner: BufReader<R>,
    delimiter: u8,
    no_delimiter: bool,
    sequence: u64,
    offset: u64,
}

impl<R: Read> ChunkReader<R> {
    /// Creates a reader that aligns chunks on `delimiter`, unless
    /// `no_delimiter` is set.
    pub fn new(source: R, delimiter: u8, no_delimiter: bool) -> Self {
        Self {
            inner: BufReader::new(source),
            delimiter,
            no_delimiter,
            sequence: 0,
            offset: 0,
        }
    }

    /// Fills `buf` with the next chunk.
    ///
    /// `buf` must come from the pool, i.e. have its full read length. On
    /// return its length is the chunk length. Returns `false` when the source
    /// is exhausted and nothing was read.
    ///
    /// # Errors
    ///
    /// Any read error except [`io::ErrorKind::Interrupted`], which is retried.
    pub fn fill(&mut self, buf: &mut BytesMut) -> io::Result<bool> {
        let n = self.read_bounded(buf)?;
        if n == 0 {
            return Ok(false);
        }

        // A read that already ends on the delimiter is still extended by one
        // more record.
        if !self.no_delimiter {
            self.extend_to_delimiter(buf)?;
        }

        Ok(true)
    }

    /// Wraps a filled buffer into the next chunk in source order.
    pub fn seal(&mut self, buf: BytesMut) -> Chunk {
        let len = buf.len() as u64;
        let chunk = Chunk::from_buffer(buf, self.sequence, self.offset);
        self.sequence += 1;
        self.offset += len;
        chunk
    }

    /// Returns the number of chunks sealed so far.
    pub fn chunks(&self) -> u64 {
        self.sequence
    }

    /// Returns the number of bytes sealed into chunks so far.
    pub fn bytes(&self) -> u64 {
        self.offset
    }

    /// Reads until `buf` is full or the source is exhausted.
    fn read_bounded(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    buf.truncate(filled);
                    return Err(e);
                }
            }
        }

        buf.truncate(filled);
        Ok(filled)
    }

    /// Appends source bytes to `buf` up to and including the next delimiter.
    fn extend_to_delimiter(&mut self, buf: &mut BytesMut) -> io::Result<()> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            // End of source
            if available.is_empty() {
                return Ok(());
            }

            match available.iter().position(|&b| b == self.delimiter) {
                Some(i) => {
                    buf.extend_from_slice(&available[..=i]);
                    self.inner.consume(i + 1);
                    return Ok(());
                }
                None => {
                    let n = available.len();
                    buf.extend_from_slice(available);
                    self.inner.consume(n);
                }
            }
        }
    }
}
