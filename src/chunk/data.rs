//! The Chunk type - one delivery of source bytes.

use std::fmt;
use std::ops::{Deref, DerefMut, Range};

use bytes::{Bytes, BytesMut};

/// A run of source bytes handed to the processing callback.
///
/// The chunk borrows a buffer from the run's pool. The callback gets
/// exclusive access for the duration of the call; afterwards the buffer is
/// recycled, so anything that must outlive the call has to be copied out,
/// e.g. with [`Chunk::to_bytes`].
///
/// # Example
///
/// ```
/// use chunkfeed::Chunk;
///
/// let chunk = Chunk::new(&b"hello\n"[..]);
/// assert_eq!(chunk.len(), 6);
/// assert_eq!(&chunk[..], b"hello\n");
/// ```
pub struct Chunk {
    data: BytesMut,
    sequence: u64,
    offset: u64,
}

impl Chunk {
    /// Creates a standalone chunk at sequence 0, offset 0.
    pub fn new(data: &[u8]) -> Self {
        Self::from_buffer(BytesMut::from(data), 0, 0)
    }

    pub(crate) fn from_buffer(data: BytesMut, sequence: u64, offset: u64) -> Self {
        Self {
            data,
            sequence,
            offset,
        }
    }

    /// Returns the 0-based dispatch index of this chunk.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the source offset of the first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the source offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// Returns the source range covered by this chunk.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.end()
    }

    /// Returns the length of the chunk data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the chunk has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the last byte is `delimiter`.
    pub fn ends_with(&self, delimiter: u8) -> bool {
        self.data.last() == Some(&delimiter)
    }

    /// Returns the chunk data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the chunk data, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copies the data into an owned [`Bytes`] that outlives the chunk.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    pub(crate) fn into_buffer(self) -> BytesMut {
        self.data
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Chunk {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("sequence", &self.sequence)
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk(#{}, {} bytes @ {})",
            self.sequence,
            self.len(),
            self.offset
        )
    }
}
