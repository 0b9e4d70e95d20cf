//! Shared buffer pool for chunk memory reuse.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam_queue::SegQueue;

/// New buffers get this multiple of `buffer_size` as capacity, so that
/// delimiter extension usually fits without reallocating.
const SPARE_CAPACITY_FACTOR: usize = 2;

/// Released buffers that grew beyond this multiple of `buffer_size` are
/// dropped instead of recycled.
const MAX_RETAINED_FACTOR: usize = 4;

/// A snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated, including seeded ones.
    pub allocated: u64,
    /// Acquisitions served from the free list.
    pub reused: u64,
    /// Released buffers dropped because they grew too large.
    pub discarded: u64,
    /// Buffers currently sitting in the free list.
    pub idle: usize,
}

/// A free list of byte buffers of one fixed length.
///
/// One reader acquires while any number of workers release concurrently.
/// Ownership moves with the `BytesMut` value itself, so a buffer cannot be
/// handed out again while a chunk still holds it.
#[derive(Debug)]
pub struct BufferPool {
    free: SegQueue<BytesMut>,
    buffer_size: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl BufferPool {
    /// Creates an empty pool handing out buffers of `buffer_size` bytes.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            free: SegQueue::new(),
            buffer_size,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Creates a pool pre-filled with `seed` buffers.
    pub fn with_seed(buffer_size: usize, seed: usize) -> Self {
        let pool = Self::new(buffer_size);
        for _ in 0..seed {
            pool.free.push(pool.allocate());
        }
        log::trace!("seeded pool with {} buffers of {} bytes", seed, buffer_size);
        pool
    }

    /// Takes a buffer of exactly `buffer_size` bytes.
    ///
    /// The contents are whatever a previous chunk left behind.
    pub fn acquire(&self) -> BytesMut {
        match self.free.pop() {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => self.allocate(),
        }
    }

    /// Returns a buffer to the pool.
    pub fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.buffer_size.saturating_mul(MAX_RETAINED_FACTOR) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            log::trace!("dropping oversized buffer ({} bytes)", buf.capacity());
            return;
        }

        // Only the tail of a short buffer is zeroed.
        buf.resize(self.buffer_size, 0);
        self.free.push(buf);
    }

    /// Returns the length of the buffers this pool hands out.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns a snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.free.len(),
        }
    }

    fn allocate(&self) -> BytesMut {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        let mut buf =
            BytesMut::with_capacity(self.buffer_size.saturating_mul(SPARE_CAPACITY_FACTOR));
        buf.resize(self.buffer_size, 0);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_allocates_when_empty() {
        let pool = BufferPool::new(16);
        let buf = pool.acquire();
        assert_eq!(buf.len(), 16);
        assert!(buf.capacity() >= 32);
        assert_eq!(pool.stats().allocated, 1);
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn test_seed_prefills() {
        let pool = BufferPool::with_seed(8, 5);
        let stats = pool.stats();
        assert_eq!(stats.allocated, 5);
        assert_eq!(stats.idle, 5);

        let _buf = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.allocated, 5);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.idle, 4);
    }

    #[test]
    fn test_release_restores_length() {
        let pool = BufferPool::new(8);

        let mut short = pool.acquire();
        short.truncate(3);
        pool.release(short);
        assert_eq!(pool.acquire().len(), 8);

        let mut long = pool.acquire();
        long.extend_from_slice(b"extra");
        pool.release(long);
        assert_eq!(pool.acquire().len(), 8);
    }

    #[test]
    fn test_release_keeps_capacity() {
        let pool = BufferPool::new(64);
        let buf = pool.acquire();
        let capacity = buf.capacity();
        pool.release(buf);

        let buf = pool.acquire();
        assert_eq!(buf.capacity(), capacity);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn test_oversized_buffer_is_discarded() {
        let pool = BufferPool::new(4);
        let mut buf = pool.acquire();
        buf.extend_from_slice(&[0u8; 64]);
        pool.release(buf);

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn test_concurrent_release() {
        let pool = BufferPool::new(32);
        let bufs: Vec<_> = (0..64).map(|_| pool.acquire()).collect();

        std::thread::scope(|s| {
            for chunk in bufs.chunks(16) {
                let chunk = chunk.to_vec();
                let pool = &pool;
                s.spawn(move || {
                    for buf in chunk {
                        pool.release(buf);
                    }
                });
            }
        });

        assert_eq!(pool.stats().idle, 64);
    }
}
