//! Bucketed byte-buffer pool to dampen allocation pressure on hot
//! translation paths.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default bucket capacities, ascending.
pub const DEFAULT_BUCKETS: [usize; 8] = [
    64, 256, 1024, 4096, 16384, 65536, 262144, 1048576,
];

/// Reusable byte buffers grouped into fixed-capacity buckets.
///
/// `get_buffer` hands out a zero-length buffer whose capacity is the
/// smallest bucket that fits the request; `put_buffer` zeroes a returned
/// buffer and files it under its exact-capacity bucket. Buffers larger than
/// the top bucket are allocated fresh and discarded on return.
pub struct BufferPool {
    buckets: Vec<usize>,
    free: Vec<Mutex<Vec<Vec<u8>>>>,
    allocations: AtomicU64,
    reuses: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolStats {
    pub allocations: u64,
    pub reuses: u64,
    pub returned: u64,
    pub discarded: u64,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS.to_vec())
    }

    /// Build a pool with custom bucket capacities. Sizes are sorted and
    /// deduplicated; zero-sized buckets are dropped.
    pub fn with_buckets(mut buckets: Vec<usize>) -> Self {
        buckets.retain(|&b| b > 0);
        buckets.sort_unstable();
        buckets.dedup();
        let free = buckets.iter().map(|_| Mutex::new(Vec::new())).collect();
        Self {
            buckets,
            free,
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Returns a zero-length buffer with capacity >= `size`, reusing a
    /// pooled one when the smallest suitable bucket has a free entry.
    pub fn get_buffer(&self, size: usize) -> Vec<u8> {
        match self.buckets.iter().position(|&b| b >= size) {
            Some(idx) => {
                if let Ok(mut list) = self.free[idx].lock()
                    && let Some(mut buf) = list.pop()
                {
                    buf.clear();
                    self.reuses.fetch_add(1, Ordering::Relaxed);
                    return buf;
                }
                self.allocations.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.buckets[idx])
            }
            None => {
                // Larger than every bucket: allocate exactly, never pooled.
                self.allocations.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(size)
            }
        }
    }

    /// Return a buffer to the pool. Contents are zeroed before reuse.
    /// Buffers whose capacity does not match a bucket are discarded.
    pub fn put_buffer(&self, mut buf: Vec<u8>) {
        match self.buckets.iter().position(|&b| b == buf.capacity()) {
            Some(idx) => {
                buf.iter_mut().for_each(|b| *b = 0);
                buf.clear();
                if let Ok(mut list) = self.free[idx].lock() {
                    list.push(buf);
                    self.returned.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn bucket_sizes(&self) -> &[usize] {
        &self.buckets
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Grow-on-demand append target backed by the pool. Growing requests a
/// larger bucket and files the old buffer back.
pub struct BufferWriter<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl<'a> BufferWriter<'a> {
    pub fn new(pool: &'a BufferPool, initial_size: usize) -> Self {
        Self {
            pool,
            buf: pool.get_buffer(initial_size),
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        let needed = self.buf.len() + data.len();
        if needed > self.buf.capacity() {
            let target = needed.max(self.buf.capacity() * 2);
            let mut bigger = self.pool.get_buffer(target);
            bigger.extend_from_slice(&self.buf);
            let old = std::mem::replace(&mut self.buf, bigger);
            self.pool.put_buffer(old);
        }
        self.buf.extend_from_slice(data);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Detach the buffer from the pool. The caller owns the allocation.
    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Hand the buffer back to the pool, dropping the written contents.
    pub fn release(mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.put_buffer(buf);
    }
}

impl std::io::Write for BufferWriter<'_> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        BufferWriter::write(self, data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
