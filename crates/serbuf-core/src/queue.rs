//! Unbounded FIFO byte queue built from fixed-capacity chunks.
//!
//! The queue never bounds its total size. Whoever pushes into it relies on the
//! consumer draining fast enough to keep memory in check.

use std::collections::VecDeque;

/// Default capacity of a single chunk, in bytes.
pub const CHUNK_CAPACITY: usize = 4096;

struct Chunk {
    data: Box<[u8]>,
    read: usize,
    write: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.write == self.data.len()
    }

    fn is_exhausted(&self) -> bool {
        self.read == self.write
    }

    /// Copies as much of `src` as fits behind the write cursor.
    fn fill(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len() - self.write);
        self.data[self.write..self.write + n].copy_from_slice(&src[..n]);
        self.write += n;
        n
    }

    /// Copies unread bytes into `dst`, never past the write cursor.
    fn take(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.write - self.read);
        dst[..n].copy_from_slice(&self.data[self.read..self.read + n]);
        self.read += n;
        n
    }

    fn rewind(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}

/// FIFO of bytes stored in a chain of fixed-size chunks.
///
/// There is always at least one chunk. The head is consumed first and the
/// tail receives new bytes; a running counter keeps [`ByteQueue::len`] O(1).
pub struct ByteQueue {
    chunks: VecDeque<Chunk>,
    chunk_capacity: usize,
    len: usize,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::with_chunk_capacity(CHUNK_CAPACITY)
    }

    /// Creates a queue whose chunks hold `capacity` bytes each (at least one).
    pub fn with_chunk_capacity(capacity: usize) -> Self {
        let chunk_capacity = capacity.max(1);
        let mut chunks = VecDeque::new();
        chunks.push_back(Chunk::new(chunk_capacity));
        Self { chunks, chunk_capacity, len: 0 }
    }

    /// Appends every byte of `bytes`, linking new tail chunks as needed.
    pub fn push(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            let needs_chunk = self.chunks.back().map_or(true, Chunk::is_full);
            if needs_chunk {
                self.chunks.push_back(Chunk::new(self.chunk_capacity));
            }
            if let Some(tail) = self.chunks.back_mut() {
                let n = tail.fill(rest);
                rest = &rest[n..];
                self.len += n;
            }
        }
    }

    /// Removes up to `max_bytes` from the head. Returns an empty vector when
    /// nothing is queued.
    pub fn pop(&mut self, max_bytes: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_bytes.min(self.len)];
        let n = self.pop_into(&mut out);
        out.truncate(n);
        out
    }

    /// Fills `buf` from the head and returns how many bytes were copied.
    pub fn pop_into(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let sole = self.chunks.len() == 1;
            let Some(head) = self.chunks.front_mut() else {
                break;
            };
            copied += head.take(&mut buf[copied..]);
            if !head.is_exhausted() {
                break;
            }
            if sole {
                head.rewind();
                break;
            }
            self.chunks.pop_front();
        }
        self.len -= copied;
        copied
    }

    /// Total bytes currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops all queued bytes, keeping a single empty chunk.
    pub fn clear(&mut self) {
        self.chunks.truncate(1);
        if let Some(head) = self.chunks.front_mut() {
            head.rewind();
        }
        self.len = 0;
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteQueue")
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .field("chunk_capacity", &self.chunk_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_pop_empty_returns_nothing() {
        let mut q = ByteQueue::new();
        assert!(q.pop(16).is_empty());
        assert_eq!(q.len(), 0);
        assert_eq!(q.chunk_count(), 1);
    }

    #[test]
    fn test_fifo_within_one_chunk() {
        let mut q = ByteQueue::new();
        q.push(b"hello ");
        q.push(b"world");
        assert_eq!(q.pop(3), b"hel");
        assert_eq!(q.pop(100), b"lo world");
        assert!(q.is_empty());
    }

    #[test]
    fn test_size_tracks_push_and_pop() {
        let mut q = ByteQueue::new();
        q.push(&pattern(10_000));
        assert_eq!(q.len(), 10_000);
        q.pop(1234);
        assert_eq!(q.len(), 10_000 - 1234);
        q.pop(20_000);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_push_spans_two_chunks() {
        let data = pattern(5000);
        let mut q = ByteQueue::new();
        q.push(&data);
        assert_eq!(q.chunk_count(), 2);
        assert_eq!(q.len(), 5000);

        let out = q.pop(5000);
        assert_eq!(out, data);
        assert_eq!(q.chunk_count(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_exact_fill_then_drain_releases_head() {
        let mut q = ByteQueue::with_chunk_capacity(4);
        q.push(b"abcd");
        assert_eq!(q.chunk_count(), 1);
        q.push(b"e");
        assert_eq!(q.chunk_count(), 2);

        assert_eq!(q.pop(4), b"abcd");
        // the drained head is released once another chunk exists
        assert_eq!(q.chunk_count(), 1);
        assert_eq!(q.pop(4), b"e");
    }

    #[test]
    fn test_sole_chunk_rewinds_when_emptied() {
        let mut q = ByteQueue::with_chunk_capacity(8);
        q.push(b"123456");
        assert_eq!(q.pop(6), b"123456");
        q.push(b"abcdefgh");
        // rewound cursors let a full chunk's worth fit without growing
        assert_eq!(q.chunk_count(), 1);
        assert_eq!(q.pop(8), b"abcdefgh");
    }

    #[test]
    fn test_mixed_sizes_preserve_order() {
        let data = pattern(3 * CHUNK_CAPACITY + 77);
        let mut q = ByteQueue::new();
        let mut offset = 0;
        for step in [1, 4095, 2, 4096, 300, 4097] {
            let end = (offset + step).min(data.len());
            q.push(&data[offset..end]);
            offset = end;
        }
        q.push(&data[offset..]);

        let mut out = Vec::new();
        for step in [7, 4096, 1, 9000].iter().cycle() {
            let chunk = q.pop(*step);
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn test_pop_into_partial_buffer() {
        let mut q = ByteQueue::with_chunk_capacity(3);
        q.push(b"abcdefg");
        let mut buf = [0u8; 5];
        assert_eq!(q.pop_into(&mut buf), 5);
        assert_eq!(&buf, b"abcde");
        assert_eq!(q.pop_into(&mut buf), 2);
        assert_eq!(&buf[..2], b"fg");
        assert_eq!(q.pop_into(&mut buf), 0);
    }

    #[test]
    fn test_clear_keeps_one_chunk() {
        let mut q = ByteQueue::with_chunk_capacity(2);
        q.push(b"abcdef");
        assert_eq!(q.chunk_count(), 3);
        q.clear();
        assert_eq!(q.chunk_count(), 1);
        assert!(q.is_empty());
        q.push(b"xy");
        assert_eq!(q.pop(2), b"xy");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut q = ByteQueue::with_chunk_capacity(0);
        assert_eq!(q.chunk_capacity(), 1);
        q.push(b"abc");
        assert_eq!(q.pop(3), b"abc");
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        const TOTAL: usize = 200_000;
        let data = Arc::new(pattern(TOTAL));
        let queue = Arc::new(Mutex::new(ByteQueue::with_chunk_capacity(512)));

        let producer = {
            let data = data.clone();
            let queue = queue.clone();
            thread::spawn(move || {
                let mut offset = 0;
                let mut step = 1;
                while offset < TOTAL {
                    let end = (offset + step).min(TOTAL);
                    queue.lock().push(&data[offset..end]);
                    offset = end;
                    step = step % 1500 + 37;
                }
            })
        };

        let mut received = Vec::with_capacity(TOTAL);
        let mut want = 1;
        while received.len() < TOTAL {
            let chunk = queue.lock().pop(want);
            if chunk.is_empty() {
                thread::yield_now();
            }
            received.extend_from_slice(&chunk);
            want = want % 2000 + 13;
        }

        producer.join().unwrap();
        assert_eq!(received.len(), TOTAL);
        assert_eq!(&received[..], &data[..]);
        assert!(queue.lock().is_empty());
    }
}
