//! Ordered queue of immutable audio chunks with a read cursor.
//!
//! Producers append whole chunks and the playback side pulls arbitrary
//! byte ranges across chunk boundaries, so the queue presents itself as
//! one logical byte stream.

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

#[derive(Default)]
pub struct ChunkQueue {
    chunks: VecDeque<Bytes>,

    /// Index of the chunk under the cursor, counting every chunk enqueued
    /// since the last clear(). Consumed chunks are released but keep counting.
    chunk_index: usize,

    /// Read offset into the front chunk
    offset: usize,

    /// Total bytes handed out since the last clear()
    consumed: u64,

    /// Total bytes appended since the last clear()
    appended: u64,

    /// Set once no more chunks will arrive
    closed: bool,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the queue contents with a single complete payload and
    /// closes it, so draining the payload means the stream is exhausted.
    pub fn load(&mut self, payload: Bytes) {
        self.clear();
        self.appended = payload.len() as u64;
        self.chunks.push_back(payload);
        self.closed = true;
    }

    /// Appends a chunk at the tail of the queue.
    pub fn append(&mut self, chunk: Bytes) {
        self.appended += chunk.len() as u64;
        self.chunks.push_back(chunk);
    }

    /// Marks the stream complete. A closed queue accepts no more chunks.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Reopens a previously closed queue for incremental appends. The
    /// cursor is left untouched.
    pub fn reopen(&mut self) {
        self.closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads up to `count` bytes from the cursor position, advancing it.
    /// Returns fewer bytes when the materialized data runs out before
    /// `count`, which in streaming mode just means "nothing more yet".
    pub fn read(&mut self, count: usize) -> Bytes {
        if count == 0 {
            return Bytes::new();
        }

        // Single-chunk reads slice the refcounted chunk instead of copying
        if let Some(front) = self.chunks.front() {
            if count <= front.len() - self.offset {
                let out = front.slice(self.offset..self.offset + count);
                self.offset += count;
                self.consumed += count as u64;

                if self.offset == front.len() {
                    self.release_front();
                }

                return out;
            }
        }

        let mut out = BytesMut::with_capacity(count.min(self.pending() as usize));
        let mut remaining = count;

        while remaining > 0 {
            let front_len = match self.chunks.front() {
                Some(front) => front.len(),
                None => break,
            };

            let take = remaining.min(front_len - self.offset);

            if take > 0 {
                if let Some(front) = self.chunks.front() {
                    out.extend_from_slice(&front[self.offset..self.offset + take]);
                }
                self.offset += take;
                self.consumed += take as u64;
                remaining -= take;
            }

            if self.offset == front_len {
                self.release_front();
            }
        }

        out.freeze()
    }

    /// Drops the fully consumed front chunk while retaining the index count.
    fn release_front(&mut self) {
        self.chunks.pop_front();
        self.chunk_index += 1;
        self.offset = 0;
    }

    /// Bytes appended but not yet read.
    pub fn pending(&self) -> u64 {
        self.appended - self.consumed
    }

    pub fn is_drained(&self) -> bool {
        self.pending() == 0
    }

    /// True once the stream is closed and every appended byte was read.
    /// A transiently empty queue that is still open is not exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.closed && self.is_drained()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.chunk_index = 0;
        self.offset = 0;
        self.consumed = 0;
        self.appended = 0;
        self.closed = false;
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Number of chunks currently held (not counting released ones).
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
