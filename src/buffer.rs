use std::io::{self, IoSliceMut, Read, Write};

/// A growable byte buffer with independent read/write cursors, the
/// Rust-native analogue of the original project's `Buffer` (readPos_/
/// writePos_ over a `vector<char>`). The readable region is
/// `[read_pos, write_pos)`; the writable region is `[write_pos, len)`; the
/// region before `read_pos` is reclaimable ("prependable") space.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

/// One read burst is capped here before the buffer itself must grow; this
/// mirrors the original's stack-resident 64 KiB spill segment used as the
/// second `readv` iovec.
const SPILL_LEN: usize = 65535;

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(initial: usize) -> Self {
        Self {
            data: vec![0u8; initial],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn readable(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn prependable(&self) -> usize {
        self.read_pos
    }

    pub fn peek(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Advances the read cursor by `n`. Panics if `n` exceeds the readable
    /// region — callers are expected to bound `n` by `readable()` first.
    pub fn retrieve(&mut self, n: usize) {
        assert!(n <= self.readable(), "retrieve beyond readable region");
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    /// Retrieves everything up to (and including) `end`, where `end` is a
    /// pointer previously obtained from `peek()` or a slice of it.
    pub fn retrieve_until(&mut self, end: *const u8) {
        let start = self.peek().as_ptr();
        let offset = (end as usize).saturating_sub(start as usize);
        self.retrieve(offset.min(self.readable()));
    }

    pub fn retrieve_all(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
        self.read_pos = 0;
        self.write_pos = 0;
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        let end = self.write_pos + bytes.len();
        self.data[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
    }

    /// Guarantees at least `len` writable bytes, either by shifting the
    /// readable region down to reclaim prependable space or by growing the
    /// backing vector.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable() >= len {
            return;
        }
        if self.writable() + self.prependable() >= len {
            let readable = self.readable();
            self.data.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        } else {
            self.data.resize(self.write_pos + len + 1, 0);
        }
    }

    /// Scatter-reads from `fd` into the writable tail plus a stack-resident
    /// spill segment in a single `readv` call, then folds any spill bytes
    /// back into the buffer (growing it if necessary). Mirrors the
    /// original's two-iovec `ReadFd`.
    pub fn read_from_fd<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let writable = self.writable();
        let mut spill = [0u8; SPILL_LEN];

        let end = self.write_pos + writable;
        let (tail, _) = self.data[self.write_pos..end].split_at_mut(writable);
        let mut slices = [IoSliceMut::new(tail), IoSliceMut::new(&mut spill)];

        let n = reader.read_vectored(&mut slices)?;
        if n <= writable {
            self.write_pos += n;
        } else {
            self.write_pos += writable;
            let overflow = n - writable;
            self.append(&spill[..overflow]);
        }
        Ok(n)
    }

    /// Writes the readable region to `fd` in one call, advancing the read
    /// cursor by however much was actually accepted.
    pub fn write_to_fd<W: Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        let n = writer.write(self.peek())?;
        self.retrieve(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_preserves_bytes() {
        let mut buf = Buffer::new();
        buf.append(b"hello world");
        assert_eq!(buf.peek(), b"hello world");
        buf.retrieve(buf.readable());
        assert_eq!(buf.readable(), 0);
    }

    #[test]
    fn ensure_writable_shifts_before_growing() {
        let mut buf = Buffer::with_capacity(16);
        buf.append(b"0123456789"); // 10 bytes, 6 writable left
        buf.retrieve(8); // prependable=8, readable=2, writable=6
        buf.ensure_writable(10); // 6+8=14 >= 10, should shift not grow
        assert_eq!(buf.data.len(), 16);
        assert_eq!(buf.peek(), b"89");
    }

    #[test]
    fn ensure_writable_grows_when_shift_insufficient() {
        let mut buf = Buffer::with_capacity(4);
        buf.append(b"ab");
        buf.ensure_writable(100);
        assert!(buf.writable() >= 100);
        assert_eq!(buf.peek(), b"ab");
    }

    #[test]
    fn read_from_fd_grows_buffer_on_large_burst() {
        let mut buf = Buffer::with_capacity(8);
        let payload = vec![7u8; 70_000]; // exceeds writable + SPILL_LEN headroom combo
        let mut cursor = Cursor::new(payload.clone());
        let n = buf.read_from_fd(&mut cursor).unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(buf.readable(), payload.len());
        assert_eq!(buf.peek(), payload.as_slice());
    }
}
