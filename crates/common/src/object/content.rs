//! Chunked file content
//!
//! File bytes are held as fixed-size chunks. Every chunk but the last is
//! exactly `chunk_size` bytes and the last holds between one byte and a
//! full chunk, so a file of length `n` always has `ceil(n / chunk_size)`
//! chunks. Mutations only replace the chunks they touch.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    chunk_size: usize,
    len: u64,
    chunks: Vec<Bytes>,
}

/// What a truncate did to the chunk list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncateOutcome {
    /// Index of a chunk whose tail was cut or zero-extended
    pub rewritten: Option<usize>,
    /// Whole chunks dropped off the end
    pub dropped: usize,
    /// Zero-filled chunks appended
    pub padded: usize,
}

impl FileContent {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            len: 0,
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Read up to `len` bytes at `offset`; short at end of file, empty past it
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        if offset >= self.len || len == 0 {
            return Vec::new();
        }
        let end = offset.saturating_add(len as u64).min(self.len);
        let mut out = Vec::with_capacity((end - offset) as usize);
        let cs = self.chunk_size as u64;
        let mut pos = offset;
        while pos < end {
            let index = (pos / cs) as usize;
            let within = (pos % cs) as usize;
            let chunk = &self.chunks[index];
            let take = ((end - pos) as usize).min(chunk.len() - within);
            out.extend_from_slice(&chunk[within..within + take]);
            pos += take as u64;
        }
        out
    }

    pub fn read_all(&self) -> Vec<u8> {
        self.read(0, self.len as usize)
    }

    /// Write `data` at `offset`, zero-filling any gap past the current end.
    /// Returns the indices of chunks that were replaced or added.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<Vec<usize>, StoreError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| StoreError::invalid("write past maximum file size"))?;
        let mut touched = Vec::new();
        if offset > self.len {
            let outcome = self.truncate(offset);
            touched.extend(outcome.rewritten);
            touched.extend(self.chunks.len() - outcome.padded..self.chunks.len());
        }

        let cs = self.chunk_size as u64;
        let mut pos = offset;
        let mut consumed = 0usize;
        while pos < end {
            let index = (pos / cs) as usize;
            let within = (pos % cs) as usize;
            let take = ((end - pos) as usize).min(self.chunk_size - within);
            let piece = &data[consumed..consumed + take];

            let mut chunk = match self.chunks.get(index) {
                Some(existing) => BytesMut::from(&existing[..]),
                None => BytesMut::with_capacity(within + take),
            };
            if chunk.len() < within + take {
                chunk.resize(within + take, 0);
            }
            chunk[within..within + take].copy_from_slice(piece);

            if index < self.chunks.len() {
                self.chunks[index] = chunk.freeze();
            } else {
                self.chunks.push(chunk.freeze());
            }
            if touched.last() != Some(&index) {
                touched.push(index);
            }
            pos += take as u64;
            consumed += take;
        }
        self.len = self.len.max(end);
        touched.sort_unstable();
        touched.dedup();
        Ok(touched)
    }

    pub fn append(&mut self, data: &[u8]) -> Result<Vec<usize>, StoreError> {
        self.write(self.len, data)
    }

    /// Cut or extend the file to exactly `new_len` bytes
    ///
    /// Shrinking drops whole chunks past the new end and slices only the
    /// chunk the new end lands in. Growing zero-extends the last chunk and
    /// appends zero-filled chunks.
    pub fn truncate(&mut self, new_len: u64) -> TruncateOutcome {
        let mut outcome = TruncateOutcome::default();
        if new_len == self.len {
            return outcome;
        }
        let cs = self.chunk_size as u64;

        if new_len < self.len {
            let keep = new_len.div_ceil(cs) as usize;
            outcome.dropped = self.chunks.len() - keep;
            self.chunks.truncate(keep);
            let tail = (new_len % cs) as usize;
            if tail != 0 {
                if let Some(last) = self.chunks.last_mut() {
                    if last.len() != tail {
                        *last = last.slice(..tail);
                        outcome.rewritten = Some(keep - 1);
                    }
                }
            }
        } else {
            let mut remaining = new_len - self.len;
            if let Some(last) = self.chunks.last_mut() {
                let room = (self.chunk_size - last.len()) as u64;
                if room > 0 {
                    let grow = room.min(remaining) as usize;
                    let mut extended = BytesMut::from(&last[..]);
                    extended.resize(last.len() + grow, 0);
                    *last = extended.freeze();
                    outcome.rewritten = Some(self.chunks.len() - 1);
                    remaining -= grow as u64;
                }
            }
            while remaining > 0 {
                let size = remaining.min(cs) as usize;
                self.chunks.push(Bytes::from(vec![0u8; size]));
                outcome.padded += 1;
                remaining -= size as u64;
            }
        }
        self.len = new_len;
        outcome
    }

    /// Content digest for diagnostics
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for chunk in &self.chunks {
            hasher.update(chunk);
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn assert_well_formed(content: &FileContent) {
        let cs = content.chunk_size();
        let chunks = content.chunks();
        assert_eq!(
            chunks.len() as u64,
            content.len().div_ceil(cs as u64),
            "chunk count"
        );
        for (i, chunk) in chunks.iter().enumerate() {
            if i + 1 < chunks.len() {
                assert_eq!(chunk.len(), cs);
            } else {
                assert!(!chunk.is_empty() && chunk.len() <= cs);
            }
        }
    }

    #[test]
    fn test_multi_chunk_round_trip() {
        let mut content = FileContent::new(16);
        let data = pattern(100);
        content.write(0, &data).unwrap();
        assert_eq!(content.read_all(), data);
        assert_eq!(content.chunks().len(), 7);
        assert_well_formed(&content);
        assert_eq!(content.read(10, 20), data[10..30].to_vec());
        assert_eq!(content.read(95, 50), data[95..].to_vec());
        assert!(content.read(100, 10).is_empty());
    }

    #[test]
    fn test_appends_straddle_boundaries() {
        let mut content = FileContent::new(8);
        let mut expected = Vec::new();
        for step in [3usize, 7, 1, 8, 13, 2] {
            let piece = pattern(step);
            content.append(&piece).unwrap();
            expected.extend_from_slice(&piece);
            assert_eq!(content.read_all(), expected);
            assert_well_formed(&content);
        }
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let mut content = FileContent::new(8);
        content.write(0, b"abc").unwrap();
        content.write(20, b"xy").unwrap();
        let all = content.read_all();
        assert_eq!(all.len(), 22);
        assert_eq!(&all[..3], b"abc");
        assert!(all[3..20].iter().all(|b| *b == 0));
        assert_eq!(&all[20..], b"xy");
        assert_well_formed(&content);
    }

    #[test]
    fn test_overwrite_touches_only_its_chunks() {
        let mut content = FileContent::new(8);
        content.write(0, &pattern(32)).unwrap();
        let before = content.chunks().to_vec();
        let touched = content.write(9, b"zz").unwrap();
        assert_eq!(touched, vec![1]);
        assert_eq!(content.chunks()[0], before[0]);
        assert_eq!(content.chunks()[2], before[2]);
        assert_eq!(content.chunks()[3], before[3]);
    }

    #[test]
    fn test_truncate_around_chunk_boundary() {
        let cs = 16usize;
        let data = pattern(cs * 4);
        for new_len in [cs * 2, cs * 2 - 1, cs * 2 + 1] {
            let mut content = FileContent::new(cs);
            content.write(0, &data).unwrap();
            content.truncate(new_len as u64);
            assert_eq!(content.len(), new_len as u64);
            assert_eq!(content.read_all(), data[..new_len].to_vec());
            assert_well_formed(&content);
        }
    }

    #[test]
    fn test_truncate_outcomes() {
        let cs = 16usize;
        let mut content = FileContent::new(cs);
        content.write(0, &pattern(cs * 4)).unwrap();

        // exact boundary drops whole chunks and rewrites nothing
        let outcome = content.truncate((cs * 3) as u64);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.rewritten, None);

        // inside a chunk rewrites only that chunk's tail
        let untouched = content.chunks()[0].clone();
        let outcome = content.truncate((cs + 5) as u64);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.rewritten, Some(1));
        assert_eq!(content.chunks()[0], untouched);

        // extending pads the tail then adds zero chunks
        let outcome = content.truncate((cs * 3 + 2) as u64);
        assert_eq!(outcome.rewritten, Some(1));
        assert_eq!(outcome.padded, 2);
        let all = content.read_all();
        assert_eq!(all[..cs + 5], pattern(cs * 4)[..cs + 5]);
        assert!(all[cs + 5..].iter().all(|b| *b == 0));
        assert_well_formed(&content);
    }

    #[test]
    fn test_truncate_to_zero() {
        let mut content = FileContent::new(8);
        content.write(0, &pattern(30)).unwrap();
        content.truncate(0);
        assert!(content.is_empty());
        assert!(content.read_all().is_empty());
        assert!(content.chunks().is_empty());
    }
}
