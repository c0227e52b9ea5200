//! [`IoBlock`]: one reusable large buffer in a shard's [`crate::IoQueue`] ring.

/// A fixed-capacity byte buffer plus `data_size` (bytes currently filled) and
/// `error_end` (byte offset up to which the buffer contains at least one
/// known-bad region).
///
/// Reusable within its owning [`crate::IoQueue`]: a block is never freed while
/// its queue is alive, only [`IoBlock::clear`]ed and handed back.
#[derive(Debug)]
pub struct IoBlock {
    buf: Vec<u8>,
    data_size: usize,
    error_end: usize,
}

impl IoBlock {
    /// Allocates a block with `capacity` bytes, rounded up to a 4 KiB
    /// page-aligned boundary.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        const PAGE: usize = 4096;
        let padded = capacity.div_ceil(PAGE) * PAGE;
        Self {
            buf: vec![0u8; padded],
            data_size: 0,
            error_end: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    #[must_use]
    pub fn error_end(&self) -> usize {
        self.error_end
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error_end > 0
    }

    /// The filled portion of the buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.data_size]
    }

    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.data_size]
    }

    /// The unfilled tail of the buffer, available for the producer to write into.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let size = self.data_size;
        &mut self.buf[size..]
    }

    /// Appends `bytes` to the filled portion; panics if it would overflow
    /// capacity (a logic error upstream — callers size appends against
    /// `spare_mut().len()` first).
    pub fn append(&mut self, bytes: &[u8]) {
        let start = self.data_size;
        let end = start + bytes.len();
        assert!(end <= self.buf.len(), "append overflows ioblock capacity");
        self.buf[start..end].copy_from_slice(bytes);
        self.data_size = end;
    }

    /// Sets the fill level directly, e.g. after writing into [`Self::spare_mut`]
    /// out-of-band, or to align a freshly reserved block to a seek offset.
    pub fn set_data_size(&mut self, size: usize) {
        assert!(size <= self.buf.len(), "data_size exceeds ioblock capacity");
        self.data_size = size;
    }

    /// Marks `[from, end)` as containing at least one bad region. `error_end`
    /// only ever grows, since a later, larger error range must still cover an
    /// earlier, smaller one once the stripe it belongs to is regenerated in
    /// reverse order.
    pub fn mark_error(&mut self, end: usize) {
        if end > self.error_end {
            self.error_end = end;
        }
    }

    /// Resets this block to an empty, error-free state for reuse.
    pub fn clear(&mut self) {
        self.data_size = 0;
        self.error_end = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_page_aligned() {
        let b = IoBlock::new(1);
        assert_eq!(b.capacity(), 4096);
        let b = IoBlock::new(4096);
        assert_eq!(b.capacity(), 4096);
        let b = IoBlock::new(4097);
        assert_eq!(b.capacity(), 8192);
    }

    #[test]
    fn append_advances_data_size() {
        let mut b = IoBlock::new(16);
        b.append(&[1, 2, 3]);
        assert_eq!(b.data(), &[1, 2, 3]);
        b.append(&[4, 5]);
        assert_eq!(b.data(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn clear_resets_size_and_error() {
        let mut b = IoBlock::new(16);
        b.append(&[1, 2, 3]);
        b.mark_error(2);
        b.clear();
        assert_eq!(b.data_size(), 0);
        assert_eq!(b.error_end(), 0);
        assert!(!b.has_error());
    }

    #[test]
    fn mark_error_only_grows() {
        let mut b = IoBlock::new(16);
        b.mark_error(5);
        b.mark_error(2);
        assert_eq!(b.error_end(), 5);
        b.mark_error(9);
        assert_eq!(b.error_end(), 9);
    }
}
