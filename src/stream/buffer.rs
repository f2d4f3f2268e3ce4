/// Default size hosts use for a stream's read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 65536;

/// The caller-owned scratch span every read cycle fills.
///
/// The span is borrowed for the whole lifetime of the reactor and is handed out
/// as-is on every read-readiness cycle: it is never resized, reallocated or
/// copied, so each cycle overwrites the bytes of the previous one.
pub(crate) struct ReadBuffer<'a> {
    span: &'a mut [u8],
    filled: usize,
}

impl<'a> ReadBuffer<'a> {
    pub(crate) fn new(span: &'a mut [u8]) -> Self {
        Self { span, filled: 0 }
    }

    /// Allocation step of a read cycle: always the same span.
    pub(crate) fn span(&mut self) -> &mut [u8] {
        self.filled = 0;
        &mut *self.span
    }

    pub(crate) fn set_filled(&mut self, filled: usize) {
        self.filled = filled.min(self.span.len());
    }

    /// Bytes delivered by the most recent successful read.
    pub(crate) fn filled(&self) -> &[u8] {
        &self.span[..self.filled]
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &*self.span
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.span.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_identity_is_stable_across_cycles() {
        let mut storage = [0u8; 8];
        let mut buffer = ReadBuffer::new(&mut storage);

        let first = buffer.span().as_ptr();
        buffer.set_filled(3);
        let second = buffer.span().as_ptr();

        assert_eq!(first, second);
        assert_eq!(buffer.as_slice().len(), 8);
    }

    #[test]
    fn filled_tracks_the_last_cycle() {
        let mut storage = [0u8; 4];
        let mut buffer = ReadBuffer::new(&mut storage);

        buffer.span()[..2].copy_from_slice(b"ok");
        buffer.set_filled(2);
        assert_eq!(buffer.filled(), b"ok");

        // A new cycle starts empty until the read reports its count.
        let _ = buffer.span();
        assert!(buffer.filled().is_empty());

        buffer.set_filled(100);
        assert_eq!(buffer.filled().len(), 4);
    }

    #[test]
    fn empty_span_is_reported() {
        let mut storage = [0u8; 0];
        let buffer = ReadBuffer::new(&mut storage);

        assert!(buffer.is_empty());
    }
}
