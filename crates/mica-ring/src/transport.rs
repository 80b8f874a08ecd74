/// The execution-unit submission seam.
///
/// `submit_batch` hands ownership of one batch's words to the execution unit.
/// The call is non-blocking from the producer's perspective; any waiting for
/// batch completion is the transport's business (callers that need the *data*
/// synchronize by mapping the resource, which is a separate primitive).
///
/// Batches arrive in flush order and each batch's words are in emission
/// order; the transport must consume one batch fully before the next begins.
pub trait RingTransport {
    fn submit_batch(&mut self, words: &[u32]);
}

impl<T: RingTransport + ?Sized> RingTransport for &mut T {
    fn submit_batch(&mut self, words: &[u32]) {
        (**self).submit_batch(words);
    }
}

impl<T: RingTransport + ?Sized> RingTransport for Box<T> {
    fn submit_batch(&mut self, words: &[u32]) {
        (**self).submit_batch(words);
    }
}

/// A transport that records every submitted batch. Used by tests and tools
/// that want to inspect what would have reached the hardware.
#[derive(Debug, Default, Clone)]
pub struct VecTransport {
    batches: Vec<Vec<u32>>,
}

impl VecTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[Vec<u32>] {
        &self.batches
    }

    pub fn last_batch(&self) -> Option<&[u32]> {
        self.batches.last().map(Vec::as_slice)
    }

    pub fn total_words(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

impl RingTransport for VecTransport {
    fn submit_batch(&mut self, words: &[u32]) {
        self.batches.push(words.to_vec());
    }
}
