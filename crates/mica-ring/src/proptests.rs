use proptest::prelude::*;

use crate::{CmdRing, VecTransport};

#[derive(Debug, Clone)]
enum Op {
    Emit(u8),
    Save,
    ResetToSaved,
    Flush,
}

const CAPACITY: usize = 64;
const MAX_OPS: usize = 128;

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..=16).prop_map(Op::Emit),
        Just(Op::Save),
        Just(Op::ResetToSaved),
        Just(Op::Flush),
    ]
}

proptest! {
    /// Drive the ring with arbitrary emit/save/reset/flush sequences against
    /// a naive model. The ring must agree with the model word-for-word, both
    /// in pending content and in what reached the transport.
    #[test]
    fn ring_matches_naive_model(ops in proptest::collection::vec(op_strategy(), 0..MAX_OPS)) {
        let mut ring = CmdRing::new(CAPACITY);
        let mut transport = VecTransport::new();

        // Model: pending words, optional save offset, list of flushed batches.
        let mut pending: Vec<u32> = Vec::new();
        let mut saved: Option<usize> = None;
        let mut flushed: Vec<Vec<u32>> = Vec::new();
        let mut next_word = 0u32;

        for op in ops {
            match op {
                Op::Emit(n) => {
                    let n = n as usize;
                    let fits = ring.require_space(n);
                    prop_assert_eq!(fits, pending.len() + n <= CAPACITY);
                    if fits {
                        for _ in 0..n {
                            ring.emit(next_word);
                            pending.push(next_word);
                            next_word += 1;
                        }
                    }
                }
                Op::Save => {
                    ring.save_state();
                    saved = Some(pending.len());
                }
                Op::ResetToSaved => {
                    if let Some(at) = saved {
                        ring.reset_to_saved();
                        pending.truncate(at);
                    }
                }
                Op::Flush => {
                    ring.flush(&mut transport);
                    if !pending.is_empty() {
                        flushed.push(std::mem::take(&mut pending));
                    }
                    saved = None;
                }
            }

            prop_assert!(ring.used() <= CAPACITY);
            prop_assert_eq!(ring.used() + ring.remaining(), CAPACITY);
            prop_assert_eq!(ring.pending(), pending.as_slice());
        }

        prop_assert_eq!(transport.batches(), flushed.as_slice());
        prop_assert_eq!(
            ring.stats().words_flushed as usize,
            transport.total_words()
        );
    }
}
