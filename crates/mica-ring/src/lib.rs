//! `mica-ring` is the command-transport side of mica.
//!
//! It provides:
//! - A fixed-capacity, append-only command ring with save/restore points and
//!   an explicit no-wrap protocol for multi-packet emission (see [`CmdRing`]).
//! - The execution-unit submission seam ([`RingTransport`]) plus an in-memory
//!   implementation that records submitted batches ([`VecTransport`]).
//!
//! The ring is intentionally CPU-only: it tracks words and offsets, not real
//! hardware memory. Everything hardware-specific lives behind the transport.

mod ring;
mod transport;

#[cfg(test)]
mod proptests;

pub use ring::{CmdRing, NoWrapSection, RingStats};
pub use transport::{RingTransport, VecTransport};
