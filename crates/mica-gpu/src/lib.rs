//! `mica-gpu` models the consistency core of a driver for hardware with
//! compressed auxiliary depth buffers:
//!
//! - Surfaces with mip/slice geometry and shared (`Rc`) ownership (see
//!   [`Surface`], [`SliceView`]).
//! - Lazily-allocated compressed aux surfaces and the per-(level, slice)
//!   resolve state that keeps main and aux copies reconciled (see
//!   [`resolve`]).
//! - The companion split for packed depth-stencil formats the hardware
//!   cannot store combined (see [`SurfaceStack`]).
//! - Draw admission into a fixed-capacity command ring with a
//!   retry-once-then-software-fallback policy (see [`GpuContext::submit_draw`]).
//!
//! Everything is single-threaded and in-memory; the execution unit sits
//! behind `mica_ring::RingTransport` and real memory behind
//! [`alloc::MemoryPool`].

mod alloc;
mod format;
mod layout;
mod stats;
mod submit;
mod surface;

pub mod resolve;

#[cfg(test)]
mod tests;

pub use alloc::{AllocError, MemHandle, MemoryPool, SystemPool};
pub use format::{SurfaceFormat, Tiling};
pub use layout::{MipLayout, SliceOffset, SurfaceDesc};
pub use stats::GpuStats;
pub use submit::{
    estimate_words, pack_header, DeviceCaps, DrawError, GpuContext, PendingDraw, SliceBinding,
    Topology, DRAW_OVERHEAD_WORDS, OP_PRIM, OP_RESOLVE, OP_STATE, WORDS_PER_DESCRIPTOR,
};
pub use surface::{AuxSurface, SliceView, Surface, SurfaceRef, SurfaceStack};
