//! Per-slice consistency state between a surface and its auxiliary surface.
//!
//! A surface with a compressed auxiliary buffer has, for every (level, slice)
//! image, exactly one of three states: the two copies agree, the main copy is
//! stale (compressed writes landed in the aux buffer), or the aux copy is
//! stale (a plain write bypassed compression). Resolve passes reconcile one
//! direction at a time; the tracker's job is to know which direction, if
//! any, each slice needs.

use bitflags::bitflags;

use crate::layout::MipLayout;
use crate::surface::Surface;

/// Consistency of one (level, slice) image with respect to the aux surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SliceState {
    /// Main and aux copies agree.
    #[default]
    Consistent,
    /// Compressed writes landed in the aux surface; the main copy must be
    /// decompressed before any compression-unaware path reads it.
    NeedsAuxToMain,
    /// A plain write bypassed the aux surface; the aux copy must be
    /// regenerated (or dropped) before compressed access resumes.
    NeedsMainToAux,
}

/// How a write reached the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Through the compression-aware path (rendering with the aux surface
    /// bound). The aux copy is now the newest.
    Compressed,
    /// Through a path that bypassed compression (CPU map, software blit).
    /// The main copy is now the newest.
    Plain,
}

/// Direction of a resolve pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveDirection {
    AuxToMain,
    MainToAux,
}

/// Emits the hardware command sequence for one resolve pass. Implemented by
/// the chip-encoding layer; emission is infallible here — batch capacity is
/// the submission controller's problem, not the tracker's.
pub trait ResolveEmitter {
    fn emit_resolve(&mut self, surface: &Surface, level: u32, slice: u32, dir: ResolveDirection);
}

/// Dense per-(level, slice) state table, sized exactly from the surface
/// layout at creation time.
#[derive(Debug, Clone)]
pub struct ResolveMap {
    first_level: u32,
    /// Prefix sums of slice counts; `level_start[l]` indexes the first slice
    /// of relative level `l` in `states`.
    level_start: Vec<usize>,
    states: Vec<SliceState>,
}

impl ResolveMap {
    pub fn new(layout: &MipLayout) -> Self {
        let level_count = layout.level_count();
        let mut level_start = Vec::with_capacity(level_count as usize);
        let mut total = 0usize;
        for rel in 0..level_count {
            level_start.push(total);
            total += layout.slice_count(layout.first_level() + rel) as usize;
        }
        Self {
            first_level: layout.first_level(),
            level_start,
            states: vec![SliceState::Consistent; total],
        }
    }

    fn index(&self, level: u32, slice: u32) -> usize {
        let rel = (level - self.first_level) as usize;
        self.level_start[rel] + slice as usize
    }

    pub fn get(&self, level: u32, slice: u32) -> SliceState {
        self.states[self.index(level, slice)]
    }

    pub fn set(&mut self, level: u32, slice: u32, state: SliceState) {
        let idx = self.index(level, slice);
        self.states[idx] = state;
    }

    pub fn set_all(&mut self, state: SliceState) {
        self.states.fill(state);
    }

    pub fn any_needs(&self, state: SliceState) -> bool {
        self.states.iter().any(|s| *s == state)
    }
}

bitflags! {
    /// Operation classes that may touch a surface. Which of these go through
    /// the compression-aware path varies by hardware generation, so the set
    /// is configuration, not code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessKind: u32 {
        const SAMPLE = 1 << 0;
        const BLIT   = 1 << 1;
        const MAP    = 1 << 2;
        const RENDER = 1 << 3;
    }
}

/// Predicate for "does this operation constitute compressed access".
///
/// An operation in the compressed set reads through the aux surface and needs
/// it valid ([`ensure_compressible`](crate::Surface::ensure_compressible));
/// any other operation reads plain bytes and needs the main copy resolved
/// ([`ensure_readable`](crate::Surface::ensure_readable)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedAccessPolicy {
    compressed: AccessKind,
}

impl CompressedAccessPolicy {
    pub fn new(compressed: AccessKind) -> Self {
        Self { compressed }
    }

    pub fn is_compressed(&self, kind: AccessKind) -> bool {
        self.compressed.intersects(kind)
    }
}

impl Default for CompressedAccessPolicy {
    /// Rendering and blits go through the compressed path; sampling and CPU
    /// maps read plain bytes. Matches the hardware the original tracker
    /// served.
    fn default() -> Self {
        Self {
            compressed: AccessKind::RENDER | AccessKind::BLIT,
        }
    }
}
