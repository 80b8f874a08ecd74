//! Draw admission: validate, reserve ring space, emit, and handle batch
//! capacity pressure with a retry-once-then-fallback policy.
//!
//! The policy is deliberately bounded: one flush reclaims the entire ring,
//! so a draw that still does not fit after a flush can never fit — that is
//! resource exhaustion, not a transient condition, and retrying again would
//! loop forever. The bound is structural: the phase graph has no edge from
//! the retry flush back to itself.

use thiserror::Error;
use tracing::debug;

use mica_ring::{CmdRing, RingTransport};

use crate::alloc::{AllocError, MemoryPool};
use crate::format::Tiling;
use crate::layout::SurfaceDesc;
use crate::resolve::{
    AccessKind, CompressedAccessPolicy, ResolveDirection, ResolveEmitter, WriteKind,
};
use crate::stats::GpuStats;
use crate::surface::{Surface, SurfaceRef, SurfaceStack};

pub const OP_STATE: u32 = 0x1;
pub const OP_RESOLVE: u32 = 0x2;
pub const OP_PRIM: u32 = 0x3;

/// Header word: opcode in the top byte, payload word count below.
pub fn pack_header(opcode: u32, payload_words: usize) -> u32 {
    debug_assert!(payload_words < (1 << 24));
    (opcode << 24) | payload_words as u32
}

/// Fixed per-draw command overhead, independent of bound surfaces.
pub const DRAW_OVERHEAD_WORDS: usize = 64;
/// Upper-bound words per bound surface descriptor.
pub const WORDS_PER_DESCRIPTOR: usize = 8;

const RESOLVE_PACKET_WORDS: usize = 5;
const STATE_PACKET_WORDS: usize = 6;
const PRIM_PACKET_WORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl Topology {
    fn as_u32(self) -> u32 {
        match self {
            Self::Points => 0,
            Self::Lines => 1,
            Self::LineStrip => 2,
            Self::Triangles => 3,
            Self::TriangleStrip => 4,
            Self::TriangleFan => 5,
        }
    }
}

/// One bound (level, slice) of a logical surface.
#[derive(Debug, Clone)]
pub struct SliceBinding {
    pub stack: SurfaceStack,
    pub level: u32,
    pub slice: u32,
}

/// One draw request. Created per draw, consumed by
/// [`GpuContext::submit_draw`], never persisted.
#[derive(Debug, Clone)]
pub struct PendingDraw {
    pub topology: Topology,
    pub vertex_count: u32,
    pub instance_count: u32,
    /// Logical surfaces the draw samples as textures.
    pub sampled: Vec<SurfaceStack>,
    pub color_targets: Vec<SliceBinding>,
    pub depth_target: Option<SliceBinding>,
}

impl PendingDraw {
    pub fn new(topology: Topology, vertex_count: u32) -> Self {
        Self {
            topology,
            vertex_count,
            instance_count: 1,
            sampled: Vec::new(),
            color_targets: Vec::new(),
            depth_target: None,
        }
    }

    fn descriptor_count(&self) -> usize {
        let sampled: usize = self.sampled.iter().map(|s| s.children().count()).sum();
        let bound: usize = self
            .color_targets
            .iter()
            .chain(self.depth_target.iter())
            .map(|b| b.stack.children().count())
            .sum();
        sampled + bound
    }
}

/// Upper-bound estimate of the ring words one draw may need: fixed overhead
/// plus a proportional term per bound surface descriptor. Emission must stay
/// at or below this; reservation happens against it.
pub fn estimate_words(draw: &PendingDraw) -> usize {
    DRAW_OVERHEAD_WORDS + WORDS_PER_DESCRIPTOR * draw.descriptor_count()
}

/// What the device can and cannot do; fixed per context.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    /// Whether packed depth-stencil surfaces can be stored combined. When
    /// false, such surfaces are split into depth + stencil companions.
    pub packed_depth_stencil: bool,
    /// Whether depth surfaces get a compressed aux (HiZ) surface.
    pub hiz: bool,
    /// Which operation classes go through the compressed path.
    pub compressed_access: CompressedAccessPolicy,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            packed_depth_stencil: true,
            hiz: true,
            compressed_access: CompressedAccessPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DrawError {
    /// The draw's minimum footprint exceeds a whole batch even after a
    /// flush. Terminal for this draw; the caller must take the software
    /// path. Previously flushed batches remain committed.
    #[error(
        "draw needs {required} words but a whole batch holds {capacity}; software fallback required"
    )]
    BatchCapacityExceeded { required: usize, capacity: usize },
}

/// Phases of one draw submission. `Success` and `HardFailure` are the exits;
/// between draws the controller is implicitly idle. The retry edge goes
/// `Reserving → RetryFlush → Reserving { retried: true }` and `RetryFlush`
/// is unreachable from `Reserving { retried: true }`, which is what bounds
/// the policy to a single flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitPhase {
    Validating,
    Reserving { retried: bool },
    RetryFlush,
    Emitting,
}

/// The single-threaded command-producer context: the ring, its transport,
/// the memory pool, and per-context policy and counters.
pub struct GpuContext<T: RingTransport, P: MemoryPool> {
    ring: CmdRing,
    transport: T,
    pool: P,
    caps: DeviceCaps,
    stats: GpuStats,
    /// Bumped whenever a validation-time resolve performed work; downstream
    /// derived-state caches key off this.
    state_epoch: u64,
    next_surface_id: u32,
}

impl<T: RingTransport, P: MemoryPool> GpuContext<T, P> {
    pub fn new(ring_capacity_words: usize, transport: T, pool: P, caps: DeviceCaps) -> Self {
        Self {
            ring: CmdRing::new(ring_capacity_words),
            transport,
            pool,
            caps,
            stats: GpuStats::default(),
            state_epoch: 0,
            next_surface_id: 0,
        }
    }

    pub fn ring(&self) -> &CmdRing {
        &self.ring
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn stats(&self) -> &GpuStats {
        &self.stats
    }

    pub fn state_epoch(&self) -> u64 {
        self.state_epoch
    }

    /// Hand the current batch to the execution unit. This is the
    /// synchronization point: everything emitted so far becomes visible to
    /// consumers that synchronize on the transport.
    pub fn flush(&mut self) {
        self.ring.flush(&mut self.transport);
    }

    /// Allocate a surface. Depth formats get an aux surface when the device
    /// supports one; aux allocation failure only disables the optimization.
    pub fn create_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceRef, AllocError> {
        let id = self.next_surface_id;
        self.next_surface_id += 1;
        let mut surface = Surface::alloc(&mut self.pool, desc, id)?;
        if self.caps.hiz && desc.format.has_depth() && !surface.ensure_aux(&mut self.pool) {
            self.stats.aux_alloc_failures += 1;
        }
        Ok(wrap(surface))
    }

    /// Allocate the logical surface for a depth/stencil format: a single
    /// surface when the hardware stores the packed format, otherwise a
    /// companion split of congruent depth and stencil surfaces.
    ///
    /// The split is all-or-nothing: if the stencil companion cannot be
    /// allocated the depth companion is released before the error returns.
    pub fn create_depth_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceStack, AllocError> {
        let needs_split = desc.format.is_depth_stencil() && !self.caps.packed_depth_stencil;
        if !needs_split {
            return Ok(SurfaceStack::Simple(self.create_surface(desc)?));
        }

        let (depth_format, stencil_format) = desc
            .format
            .separate_parts()
            .expect("depth-stencil format with no separate parts");
        let depth_desc = SurfaceDesc {
            format: depth_format,
            ..desc
        };
        let stencil_desc = SurfaceDesc {
            format: stencil_format,
            tiling: Tiling::TiledW,
            ..desc
        };

        let depth = self.create_surface(depth_desc)?;
        let stencil = match self.create_surface(stencil_desc) {
            Ok(stencil) => stencil,
            Err(err) => {
                self.release_surface(depth);
                return Err(err);
            }
        };
        Ok(SurfaceStack::Split { depth, stencil })
    }

    /// Lazily attach an aux surface to `surface`. Returns whether the
    /// surface has one afterwards. Only depth formats qualify.
    pub fn ensure_hiz(&mut self, surface: &SurfaceRef) -> bool {
        if !self.caps.hiz || !surface.borrow().desc().format.has_depth() {
            return false;
        }
        let attached = surface.borrow_mut().ensure_aux(&mut self.pool);
        if !attached {
            self.stats.aux_alloc_failures += 1;
        }
        attached
    }

    /// Return `surface` to the pool if this was the last reference to it.
    ///
    /// While other references (views, bindings) are live the release is
    /// deferred: the memory goes back when the last holder returns its
    /// reference. Either way the pool sees each allocation exactly once.
    pub fn release_surface(&mut self, surface: SurfaceRef) {
        if let Ok(cell) = std::rc::Rc::try_unwrap(surface) {
            let (mem, aux_mem) = cell.into_inner().into_parts();
            self.pool.release(mem);
            if let Some(aux_mem) = aux_mem {
                self.pool.release(aux_mem);
            }
        }
    }

    pub fn release_stack(&mut self, stack: SurfaceStack) {
        match stack {
            SurfaceStack::Simple(s) => self.release_surface(s),
            SurfaceStack::Split { depth, stencil } => {
                self.release_surface(depth);
                self.release_surface(stencil);
            }
        }
    }

    /// Admit one draw into the ring.
    ///
    /// Runs the draw through validate → reserve → emit. A failed reservation
    /// flushes once and re-reserves; a second failure is terminal and the
    /// caller must fall back to software for this draw. On failure nothing
    /// of the draw is left in the ring and none of its target slices has
    /// been marked dirty; resolves emitted during validation stand — they
    /// are committed, correct work regardless of the draw's fate.
    pub fn submit_draw(&mut self, draw: &PendingDraw) -> Result<(), DrawError> {
        let estimate = estimate_words(draw);
        let mut phase = SubmitPhase::Validating;

        loop {
            phase = match phase {
                SubmitPhase::Validating => {
                    if self.validate(draw) {
                        self.state_epoch += 1;
                    }
                    SubmitPhase::Reserving { retried: false }
                }
                SubmitPhase::Reserving { retried } => {
                    if self.ring.require_space(estimate) {
                        SubmitPhase::Emitting
                    } else if !retried {
                        SubmitPhase::RetryFlush
                    } else {
                        self.stats.fallbacks += 1;
                        debug!(
                            required = estimate,
                            capacity = self.ring.capacity(),
                            "draw exceeds batch capacity after retry flush"
                        );
                        return Err(DrawError::BatchCapacityExceeded {
                            required: estimate,
                            capacity: self.ring.capacity(),
                        });
                    }
                }
                SubmitPhase::RetryFlush => {
                    // A flush reclaims the whole ring; what it cannot do is
                    // make the ring bigger, hence at most one retry.
                    self.ring.flush(&mut self.transport);
                    self.stats.retry_flushes += 1;
                    SubmitPhase::Reserving { retried: true }
                }
                SubmitPhase::Emitting => {
                    self.emit_draw(draw, estimate);
                    self.mark_targets_dirty(draw);
                    self.stats.draws += 1;
                    return Ok(());
                }
            };
        }
    }

    /// Pre-draw resolves: every surface the draw reads must be consistent
    /// for the kind of access the device performs. Returns whether any
    /// resolve performed work.
    fn validate(&mut self, draw: &PendingDraw) -> bool {
        let sample_compressed = self.caps.compressed_access.is_compressed(AccessKind::SAMPLE);
        let render_compressed = self.caps.compressed_access.is_compressed(AccessKind::RENDER);

        let mut any = false;
        for stack in &draw.sampled {
            any |= if sample_compressed {
                stack.ensure_all_compressible(self)
            } else {
                stack.ensure_all_readable(self)
            };
        }
        if let Some(binding) = &draw.depth_target {
            any |= if render_compressed {
                binding
                    .stack
                    .ensure_compressible(self, binding.level, binding.slice)
            } else {
                binding
                    .stack
                    .ensure_readable(self, binding.level, binding.slice)
            };
        }
        any
    }

    /// Emit the draw's state and primitive packets as one atomic group.
    fn emit_draw(&mut self, draw: &PendingDraw, estimate: usize) {
        let mut words = Vec::with_capacity(estimate);
        for binding in draw.color_targets.iter().chain(draw.depth_target.iter()) {
            for child in binding.stack.children() {
                let child = child.borrow();
                let offset = child.layout().slice_offset(binding.level, binding.slice);
                words.extend_from_slice(&[
                    pack_header(OP_STATE, STATE_PACKET_WORDS - 1),
                    child.id(),
                    binding.level,
                    binding.slice,
                    offset.x,
                    offset.y,
                ]);
            }
        }
        words.extend_from_slice(&[
            pack_header(OP_PRIM, PRIM_PACKET_WORDS - 1),
            draw.topology.as_u32(),
            draw.vertex_count,
            draw.instance_count,
        ]);
        debug_assert!(words.len() <= estimate, "draw emission exceeded its estimate");

        // Splitting the state packets and the primitive packet across a
        // flush boundary would leave the hardware half-configured; the
        // section makes that impossible.
        let mut section = self.ring.begin_no_wrap();
        section.emit_all(&words);
    }

    /// Rendering wrote every bound target slice; record the resolve
    /// obligations that creates.
    fn mark_targets_dirty(&mut self, draw: &PendingDraw) {
        let render_compressed = self.caps.compressed_access.is_compressed(AccessKind::RENDER);
        let kind = if render_compressed {
            WriteKind::Compressed
        } else {
            WriteKind::Plain
        };
        for binding in draw.color_targets.iter().chain(draw.depth_target.iter()) {
            binding.stack.mark_dirty_after_write(binding.level, binding.slice, kind);
        }
    }
}

impl<T: RingTransport, P: MemoryPool> ResolveEmitter for GpuContext<T, P> {
    /// Append one resolve pass to the ring.
    ///
    /// Resolve packets are self-contained, so if the current batch cannot
    /// take one the ring is flushed first — a resolve may legally land in an
    /// earlier batch than the draw that needed it, since batches execute in
    /// order.
    fn emit_resolve(&mut self, surface: &Surface, level: u32, slice: u32, dir: ResolveDirection) {
        if !self.ring.require_space(RESOLVE_PACKET_WORDS) {
            self.ring.flush(&mut self.transport);
        }
        let dir_word = match dir {
            ResolveDirection::AuxToMain => {
                self.stats.resolves_aux_to_main += 1;
                0
            }
            ResolveDirection::MainToAux => {
                self.stats.resolves_main_to_aux += 1;
                1
            }
        };
        debug!(surface = surface.id(), level, slice, ?dir, "emitting resolve pass");
        self.ring.emit_all(&[
            pack_header(OP_RESOLVE, RESOLVE_PACKET_WORDS - 1),
            surface.id(),
            level,
            slice,
            dir_word,
        ]);
    }
}

fn wrap(surface: Surface) -> SurfaceRef {
    std::rc::Rc::new(std::cell::RefCell::new(surface))
}
