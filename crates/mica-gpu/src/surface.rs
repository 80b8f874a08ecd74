//! Surfaces: tiled images with mip/slice geometry, an optional compressed
//! auxiliary surface, and the per-slice resolve state that keeps the two in
//! agreement.
//!
//! Surfaces are shared: a renderbuffer and a texture view may reference the
//! same underlying surface, and resolve state lives on the surface itself so
//! a write through one view is observed as "needs resolve" through any other.
//! Sharing is `Rc`-based and single-threaded, matching the one-producer
//! model of the whole crate.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::alloc::{AllocError, MemHandle, MemoryPool};
use crate::format::{SurfaceFormat, Tiling};
use crate::layout::{MipLayout, SliceOffset, SurfaceDesc};
use crate::resolve::{ResolveDirection, ResolveEmitter, ResolveMap, SliceState, WriteKind};

/// Shared handle to a surface. The surface is released when the last
/// reference is dropped back to the owning context.
pub type SurfaceRef = Rc<RefCell<Surface>>;

/// The compressed auxiliary surface (HiZ). Owned 1:1 by its parent surface;
/// its geometry is derived from the parent's and never changes independently.
#[derive(Debug)]
pub struct AuxSurface {
    layout: MipLayout,
    mem: MemHandle,
}

impl AuxSurface {
    /// The aux descriptor for a given parent: half width, half height, same
    /// level range and slice count, compressed format, Y tiling.
    fn derive_desc(parent: &SurfaceDesc) -> SurfaceDesc {
        SurfaceDesc {
            format: SurfaceFormat::HizAux,
            tiling: Tiling::TiledY,
            width0: (parent.width0 / 2).max(1),
            height0: (parent.height0 / 2).max(1),
            depth0: parent.depth0,
            first_level: parent.first_level,
            last_level: parent.last_level,
        }
    }

    pub fn layout(&self) -> &MipLayout {
        &self.layout
    }

    pub fn mem(&self) -> MemHandle {
        self.mem
    }
}

/// A tiled memory region plus its geometric layout, optional aux surface,
/// and resolve map.
#[derive(Debug)]
pub struct Surface {
    id: u32,
    desc: SurfaceDesc,
    layout: MipLayout,
    mem: MemHandle,
    aux: Option<AuxSurface>,
    resolve_map: ResolveMap,
}

impl Surface {
    pub(crate) fn alloc(
        pool: &mut dyn MemoryPool,
        desc: SurfaceDesc,
        id: u32,
    ) -> Result<Surface, AllocError> {
        let layout = MipLayout::new(&desc);
        let mem = pool.allocate(layout.size_bytes(), desc.tiling)?;
        let resolve_map = ResolveMap::new(&layout);
        Ok(Surface {
            id,
            desc,
            layout,
            mem,
            aux: None,
            resolve_map,
        })
    }

    pub(crate) fn into_parts(self) -> (MemHandle, Option<MemHandle>) {
        (self.mem, self.aux.map(|aux| aux.mem))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    pub fn layout(&self) -> &MipLayout {
        &self.layout
    }

    pub fn mem(&self) -> MemHandle {
        self.mem
    }

    pub fn has_aux(&self) -> bool {
        self.aux.is_some()
    }

    pub fn aux(&self) -> Option<&AuxSurface> {
        self.aux.as_ref()
    }

    /// Lazily attach the aux surface. Returns true if the surface has one
    /// afterwards. Allocation failure is not an error: the surface simply
    /// keeps running without the compression optimization.
    pub(crate) fn ensure_aux(&mut self, pool: &mut dyn MemoryPool) -> bool {
        if self.aux.is_some() {
            return true;
        }
        let desc = AuxSurface::derive_desc(&self.desc);
        let layout = MipLayout::new(&desc);
        match pool.allocate(layout.size_bytes(), desc.tiling) {
            Ok(mem) => {
                debug!(surface = self.id, "attached aux surface");
                self.aux = Some(AuxSurface { layout, mem });
                true
            }
            Err(err) => {
                warn!(surface = self.id, %err, "aux surface allocation failed; compression disabled");
                false
            }
        }
    }

    pub fn slice_state(&self, level: u32, slice: u32) -> SliceState {
        self.layout.check_level_slice(level, slice);
        self.resolve_map.get(level, slice)
    }

    /// Record the consistency consequence of a write to one slice.
    ///
    /// Without an aux surface there is only one copy of the data and nothing
    /// to track; the call is a no-op (the slice is implicitly consistent).
    pub fn mark_dirty_after_write(&mut self, level: u32, slice: u32, kind: WriteKind) {
        self.layout.check_level_slice(level, slice);
        if self.aux.is_none() {
            return;
        }
        let state = match kind {
            WriteKind::Compressed => SliceState::NeedsAuxToMain,
            WriteKind::Plain => SliceState::NeedsMainToAux,
        };
        self.resolve_map.set(level, slice, state);
    }

    /// Mark every slice after a full-surface write (e.g. a cleared or fully
    /// redrawn buffer).
    pub fn mark_all_dirty(&mut self, kind: WriteKind) {
        if self.aux.is_none() {
            return;
        }
        let state = match kind {
            WriteKind::Compressed => SliceState::NeedsAuxToMain,
            WriteKind::Plain => SliceState::NeedsMainToAux,
        };
        self.resolve_map.set_all(state);
    }

    /// Make one slice's main copy readable by compression-unaware paths.
    ///
    /// Emits an aux-to-main resolve if the main copy is stale and returns
    /// whether work was performed (callers invalidate dependent caches only
    /// when it was). A slice whose *aux* copy is stale needs nothing here:
    /// the main copy is already the newest.
    pub fn ensure_readable(
        &mut self,
        emitter: &mut dyn ResolveEmitter,
        level: u32,
        slice: u32,
    ) -> bool {
        self.layout.check_level_slice(level, slice);
        if self.resolve_map.get(level, slice) != SliceState::NeedsAuxToMain {
            return false;
        }
        emitter.emit_resolve(self, level, slice, ResolveDirection::AuxToMain);
        self.resolve_map.set(level, slice, SliceState::Consistent);
        true
    }

    /// Make one slice's aux copy valid for compressed access.
    ///
    /// Emits a main-to-aux resolve if a plain write bypassed the aux surface.
    /// A slice whose main copy is stale needs nothing here: the aux copy is
    /// already the newest.
    pub fn ensure_compressible(
        &mut self,
        emitter: &mut dyn ResolveEmitter,
        level: u32,
        slice: u32,
    ) -> bool {
        self.layout.check_level_slice(level, slice);
        if self.resolve_map.get(level, slice) != SliceState::NeedsMainToAux {
            return false;
        }
        emitter.emit_resolve(self, level, slice, ResolveDirection::MainToAux);
        self.resolve_map.set(level, slice, SliceState::Consistent);
        true
    }

    pub fn ensure_all_readable(&mut self, emitter: &mut dyn ResolveEmitter) -> bool {
        let slices: Vec<_> = self.layout.each_slice().collect();
        let mut any = false;
        for (level, slice) in slices {
            any |= self.ensure_readable(emitter, level, slice);
        }
        any
    }

    pub fn ensure_all_compressible(&mut self, emitter: &mut dyn ResolveEmitter) -> bool {
        let slices: Vec<_> = self.layout.each_slice().collect();
        let mut any = false;
        for (level, slice) in slices {
            any |= self.ensure_compressible(emitter, level, slice);
        }
        any
    }
}

/// A lightweight reference to one (level, slice) image of a surface.
///
/// Views are cheap to clone and hold a strong reference, so the underlying
/// surface cannot be released while any view of it is live. The derived
/// offset is computed once; surface layout is immutable post-creation, so a
/// view stays valid for the surface's whole lifetime.
#[derive(Debug, Clone)]
pub struct SliceView {
    surface: SurfaceRef,
    level: u32,
    slice: u32,
    offset: SliceOffset,
}

impl SliceView {
    pub fn new(surface: SurfaceRef, level: u32, slice: u32) -> Self {
        let offset = surface.borrow().layout().slice_offset(level, slice);
        Self {
            surface,
            level,
            slice,
            offset,
        }
    }

    pub fn surface(&self) -> &SurfaceRef {
        &self.surface
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn slice(&self) -> u32 {
        self.slice
    }

    pub fn offset(&self) -> SliceOffset {
        self.offset
    }

    /// Give up the view, handing its surface reference to the caller
    /// (typically to return it to the context for release).
    pub fn into_surface(self) -> SurfaceRef {
        self.surface
    }
}

/// One logical surface that is physically one or two surfaces.
///
/// Packed depth-stencil formats the hardware cannot store combined are split
/// into a depth-only and a stencil-only surface of congruent geometry. The
/// split is explicit in the type: every consistency operation pattern-matches
/// and forwards to each child independently, using the child's own resolve
/// state. A child without an aux surface turns the forwarded call into a
/// no-op.
#[derive(Debug, Clone)]
pub enum SurfaceStack {
    Simple(SurfaceRef),
    Split {
        depth: SurfaceRef,
        stencil: SurfaceRef,
    },
}

impl SurfaceStack {
    /// The surface a plain (non-split-aware) consumer should address: the
    /// simple surface, or the depth child of a split.
    pub fn primary(&self) -> &SurfaceRef {
        match self {
            Self::Simple(s) => s,
            Self::Split { depth, .. } => depth,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Self::Split { .. })
    }

    /// Children in a fixed order: simple surface, or depth then stencil.
    pub fn children(&self) -> impl Iterator<Item = &SurfaceRef> {
        let (a, b) = match self {
            Self::Simple(s) => (s, None),
            Self::Split { depth, stencil } => (depth, Some(stencil)),
        };
        std::iter::once(a).chain(b)
    }

    /// A write to the logical surface dirties each child that tracks
    /// consistency. A packed write covers both depth and stencil bits, so
    /// both children of a split are marked.
    pub fn mark_dirty_after_write(&self, level: u32, slice: u32, kind: WriteKind) {
        for child in self.children() {
            child.borrow_mut().mark_dirty_after_write(level, slice, kind);
        }
    }

    pub fn mark_all_dirty(&self, kind: WriteKind) {
        for child in self.children() {
            child.borrow_mut().mark_all_dirty(kind);
        }
    }

    pub fn ensure_readable(
        &self,
        emitter: &mut dyn ResolveEmitter,
        level: u32,
        slice: u32,
    ) -> bool {
        let mut any = false;
        for child in self.children() {
            any |= child.borrow_mut().ensure_readable(emitter, level, slice);
        }
        any
    }

    pub fn ensure_compressible(
        &self,
        emitter: &mut dyn ResolveEmitter,
        level: u32,
        slice: u32,
    ) -> bool {
        let mut any = false;
        for child in self.children() {
            any |= child.borrow_mut().ensure_compressible(emitter, level, slice);
        }
        any
    }

    pub fn ensure_all_readable(&self, emitter: &mut dyn ResolveEmitter) -> bool {
        let mut any = false;
        for child in self.children() {
            any |= child.borrow_mut().ensure_all_readable(emitter);
        }
        any
    }

    pub fn ensure_all_compressible(&self, emitter: &mut dyn ResolveEmitter) -> bool {
        let mut any = false;
        for child in self.children() {
            any |= child.borrow_mut().ensure_all_compressible(emitter);
        }
        any
    }
}
