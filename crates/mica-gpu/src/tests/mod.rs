mod submission;

use mica_ring::VecTransport;

use crate::resolve::{ResolveDirection, ResolveEmitter};
use crate::{
    DeviceCaps, GpuContext, Surface, SurfaceDesc, SurfaceFormat, SystemPool, Tiling,
};

pub(crate) fn make_ctx(
    ring_capacity: usize,
    caps: DeviceCaps,
) -> GpuContext<VecTransport, SystemPool> {
    GpuContext::new(ring_capacity, VecTransport::new(), SystemPool::new(), caps)
}

pub(crate) fn depth_desc(width: u32, height: u32) -> SurfaceDesc {
    SurfaceDesc::renderbuffer(SurfaceFormat::Z24X8, Tiling::TiledY, width, height)
}

pub(crate) fn color_desc(width: u32, height: u32) -> SurfaceDesc {
    SurfaceDesc::renderbuffer(SurfaceFormat::Argb8888, Tiling::TiledX, width, height)
}

/// Emitter that only counts; for exercising surface-level resolve logic
/// without a context.
#[derive(Debug, Default)]
pub(crate) struct CountingEmitter {
    pub aux_to_main: u32,
    pub main_to_aux: u32,
}

impl CountingEmitter {
    pub(crate) fn total(&self) -> u32 {
        self.aux_to_main + self.main_to_aux
    }
}

impl ResolveEmitter for CountingEmitter {
    fn emit_resolve(&mut self, _surface: &Surface, _level: u32, _slice: u32, dir: ResolveDirection) {
        match dir {
            ResolveDirection::AuxToMain => self.aux_to_main += 1,
            ResolveDirection::MainToAux => self.main_to_aux += 1,
        }
    }
}
