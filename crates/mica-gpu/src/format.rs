/// Surface formats the consistency core needs to distinguish.
///
/// This is deliberately not a full hardware format table: the core only cares
/// about bytes-per-pixel, whether a format carries depth and/or stencil bits,
/// and how a packed depth-stencil format decomposes when the hardware cannot
/// store it combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    Argb8888,
    Rgb565,
    Z16,
    /// Packed 24-bit depth + 8-bit stencil.
    Z24S8,
    /// 24-bit depth, upper byte unused.
    Z24X8,
    S8,
    /// Hardware-compressed depth summary (HiZ). Only ever appears as the
    /// format of an auxiliary surface.
    HizAux,
}

impl SurfaceFormat {
    pub fn cpp(self) -> u32 {
        match self {
            Self::Argb8888 | Self::Z24S8 | Self::Z24X8 => 4,
            Self::Rgb565 | Self::Z16 => 2,
            Self::S8 | Self::HizAux => 1,
        }
    }

    pub fn has_depth(self) -> bool {
        matches!(self, Self::Z16 | Self::Z24S8 | Self::Z24X8)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Z24S8 | Self::S8)
    }

    pub fn is_depth_stencil(self) -> bool {
        self.has_depth() && self.has_stencil()
    }

    /// The two physically-supported formats a packed depth-stencil format
    /// splits into when the hardware cannot store it combined: a depth-only
    /// surface and a stencil-only surface.
    pub fn separate_parts(self) -> Option<(SurfaceFormat, SurfaceFormat)> {
        match self {
            Self::Z24S8 => Some((Self::Z24X8, Self::S8)),
            _ => None,
        }
    }
}

/// Memory tiling layout tag. The core never walks tiled memory itself; the
/// tag travels with allocations so the memory collaborator can honor it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tiling {
    Linear,
    TiledX,
    TiledY,
    /// W-tiling, used by stencil-only surfaces.
    TiledW,
}
