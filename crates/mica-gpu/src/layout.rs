use crate::format::{SurfaceFormat, Tiling};

/// Creation-time description of a surface.
///
/// `depth0` is the number of 2D slices per miplevel (array layers or cube
/// faces); it is identical across levels. `first_level..=last_level` is the
/// range of valid level indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub format: SurfaceFormat,
    pub tiling: Tiling,
    pub width0: u32,
    pub height0: u32,
    pub depth0: u32,
    pub first_level: u32,
    pub last_level: u32,
}

impl SurfaceDesc {
    /// A single-level, single-slice render-target style descriptor.
    pub fn renderbuffer(format: SurfaceFormat, tiling: Tiling, width: u32, height: u32) -> Self {
        Self {
            format,
            tiling,
            width0: width,
            height0: height,
            depth0: 1,
            first_level: 0,
            last_level: 0,
        }
    }

    pub fn level_count(&self) -> u32 {
        self.last_level - self.first_level + 1
    }
}

/// Where one (level, slice) image lives within its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceOffset {
    pub byte_offset: u64,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone)]
struct LevelLayout {
    origin_x: u32,
    origin_y: u32,
    width: u32,
    height: u32,
    /// Per-slice (x, y) offsets relative to the surface origin. Hardware
    /// slice placement is too diverse to recompute on the fly, so the table
    /// is materialized once at creation.
    slices: Vec<(u32, u32)>,
}

/// The geometric layout of a surface: per-level and per-slice offset tables,
/// sized exactly from the descriptor, plus the derived footprint.
///
/// The placement scheme is the classic stacked one: the base level sits at
/// the origin, level 1 directly below it, and levels 2+ accumulate to the
/// right of level 1. Slices within a level stack vertically. The layout is a
/// deterministic pure function of the descriptor and is immutable after
/// creation.
#[derive(Debug, Clone)]
pub struct MipLayout {
    first_level: u32,
    last_level: u32,
    cpp: u32,
    pitch_bytes: u32,
    total_width: u32,
    total_height: u32,
    levels: Vec<LevelLayout>,
}

impl MipLayout {
    pub fn new(desc: &SurfaceDesc) -> Self {
        assert!(desc.width0 > 0 && desc.height0 > 0 && desc.depth0 > 0);
        assert!(desc.first_level <= desc.last_level);

        let mut levels = Vec::with_capacity(desc.level_count() as usize);
        let mut total_width = 0u32;
        let mut total_height = 0u32;

        // Running x position for levels 2 and up.
        let mut mip_row_x = 0u32;
        let mut mip_row_y = 0u32;

        for level in desc.first_level..=desc.last_level {
            let rel = level - desc.first_level;
            let width = (desc.width0 >> rel).max(1);
            let height = (desc.height0 >> rel).max(1);

            let (origin_x, origin_y) = match rel {
                0 => (0, 0),
                1 => {
                    mip_row_y = total_height;
                    (0, mip_row_y)
                }
                _ => {
                    let x = mip_row_x;
                    mip_row_x += width;
                    (x, mip_row_y)
                }
            };
            if rel == 1 {
                mip_row_x = width;
            }

            let slices = (0..desc.depth0)
                .map(|s| (origin_x, origin_y + s * height))
                .collect();

            total_width = total_width.max(origin_x + width);
            total_height = total_height.max(origin_y + height * desc.depth0);

            levels.push(LevelLayout {
                origin_x,
                origin_y,
                width,
                height,
                slices,
            });
        }

        let cpp = desc.format.cpp();
        Self {
            first_level: desc.first_level,
            last_level: desc.last_level,
            cpp,
            pitch_bytes: total_width * cpp,
            total_width,
            total_height,
            levels,
        }
    }

    pub fn first_level(&self) -> u32 {
        self.first_level
    }

    pub fn last_level(&self) -> u32 {
        self.last_level
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn total_width(&self) -> u32 {
        self.total_width
    }

    pub fn total_height(&self) -> u32 {
        self.total_height
    }

    pub fn pitch_bytes(&self) -> u32 {
        self.pitch_bytes
    }

    /// Total footprint of the surface in bytes.
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.pitch_bytes) * u64::from(self.total_height)
    }

    pub fn level_width(&self, level: u32) -> u32 {
        self.level(level).width
    }

    pub fn level_height(&self, level: u32) -> u32 {
        self.level(level).height
    }

    pub fn slice_count(&self, level: u32) -> u32 {
        self.level(level).slices.len() as u32
    }

    /// Assert that `level` and `slice` are within this layout's declared
    /// ranges. An out-of-range index is caller misuse, not a runtime error.
    pub fn check_level_slice(&self, level: u32, slice: u32) {
        assert!(
            level >= self.first_level && level <= self.last_level,
            "level {} outside [{}, {}]",
            level,
            self.first_level,
            self.last_level
        );
        assert!(
            slice < self.slice_count(level),
            "slice {} outside level {}'s {} slices",
            slice,
            level,
            self.slice_count(level)
        );
    }

    /// The (x, y) position of one (level, slice) image.
    pub fn image_offset(&self, level: u32, slice: u32) -> (u32, u32) {
        self.check_level_slice(level, slice);
        self.level(level).slices[slice as usize]
    }

    /// The byte offset and (x, y) position of one (level, slice) image.
    pub fn slice_offset(&self, level: u32, slice: u32) -> SliceOffset {
        let (x, y) = self.image_offset(level, slice);
        SliceOffset {
            byte_offset: u64::from(y) * u64::from(self.pitch_bytes) + u64::from(x * self.cpp),
            x,
            y,
        }
    }

    /// Iterate every valid (level, slice) pair.
    pub fn each_slice(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let first = self.first_level;
        self.levels.iter().enumerate().flat_map(move |(i, lvl)| {
            let level = first + i as u32;
            (0..lvl.slices.len() as u32).map(move |s| (level, s))
        })
    }

    fn level(&self, level: u32) -> &LevelLayout {
        assert!(
            level >= self.first_level && level <= self.last_level,
            "level {} outside [{}, {}]",
            level,
            self.first_level,
            self.last_level
        );
        &self.levels[(level - self.first_level) as usize]
    }
}
