/// Counters accumulated by a [`GpuContext`](crate::GpuContext).
///
/// Plain additive counters, cheap enough to keep unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStats {
    /// Draws admitted into the ring.
    pub draws: u64,
    /// Aux-to-main (decompression) resolve passes emitted.
    pub resolves_aux_to_main: u64,
    /// Main-to-aux (recompression) resolve passes emitted.
    pub resolves_main_to_aux: u64,
    /// Flushes forced by a failed reservation (the retry path).
    pub retry_flushes: u64,
    /// Draws that could not fit even after a retry flush and were handed
    /// back to the caller for software fallback.
    pub fallbacks: u64,
    /// Auxiliary-surface allocations that failed; the optimization was
    /// disabled for those surfaces.
    pub aux_alloc_failures: u64,
}

impl GpuStats {
    pub fn resolves_total(&self) -> u64 {
        self.resolves_aux_to_main + self.resolves_main_to_aux
    }
}
