use super::{color_desc, depth_desc, make_ctx};
use crate::resolve::{SliceState, WriteKind};
use crate::{
    estimate_words, DeviceCaps, DrawError, PendingDraw, SliceBinding, SurfaceStack, Topology,
    OP_PRIM, OP_RESOLVE, OP_STATE,
};

fn draw_with_color_targets(ctx_draw_targets: Vec<SliceBinding>) -> PendingDraw {
    let mut draw = PendingDraw::new(Topology::Triangles, 3);
    draw.color_targets = ctx_draw_targets;
    draw
}

fn binding(stack: &SurfaceStack) -> SliceBinding {
    SliceBinding {
        stack: stack.clone(),
        level: 0,
        slice: 0,
    }
}

/// A draw that no longer fits triggers exactly one flush, after which it
/// fits and is emitted into the fresh batch.
#[test]
fn reservation_failure_flushes_once_then_fits() {
    let mut ctx = make_ctx(80, DeviceCaps::default());
    let color = ctx.create_surface(color_desc(16, 16)).unwrap();
    let stack = SurfaceStack::Simple(color);
    let draw = draw_with_color_targets(vec![binding(&stack)]);
    assert_eq!(estimate_words(&draw), 72);

    // First draw reserves 72 of 80 and emits.
    ctx.submit_draw(&draw).unwrap();
    let emitted = ctx.ring().used();
    assert!(emitted > 0);
    assert_eq!(ctx.transport().batches().len(), 0);

    // Second draw cannot reserve 72 in the remaining space; one flush
    // reclaims the ring and the draw lands in the new batch.
    ctx.submit_draw(&draw).unwrap();
    assert_eq!(ctx.stats().retry_flushes, 1);
    assert_eq!(ctx.transport().batches().len(), 1);
    assert_eq!(ctx.transport().batches()[0].len(), emitted);
    assert_eq!(ctx.stats().draws, 2);
    assert_eq!(ctx.stats().fallbacks, 0);
}

/// A draw whose minimum footprint exceeds the whole ring fails after exactly
/// one retry flush, leaves the ring empty, and marks nothing dirty.
#[test]
fn oversized_draw_is_a_hard_failure() {
    let mut ctx = make_ctx(100, DeviceCaps::default());
    let depth = ctx.create_surface(depth_desc(32, 32)).unwrap();
    let stack = SurfaceStack::Simple(depth.clone());

    // 10 bound descriptors: estimate 64 + 80 = 144 > 100.
    let mut draw = draw_with_color_targets((0..9).map(|_| binding(&stack)).collect());
    draw.depth_target = Some(binding(&stack));
    assert_eq!(estimate_words(&draw), 144);

    let err = ctx.submit_draw(&draw).unwrap_err();
    assert_eq!(
        err,
        DrawError::BatchCapacityExceeded {
            required: 144,
            capacity: 100,
        }
    );
    assert_eq!(ctx.stats().retry_flushes, 1, "flushed exactly once");
    assert_eq!(ctx.stats().fallbacks, 1);
    assert_eq!(ctx.ring().used(), 0, "nothing partially emitted");
    assert!(ctx.transport().batches().is_empty(), "ring was empty; flush sent nothing");

    // The failed draw must not have recorded any resolve obligation.
    assert_eq!(depth.borrow().slice_state(0, 0), SliceState::Consistent);
    assert_eq!(ctx.stats().draws, 0);
}

/// Retrying the same impossible draw never loops: each attempt performs at
/// most one flush before reporting failure.
#[test]
fn hard_failure_never_loops() {
    let mut ctx = make_ctx(80, DeviceCaps::default());
    let color = ctx.create_surface(color_desc(16, 16)).unwrap();
    let stack = SurfaceStack::Simple(color);
    let draw = draw_with_color_targets((0..4).map(|_| binding(&stack)).collect());
    assert!(estimate_words(&draw) > 80);

    for attempt in 1..=3u64 {
        ctx.submit_draw(&draw).unwrap_err();
        assert_eq!(ctx.stats().retry_flushes, attempt);
        assert_eq!(ctx.stats().fallbacks, attempt);
    }
}

/// Committed batches survive a later hard failure.
#[test]
fn hard_failure_leaves_prior_batches_committed() {
    let mut ctx = make_ctx(80, DeviceCaps::default());
    let color = ctx.create_surface(color_desc(16, 16)).unwrap();
    let stack = SurfaceStack::Simple(color);

    let small = draw_with_color_targets(vec![binding(&stack)]);
    ctx.submit_draw(&small).unwrap();
    ctx.flush();
    let committed = ctx.transport().batches().len();
    assert_eq!(committed, 1);

    let oversized = draw_with_color_targets((0..4).map(|_| binding(&stack)).collect());
    ctx.submit_draw(&oversized).unwrap_err();
    assert_eq!(ctx.transport().batches().len(), committed);
    assert_eq!(ctx.transport().batches()[0].len(), 10);
}

/// The emitted packet sequence: one state packet per bound child surface in
/// binding order, then the primitive packet.
#[test]
fn emission_packet_shape() {
    let mut ctx = make_ctx(1024, DeviceCaps::default());
    let color = ctx.create_surface(color_desc(16, 16)).unwrap();
    let depth = ctx.create_surface(depth_desc(16, 16)).unwrap();

    let mut draw = PendingDraw::new(Topology::TriangleStrip, 4);
    draw.instance_count = 2;
    draw.color_targets = vec![binding(&SurfaceStack::Simple(color.clone()))];
    draw.depth_target = Some(binding(&SurfaceStack::Simple(depth.clone())));
    ctx.submit_draw(&draw).unwrap();

    let words = ctx.ring().pending();
    // Two state packets of 6 words, one prim packet of 4.
    assert_eq!(words.len(), 16);
    assert_eq!(words[0] >> 24, OP_STATE);
    assert_eq!(words[1], color.borrow().id());
    assert_eq!(words[6] >> 24, OP_STATE);
    assert_eq!(words[7], depth.borrow().id());
    assert_eq!(words[12] >> 24, OP_PRIM);
    assert_eq!(words[13], 4, "triangle strip topology code");
    assert_eq!(words[14], 4, "vertex count");
    assert_eq!(words[15], 2, "instance count");
}

/// Pre-draw resolves are emitted before the draw's own packets and share its
/// in-order batch, so the execution unit completes them first.
#[test]
fn predraw_resolve_precedes_draw_packets() {
    let mut ctx = make_ctx(1024, DeviceCaps::default());
    let depth = ctx.create_surface(depth_desc(32, 32)).unwrap();
    let stack = SurfaceStack::Simple(depth.clone());
    depth
        .borrow_mut()
        .mark_dirty_after_write(0, 0, WriteKind::Compressed);

    let mut draw = PendingDraw::new(Topology::Triangles, 3);
    draw.sampled.push(stack);
    ctx.submit_draw(&draw).unwrap();

    let words = ctx.ring().pending();
    assert_eq!(words[0] >> 24, OP_RESOLVE);
    assert_eq!(words[1], depth.borrow().id());
    let prim_at = words.len() - 4;
    assert_eq!(words[prim_at] >> 24, OP_PRIM);
}

/// Rendering to a depth slice whose aux copy is stale first recompresses it,
/// then records the new compressed-write obligation.
#[test]
fn depth_render_revalidates_stale_aux() {
    let mut ctx = make_ctx(1024, DeviceCaps::default());
    let depth = ctx.create_surface(depth_desc(32, 32)).unwrap();
    let stack = SurfaceStack::Simple(depth.clone());
    depth
        .borrow_mut()
        .mark_dirty_after_write(0, 0, WriteKind::Plain);

    let mut draw = PendingDraw::new(Topology::Triangles, 3);
    draw.depth_target = Some(binding(&stack));
    ctx.submit_draw(&draw).unwrap();

    assert_eq!(ctx.stats().resolves_main_to_aux, 1);
    assert_eq!(
        depth.borrow().slice_state(0, 0),
        SliceState::NeedsAuxToMain,
        "the draw's own write re-dirtied the slice"
    );
}
