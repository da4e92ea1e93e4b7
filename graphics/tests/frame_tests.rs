//! Frame scheduling integration tests.
//!
//! These tests drive the full scheduler against the dummy backend and check
//! the properties the frame loop guarantees.
//!
//! # Test Categories
//!
//! - **Ring Buffer Tests**: slot rotation, backpressure, exclusive slot reuse
//! - **Acceleration Structure Tests**: instance capacity and partitioning
//! - **History Tests**: reset factor determinism
//! - **Barrier Tests**: minimal transitions and pass ordering
//! - **Resolution Tests**: dynamic resolution and upsampling
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p rtframe-graphics --test frame_tests
//! ```

mod common;

use std::collections::HashSet;

use rstest::rstest;

use common::{
    Gpu, SceneSpec, TestContext, animated_params, annotations, barrier_count, default_params,
};
use rtframe_graphics::accel::{INSTANCE_INDEX_LIMIT, TlasInstanceDesc};
use rtframe_graphics::backend::Command;
use rtframe_graphics::resources::BufferId;
use rtframe_graphics::{
    AccessBits, FrameStage, FrameTiming, RenderParams, RenderTarget, RendererConfig, TestCaseFile,
};

// ============================================================================
// Ring Buffer Tests
// ============================================================================

/// Three slots with a GPU two frames behind never stall the CPU.
#[rstest]
#[case::fast(Gpu::Fast)]
#[case::slow(Gpu::Slow)]
fn test_three_slots_never_block(#[case] gpu: Gpu) {
    let mut ctx = TestContext::small(gpu, 3);
    let params = default_params();

    let mut slots = Vec::new();
    for frame in 0..6 {
        let report = ctx.render(&params);
        assert_eq!(report.frame_index, frame);
        slots.push(report.slot);
        if ctx.backend.pending_count() == 3 {
            ctx.backend.complete_oldest();
        }
    }

    assert_eq!(slots, [0, 1, 2, 0, 1, 2]);
    assert_eq!(ctx.scheduler.ring().acquire_count_blocked(), 0);
    assert_eq!(ctx.backend.presented().len(), 6);
}

/// A GPU that never finishes on its own forces the CPU to wait once every
/// slot is in flight.
#[rstest]
#[case::one_slot(1)]
#[case::two_slots(2)]
#[case::three_slots(3)]
fn test_stalled_gpu_blocks_on_slot_reuse(#[case] frames_in_flight: usize) {
    let mut ctx = TestContext::small(Gpu::Slow, frames_in_flight);
    let params = default_params();

    for _ in 0..=frames_in_flight {
        ctx.render(&params);
    }

    assert_eq!(ctx.scheduler.ring().acquire_count_blocked(), 1);
    assert!(ctx.backend.max_pending() <= frames_in_flight);
    assert_eq!(ctx.backend.fence_reuse_violations(), 0);
}

/// A slot is never reused while its previous submission is pending.
#[rstest]
#[case::fast(Gpu::Fast, 2)]
#[case::slow(Gpu::Slow, 2)]
#[case::slow_three(Gpu::Slow, 3)]
fn test_slot_reuse_is_exclusive(#[case] gpu: Gpu, #[case] frames_in_flight: usize) {
    let mut ctx = TestContext::small(gpu, frames_in_flight);
    let params = animated_params(8);

    for _ in 0..10 {
        ctx.render(&params);
    }

    assert!(ctx.backend.max_pending() <= frames_in_flight);
    assert_eq!(ctx.backend.fence_reuse_violations(), 0);
    assert!(ctx.scheduler.ring().in_flight_count() <= frames_in_flight);
}

/// Contexts can be created repeatedly in one process with logging enabled.
#[test]
fn test_repeated_contexts_share_logger() {
    common::init_logging();
    for _ in 0..2 {
        let mut ctx = TestContext::small(Gpu::Fast, 1);
        assert_eq!(ctx.render(&default_params()).frame_index, 0);
    }
}

/// Every submission waits on an acquire semaphore and signals a release
/// semaphore plus the slot fence.
#[test]
fn test_submission_shape() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    ctx.render(&default_params());

    let submissions = ctx.backend.submissions();
    assert_eq!(submissions.len(), 1);
    let record = &submissions[0];
    assert_eq!(record.stream_labels, vec!["main", "denoise", "compose"]);
    assert_eq!(record.wait_semaphores.len(), 1);
    assert_eq!(record.signal_semaphores.len(), 1);
    assert!(record.fence.is_some());
}

// ============================================================================
// Acceleration Structure Tests
// ============================================================================

/// 800 static instances plus a full 512 animated pool fit the 20-bit index.
#[test]
fn test_full_pool_with_800_static_instances() {
    let mut ctx = TestContext::new(
        Gpu::Fast,
        RendererConfig::new()
            .with_output_resolution(64, 64)
            .with_animated_pool_size(512),
        SceneSpec::opaque(800),
    );

    let report = ctx.render(&animated_params(512));
    assert_eq!(report.tlas.world, 1312);
    assert_eq!(report.tlas.light, 0);
    assert!(report.tlas.world < INSTANCE_INDEX_LIMIT);
    assert_eq!(ctx.scheduler.acceleration_structures().capacity(), 1312);
}

/// Animated instances beyond the pool are clamped, hidden ones excluded.
#[rstest]
#[case::hidden(0, 0)]
#[case::partial(5, 5)]
#[case::clamped(100, 16)]
fn test_animated_instance_count(#[case] requested: u32, #[case] expected: u32) {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let report = ctx.render(&animated_params(requested));
    let visible_static = SceneSpec::small().visible_static() as u32;
    assert_eq!(report.tlas.world, visible_static + expected);
}

fn read_descs(
    ctx: &TestContext,
    buffer: BufferId,
    slot: usize,
    count: u32,
) -> Vec<TlasInstanceDesc> {
    let size = std::mem::size_of::<TlasInstanceDesc>();
    let accel = ctx.scheduler.acceleration_structures();
    let handle = ctx.scheduler.registry().buffer(buffer).expect("staging").handle;
    let offset = (accel.capacity() as usize * size * slot) as u64;
    ctx.backend
        .read_buffer(handle, offset, (count as usize * size) as u64)
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Light instances are a subset of world instances and every world index is
/// its position in the world TLAS.
#[rstest]
#[case::no_forced_emission(false)]
#[case::forced_emission(true)]
fn test_instance_partition(#[case] emissive_objects: bool) {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let mut params = animated_params(16);
    params.settings.emission = true;
    params.settings.emissive_objects = emissive_objects;

    let report = ctx.render(&params);
    let accel = ctx.scheduler.acceleration_structures();
    let world = read_descs(&ctx, accel.world_staging(), report.slot, report.tlas.world);
    let light = read_descs(&ctx, accel.light_staging(), report.slot, report.tlas.light);

    let index_mask = INSTANCE_INDEX_LIMIT - 1;
    for (position, desc) in world.iter().enumerate() {
        assert_eq!(desc.custom_index() & index_mask, position as u32);
    }
    let world_ids: HashSet<u32> = world.iter().map(|d| d.custom_index()).collect();
    assert!(light.iter().all(|d| world_ids.contains(&d.custom_index())));
    assert!(report.tlas.light >= 1);
    assert!(report.tlas.light <= report.tlas.world);
    assert!(report.tlas.has_transparent);
}

/// Forced emission draws the same instances every frame.
#[test]
fn test_forced_emission_is_stable_across_frames() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let mut params = animated_params(16);
    params.settings.emission = true;
    params.settings.emissive_objects = true;

    let first = ctx.render(&params);
    let second = ctx.render(&params);
    assert_eq!(first.tlas, second.tlas);
}

// ============================================================================
// History Tests
// ============================================================================

fn history_factors(sun_elevations: &[f32]) -> Vec<f32> {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    sun_elevations
        .iter()
        .map(|&elevation| {
            let mut params = default_params();
            params.settings.sun_elevation = elevation;
            ctx.render(&params).history.factor
        })
        .collect()
}

/// The same parameter sequence always yields the same reset factors.
#[test]
fn test_history_reset_is_deterministic() {
    let elevations = [45.0, 45.0, 10.0, -5.0, -30.0, -30.0];
    let a = history_factors(&elevations);
    let b = history_factors(&elevations);
    assert_eq!(a, b);

    assert_eq!(a[0], 1.0);
    assert_eq!(a[1], 1.0);
    assert!(a[3] < 1.0);
    assert_eq!(a[5], 1.0);
}

/// Hard reset conditions drop the whole history.
#[rstest]
#[case::forced(|p: &mut RenderParams| p.force_history_reset = true)]
#[case::ortho(|p: &mut RenderParams| p.camera.ortho = true)]
#[case::reference(|p: &mut RenderParams| p.settings.denoiser_tunables.reference_accumulation = true)]
#[case::on_screen(|p: &mut RenderParams| p.settings.on_screen = 13)]
fn test_hard_history_reset(#[case] change: fn(&mut RenderParams)) {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let params = default_params();
    ctx.render(&params);

    let mut changed = params;
    change(&mut changed);
    let report = ctx.render(&changed);
    assert_eq!(report.history.factor, 0.0);
    assert!(report.history.is_reset());
    assert_eq!(report.history.max_accumulated, 0);
}

/// A replayed test case restarts accumulation.
#[test]
fn test_replayed_test_case_resets_history() {
    let path = std::env::temp_dir().join(format!("rtframe-replay-{}.bin", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let file = TestCaseFile::new(&path);

    let params = default_params();
    assert_eq!(file.append(&params.settings, &params.camera).unwrap(), 0);

    let mut ctx = TestContext::small(Gpu::Fast, 2);
    ctx.render(&params);
    ctx.render(&params);
    let case = file.load(0).unwrap();
    let report = ctx.render(&case.params());
    assert_eq!(report.history.factor, 0.0);

    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// Barrier Tests
// ============================================================================

/// No recorded image barrier is redundant.
#[test]
fn test_no_redundant_barriers() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let params = animated_params(4);
    for _ in 0..4 {
        ctx.render(&params);
    }

    for record in ctx.backend.submissions() {
        for command in &record.commands {
            let Command::Barrier { images, buffers } = command else {
                continue;
            };
            assert!(!images.is_empty() || !buffers.is_empty());
            for barrier in images {
                let storage_to_storage = barrier
                    .before
                    .access
                    .contains(AccessBits::SHADER_RESOURCE_STORAGE)
                    && barrier.after.access.contains(AccessBits::SHADER_RESOURCE_STORAGE);
                // The back buffer copy transition is recorded unconditionally.
                let copy_target = barrier.after.access == AccessBits::COPY_DESTINATION;
                assert!(
                    barrier.before != barrier.after || storage_to_storage || copy_target,
                    "redundant barrier {barrier:?}"
                );
            }
        }
    }
}

/// Steady-state frames record the same number of transitions.
#[test]
fn test_steady_state_barrier_count() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let params = default_params();
    let reports: Vec<_> = (0..5).map(|_| ctx.render(&params)).collect();

    assert!(reports[0].barriers > 0);
    // TAA history ping-pong repeats every two frames.
    assert_eq!(reports[1].barriers, reports[3].barriers);
    assert_eq!(reports[2].barriers, reports[4].barriers);

    let submissions = ctx.backend.submissions();
    assert_eq!(barrier_count(&submissions[2]), barrier_count(&submissions[4]));
}

/// Passes are recorded in pipeline order, each stream in its own batch slot.
#[test]
fn test_pass_order() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let report = ctx.render(&default_params());
    assert_eq!(report.stages, FrameStage::ALL);

    let first = &ctx.backend.submissions()[0];
    assert_eq!(
        annotations(&first.commands),
        ["IntegrateBRDF", "TLAS", "Raytracing", "Denoising", "Composition", "Temporal"]
    );
    assert!(matches!(first.commands.last(), Some(Command::Barrier { .. })));
    assert!(first.commands.iter().any(|c| matches!(c, Command::RenderUi)));

    ctx.render(&default_params());
    let second = &ctx.backend.submissions()[1];
    assert_eq!(
        annotations(&second.commands),
        ["TLAS", "Raytracing", "Denoising", "Composition", "Temporal"]
    );
}

/// The copy into the back buffer precedes the UI and the present transition.
#[test]
fn test_copy_precedes_ui() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    ctx.render(&default_params());

    let commands = &ctx.backend.submissions()[0].commands;
    let copy = commands
        .iter()
        .position(|c| matches!(c, Command::CopyImage { .. }))
        .expect("copy");
    let ui = commands
        .iter()
        .position(|c| matches!(c, Command::RenderUi))
        .expect("ui");
    assert!(copy < ui);
}

// ============================================================================
// Resolution Tests
// ============================================================================

/// Slow frames under a frame-rate floor shrink the rect and add an upsample.
#[test]
fn test_dynamic_resolution_upsamples() {
    let mut ctx = TestContext::new(
        Gpu::Fast,
        RendererConfig::new()
            .with_output_resolution(128, 64)
            .with_animated_pool_size(4)
            .with_min_fps(60.0)
            .with_max_fps(1000.0),
        SceneSpec::small(),
    );

    let mut params = default_params();
    params.settings.limit_fps = true;
    params.timing = FrameTiming {
        timestamp_ms: 0.0,
        frame_time_ms: 50.0,
        smoothed_frame_time_ms: 50.0,
    };

    let report = ctx.render(&params);
    assert!(report.resolution_scale < 1.0);
    assert!(report.rect.width < 128);

    let commands = &ctx.backend.submissions()[0].commands;
    assert_eq!(annotations(commands).last().map(String::as_str), Some("Upsample"));
    assert_eq!(
        report.final_image,
        ctx.scheduler.targets()[RenderTarget::Final]
    );
}

/// Without a frame-rate floor the resolution stays native.
#[test]
fn test_resolution_fixed_without_floor() {
    let mut ctx = TestContext::small(Gpu::Fast, 2);
    let mut params = default_params();
    params.settings.limit_fps = true;
    params.settings.max_fps = 1000.0;
    params.timing.frame_time_ms = 50.0;
    params.timing.smoothed_frame_time_ms = 50.0;

    let report = ctx.render(&params);
    assert_eq!(report.resolution_scale, 1.0);
    assert_eq!(report.rect, ctx.scheduler.resolution().screen);
}
