//! Frame Coordinator Tests
//!
//! One frame end to end against the mock device: record, blit, submit,
//! present; stale-swapchain recovery and the relative-resource rebuild on
//! resize.

mod common;

use std::sync::Arc;

use common::{MockGpu, MockWindow, Recorded, TestPass};

use ember::frame::FrameData;
use ember::gpu::{Gpu, ImageLayout};
use ember::graph::{CreationType, FrameGraph};
use ember::resources::{ImageTemplate, ResourceAllocator, ResourceHandle};
use ember::window::WindowSource;

struct Fixture {
    gpu: Arc<MockGpu>,
    window: Arc<MockWindow>,
    allocator: Arc<ResourceAllocator>,
    graph: FrameGraph,
    frames: FrameData,
    final_image: ResourceHandle,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let gpu = MockGpu::new();
    let window = MockWindow::new(800, 600);
    let allocator = Arc::new(ResourceAllocator::new(
        gpu.clone() as Arc<dyn Gpu>,
        window.clone() as Arc<dyn WindowSource>,
    ));
    let mut graph = FrameGraph::new(gpu.clone() as Arc<dyn Gpu>, allocator.clone());
    let final_image = graph
        .add_image_resource(ImageTemplate::new("scene_final"), CreationType::Internal)
        .unwrap();
    graph
        .add_pass(TestPass::new("tone_map").writes(final_image))
        .unwrap();
    graph.compile().unwrap();
    let frames = FrameData::new(gpu.clone() as Arc<dyn Gpu>, window.clone() as Arc<dyn WindowSource>)
        .unwrap();
    Fixture {
        gpu,
        window,
        allocator,
        graph,
        frames,
        final_image,
    }
}

#[test]
fn one_frame_records_blit_submit_present() {
    let mut fx = fixture();
    fx.frames
        .render_frame(&fx.allocator, &mut fx.graph, fx.final_image, true, None)
        .unwrap();

    let commands = fx.gpu.commands();
    let blit_index = commands
        .iter()
        .position(|c| matches!(c, Recorded::Blit(_)))
        .expect("final image blit recorded");
    let submit_index = commands
        .iter()
        .position(|c| matches!(c, Recorded::Submit))
        .expect("queue submit recorded");
    let present_index = commands
        .iter()
        .position(|c| matches!(c, Recorded::Present(0)))
        .expect("present recorded");
    assert!(blit_index < submit_index && submit_index < present_index);

    // The blit sources the graph's final image in transfer-src layout.
    let final_instance = fx.graph.registry().image(fx.final_image);
    if let Recorded::Blit(region) = &commands[blit_index] {
        assert_eq!(region.src, final_instance.image());
        assert_eq!(region.src_layout, ImageLayout::TransferSrcOptimal);
    }
    assert_eq!(final_instance.state().layout, ImageLayout::TransferSrcOptimal);

    // The swapchain image ends up in present layout.
    let present_transition = commands.iter().rev().find_map(|c| match c {
        Recorded::PipelineBarrier(dep) => dep
            .images
            .iter()
            .find(|b| b.new_layout == ImageLayout::PresentSrc)
            .copied(),
        _ => None,
    });
    assert!(present_transition.is_some());

    assert_eq!(fx.frames.frame_counter(), 1);
}

#[test]
fn stale_acquire_drops_the_frame_and_recovers() {
    let mut fx = fixture();
    fx.gpu.make_stale(1);

    fx.frames
        .render_frame(&fx.allocator, &mut fx.graph, fx.final_image, true, None)
        .unwrap();
    assert_eq!(fx.frames.frame_counter(), 0);
    assert!(!fx.gpu.commands().iter().any(|c| matches!(c, Recorded::Submit)));

    // The next frame rebuilds the swapchain at the new window size and
    // the window-relative final image follows it.
    fx.window.resize(1024, 768);
    fx.frames
        .render_frame(&fx.allocator, &mut fx.graph, fx.final_image, true, None)
        .unwrap();
    assert_eq!(fx.frames.frame_counter(), 1);
    assert!(fx.gpu.commands().iter().any(|c| matches!(c, Recorded::Present(0))));

    let rebuilt = fx.graph.registry().image(fx.final_image).extent();
    assert_eq!((rebuilt.width, rebuilt.height), (1024, 768));
    assert_eq!(fx.gpu.swapchain_extent(), ember::gpu::Extent2d::new(1024, 768));
}

#[test]
fn minimized_window_keeps_frames_parked() {
    let mut fx = fixture();
    fx.gpu.make_stale(1);
    fx.frames
        .render_frame(&fx.allocator, &mut fx.graph, fx.final_image, true, None)
        .unwrap();

    fx.window.resize(0, 0);
    fx.frames
        .render_frame(&fx.allocator, &mut fx.graph, fx.final_image, true, None)
        .unwrap();
    // Still no frame: the rebuild stays pending until the window has area.
    assert_eq!(fx.frames.frame_counter(), 0);
}
