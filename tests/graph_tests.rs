//! Frame Graph Topology Tests
//!
//! Covers compile-time ordering: Kahn's sort with FIFO tie-break, cycle
//! detection, external-edge in-degree rules, determinism across
//! reconstruction, and the per-frame barrier emission count.

mod common;

use std::sync::Arc;

use common::{MockEncoder, MockGpu, MockWindow, Recorded, TestPass, is_identity_image_barrier};

use ember::EmberError;
use ember::gpu::{BufferUsageFlags, Gpu, MemoryUsage, PipelineStageFlags};
use ember::graph::{CreationType, FrameGraph};
use ember::resources::{BufferInstance, BufferTemplate, ImageTemplate, ResourceAllocator,
    ResourceHandle, ResourceInstance};
use ember::window::WindowSource;

fn test_graph() -> FrameGraph {
    let _ = env_logger::builder().is_test(true).try_init();
    let gpu = MockGpu::new();
    let window = MockWindow::new(800, 600);
    let allocator = Arc::new(ResourceAllocator::new(
        gpu.clone() as Arc<dyn Gpu>,
        window as Arc<dyn WindowSource>,
    ));
    FrameGraph::new(gpu as Arc<dyn Gpu>, allocator)
}

fn storage_buffer(graph: &mut FrameGraph, name: &str) -> ResourceHandle {
    graph
        .add_buffer_resource(
            BufferTemplate::new(name, 256, BufferUsageFlags::STORAGE, MemoryUsage::GpuOnly),
            CreationType::Internal,
        )
        .unwrap()
}

fn external_buffer(graph: &mut FrameGraph, name: &str, raw: u64) -> ResourceHandle {
    graph
        .import_resource(ResourceInstance::Buffer(BufferInstance::new(
            name,
            ember::gpu::BufferHandle(raw),
            0x4000 + raw,
            128,
            BufferUsageFlags::STORAGE,
            false,
        )))
        .unwrap()
}

fn sorted_names(graph: &FrameGraph) -> Vec<String> {
    graph.sorted_pass_names().map(str::to_owned).collect()
}

// ============================================================================
// Scenario 1 — linear chain
// ============================================================================

#[test]
fn linear_chain_sorts_in_dependency_order() {
    let mut graph = test_graph();
    let e1 = storage_buffer(&mut graph, "e1");
    let e2 = storage_buffer(&mut graph, "e2");

    // Insert out of dependency order on purpose.
    graph.add_pass(TestPass::new("c").reads(e2)).unwrap();
    graph.add_pass(TestPass::new("a").writes(e1)).unwrap();
    graph
        .add_pass(TestPass::new("b").reads(e1).writes(e2))
        .unwrap();
    graph.compile().unwrap();

    assert_eq!(sorted_names(&graph), ["a", "b", "c"]);
}

#[test]
fn barrier_emissions_are_node_count_plus_two() {
    let mut graph = test_graph();
    let e1 = storage_buffer(&mut graph, "e1");
    let e2 = storage_buffer(&mut graph, "e2");
    graph.add_pass(TestPass::new("a").writes(e1)).unwrap();
    graph
        .add_pass(TestPass::new("b").reads(e1).writes(e2))
        .unwrap();
    graph.add_pass(TestPass::new("c").reads(e2)).unwrap();
    graph.compile().unwrap();

    let mut encoder = MockEncoder::new();
    graph.execute(&mut encoder).unwrap();
    assert_eq!(encoder.barriers().len(), 3 + 2);

    // The first and last emissions are the frame-boundary memory
    // barriers interlocking with host writes.
    let barriers = encoder.barriers();
    let start = &barriers[0];
    let end = barriers.last().unwrap();
    assert_eq!(start.memory.len(), 1);
    assert_eq!(start.memory[0].src_stage, PipelineStageFlags::HOST);
    assert_eq!(end.memory.len(), 1);
    assert_eq!(end.memory[0].dst_stage, PipelineStageFlags::HOST);
}

#[test]
fn execute_wraps_each_pass_in_a_debug_label() {
    let mut graph = test_graph();
    let e1 = storage_buffer(&mut graph, "e1");
    graph.add_pass(TestPass::new("solo").writes(e1)).unwrap();
    graph.compile().unwrap();

    let mut encoder = MockEncoder::new();
    graph.execute(&mut encoder).unwrap();
    let commands = encoder.commands();
    assert!(commands.contains(&Recorded::BeginLabel("solo".into())));
    assert_eq!(
        commands.iter().filter(|c| matches!(c, Recorded::EndLabel)).count(),
        1
    );
}

// ============================================================================
// Scenario 2 — diamond
// ============================================================================

#[test]
fn diamond_keeps_insertion_order_between_independent_passes() {
    let mut graph = test_graph();
    let e1 = graph
        .add_image_resource(ImageTemplate::new("e1"), CreationType::Internal)
        .unwrap();
    let e2a = storage_buffer(&mut graph, "e2a");
    let e2b = storage_buffer(&mut graph, "e2b");

    graph.add_pass(TestPass::new("a").writes(e1)).unwrap();
    graph
        .add_pass(TestPass::new("b").reads(e1).writes(e2a))
        .unwrap();
    graph
        .add_pass(TestPass::new("c").reads(e1).writes(e2b))
        .unwrap();
    graph
        .add_pass(TestPass::new("d").reads(e2a).reads(e2b))
        .unwrap();
    graph.compile().unwrap();

    let names = sorted_names(&graph);
    assert_eq!(names, ["a", "b", "c", "d"]);

    // Writers appear before every reader of their edges.
    assert!(graph.depends_on("b", "a"));
    assert!(graph.depends_on("c", "a"));
    assert!(graph.depends_on("d", "b"));
    assert!(graph.depends_on("d", "c"));
    assert!(!graph.depends_on("a", "d"));
}

#[test]
fn diamond_transitions_shared_read_image_exactly_once() {
    let mut graph = test_graph();
    let e1 = graph
        .add_image_resource(ImageTemplate::new("e1"), CreationType::Internal)
        .unwrap();
    let e2a = storage_buffer(&mut graph, "e2a");
    let e2b = storage_buffer(&mut graph, "e2b");

    graph.add_pass(TestPass::new("a").writes(e1)).unwrap();
    graph
        .add_pass(TestPass::new("b").reads(e1).writes(e2a))
        .unwrap();
    graph
        .add_pass(TestPass::new("c").reads(e1).writes(e2b))
        .unwrap();
    graph
        .add_pass(TestPass::new("d").reads(e2a).reads(e2b))
        .unwrap();
    graph.compile().unwrap();

    let mut encoder = MockEncoder::new();
    graph.execute(&mut encoder).unwrap();
    let barriers = encoder.barriers();

    // Emissions: frame-start, a, b, c, d, frame-end.
    let b_dep = &barriers[2];
    let c_dep = &barriers[3];
    let b_e1 = &b_dep.images[0];
    let c_e1 = &c_dep.images[0];

    // The first reader performs the real transition into the read layout;
    // the second reader's barrier is an identity barrier.
    assert_ne!(b_e1.old_layout, b_e1.new_layout);
    assert_eq!(
        b_e1.new_layout,
        ember::gpu::ImageLayout::ShaderReadOnlyOptimal
    );
    assert!(is_identity_image_barrier(c_e1));
    assert_eq!(
        c_e1.new_layout,
        ember::gpu::ImageLayout::ShaderReadOnlyOptimal
    );
}

// ============================================================================
// Scenario 3 — cycle
// ============================================================================

#[test]
fn cycle_is_a_topology_error() {
    let mut graph = test_graph();
    let e1 = storage_buffer(&mut graph, "e1");
    let e2 = storage_buffer(&mut graph, "e2");

    graph
        .add_pass(TestPass::new("a").reads(e1).writes(e2))
        .unwrap();
    graph
        .add_pass(TestPass::new("b").reads(e2).writes(e1))
        .unwrap();

    let err = graph.compile().unwrap_err();
    match err {
        EmberError::Topology(message) => {
            assert!(
                message.contains("'a'") || message.contains("'b'"),
                "cycle diagnostic should name an involved pass: {message}"
            );
        }
        other => panic!("expected a topology error, got {other:?}"),
    }

    // The failed compile must not leave a partially ordered graph behind.
    assert_eq!(graph.sorted_pass_names().count(), 0);
    let mut encoder = MockEncoder::new();
    assert!(graph.execute(&mut encoder).is_err());
}

// ============================================================================
// Scenario 4 / boundary — external edges
// ============================================================================

#[test]
fn external_only_read_does_not_gate_scheduling() {
    let mut graph = test_graph();
    let e1 = external_buffer(&mut graph, "camera", 900);
    graph.add_pass(TestPass::new("a").reads(e1)).unwrap();
    graph.compile().unwrap();

    assert_eq!(sorted_names(&graph), ["a"]);

    let mut encoder = MockEncoder::new();
    graph.execute(&mut encoder).unwrap();
    let barriers = encoder.barriers();

    // Before the pass executes, the external buffer transitions from its
    // initial state using the frame-start source stage.
    let a_dep = &barriers[1];
    assert_eq!(a_dep.buffers.len(), 1);
    assert_eq!(a_dep.buffers[0].src_stage, PipelineStageFlags::TOP_OF_PIPE);
    assert!(a_dep.buffers[0].src_access.is_empty());
}

#[test]
fn all_external_graph_preserves_insertion_order() {
    let mut graph = test_graph();
    let cam = external_buffer(&mut graph, "camera", 901);
    let lights = external_buffer(&mut graph, "lights", 902);

    graph
        .add_pass(TestPass::new("z").reads(cam).reads(lights))
        .unwrap();
    graph.add_pass(TestPass::new("m").reads(cam)).unwrap();
    graph.add_pass(TestPass::new("a").reads(lights)).unwrap();
    graph.compile().unwrap();

    assert_eq!(sorted_names(&graph), ["z", "m", "a"]);
}

#[test]
fn in_graph_writer_of_external_edge_still_orders_readers() {
    let mut graph = test_graph();
    let task_commands = external_buffer(&mut graph, "task_commands", 903);

    graph
        .add_pass(TestPass::new("consumer").reads(task_commands))
        .unwrap();
    graph
        .add_pass(TestPass::new("producer").writes(task_commands))
        .unwrap();
    graph.compile().unwrap();

    assert_eq!(sorted_names(&graph), ["producer", "consumer"]);
}

// ============================================================================
// Determinism and idempotence
// ============================================================================

fn build_reference_graph() -> FrameGraph {
    let mut graph = test_graph();
    let e1 = graph
        .add_image_resource(ImageTemplate::new("e1"), CreationType::Internal)
        .unwrap();
    let e2 = storage_buffer(&mut graph, "e2");
    let e3 = storage_buffer(&mut graph, "e3");
    graph.add_pass(TestPass::new("a").writes(e1)).unwrap();
    graph
        .add_pass(TestPass::new("b").reads(e1).writes(e2))
        .unwrap();
    graph
        .add_pass(TestPass::new("c").reads(e1).writes(e3))
        .unwrap();
    graph
        .add_pass(TestPass::new("d").reads(e2).reads(e3))
        .unwrap();
    graph.compile().unwrap();
    graph
}

#[test]
fn reconstruction_reproduces_order_and_barriers() {
    let mut first = build_reference_graph();
    let mut second = build_reference_graph();

    assert_eq!(sorted_names(&first), sorted_names(&second));

    let mut first_encoder = MockEncoder::new();
    first.execute(&mut first_encoder).unwrap();
    let mut second_encoder = MockEncoder::new();
    second.execute(&mut second_encoder).unwrap();

    assert_eq!(first_encoder.barriers(), second_encoder.barriers());
}

#[test]
fn repeated_frames_emit_identical_barrier_sequences() {
    let mut graph = build_reference_graph();

    // The first frame starts from freshly initialized resources; from the
    // second frame on the state cycle has converged and every frame must
    // replay the same barrier sequence.
    let mut encoder = MockEncoder::new();
    graph.execute(&mut encoder).unwrap();
    encoder.clear();
    graph.execute(&mut encoder).unwrap();
    let second = encoder.barriers();
    encoder.clear();
    graph.execute(&mut encoder).unwrap();
    let third = encoder.barriers();

    assert_eq!(second.len(), 4 + 2);
    assert_eq!(second, third);
}

#[test]
fn compile_is_idempotent() {
    let mut graph = build_reference_graph();
    let before = sorted_names(&graph);
    graph.compile().unwrap();
    assert_eq!(sorted_names(&graph), before);
}

#[test]
fn adds_after_compile_are_rejected() {
    let mut graph = build_reference_graph();
    let err = graph.add_pass(TestPass::new("late")).unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
    let err = graph
        .add_image_resource(ImageTemplate::new("late_image"), CreationType::Internal)
        .unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
}

#[test]
fn unknown_binding_handle_fails_compile() {
    let mut graph = test_graph();
    // Handle minted by a different graph's registry.
    let foreign = {
        let mut other = test_graph();
        storage_buffer(&mut other, "foreign")
    };
    graph.add_pass(TestPass::new("a").reads(foreign)).unwrap();
    let err = graph.compile().unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
}
