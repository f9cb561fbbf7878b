//! Frame Graph
//!
//! The declarative, per-frame directed acyclic graph of render passes and
//! the resources they consume and produce. Resources are *edges* keyed by
//! their registry handle; passes are *nodes*. `compile` derives the edge
//! topology from each pass's declared bindings and orders the nodes with
//! Kahn's algorithm (FIFO tie-break, so execution order is deterministic
//! and respects insertion order among independent passes). `execute`
//! replays the sorted nodes into a command buffer, letting the
//! synchronization manager inject barriers between them.

pub mod passes;
pub mod sync;

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{EmberError, Result};
use crate::gpu::{AllocatedImage, CommandEncoder, Gpu};
use crate::resources::{
    BufferTemplate, ImageSize, ImageTemplate, ResourceAllocator, ResourceHandle, ResourceInstance,
    ResourceRegistry, ResourceUsage, SamplerTemplate,
};

use passes::{ExecuteContext, RenderPass};
use sync::{SynchronizationManager, frame_end_dependency, frame_start_dependency};

/// Who owns a graph resource.
///
/// Internal resources are created and destroyed by the graph. External
/// resources belong to another subsystem; the graph only references them,
/// and they do not count as dependencies unless an in-graph pass produces
/// into them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CreationType {
    Internal,
    External,
}

type NodeSet = SmallVec<[usize; 4]>;

struct Edge {
    handle: ResourceHandle,
    creation_type: CreationType,
    producers: NodeSet,
    consumers: NodeSet,
}

struct Node {
    pass: Box<dyn RenderPass>,
}

pub struct FrameGraph {
    gpu: Arc<dyn Gpu>,
    allocator: Arc<ResourceAllocator>,
    registry: ResourceRegistry,
    sync: SynchronizationManager,
    nodes: Vec<Node>,
    edges: FxHashMap<u64, Edge>,
    sorted: Vec<usize>,
    /// Relative-sized internal images kept with their templates so they
    /// can be rebuilt after a window resize.
    relative_images: Vec<(ResourceHandle, ImageTemplate)>,
    compiled: bool,
    frame_index: u64,
}

impl FrameGraph {
    #[must_use]
    pub fn new(gpu: Arc<dyn Gpu>, allocator: Arc<ResourceAllocator>) -> Self {
        Self {
            gpu,
            allocator,
            registry: ResourceRegistry::new(),
            sync: SynchronizationManager::new(),
            nodes: Vec::new(),
            edges: FxHashMap::default(),
            sorted: Vec::new(),
            relative_images: Vec::new(),
            compiled: false,
            frame_index: 0,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Mutable registry access, used while constructing passes (shader
    /// cache) before the graph is compiled.
    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    /// Number of passes added so far.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.nodes.len()
    }

    /// Pass names in compiled execution order. Empty before `compile`.
    pub fn sorted_pass_names(&self) -> impl Iterator<Item = &str> {
        self.sorted
            .iter()
            .map(|&index| self.nodes[index].pass.name())
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Appends a pass as a graph node.
    pub fn add_pass(&mut self, pass: impl RenderPass + 'static) -> Result<()> {
        if self.compiled {
            return Err(EmberError::Config(format!(
                "cannot add pass '{}' after compile",
                pass.name()
            )));
        }
        trace!("graph: add pass '{}'", pass.name());
        self.nodes.push(Node {
            pass: Box::new(pass),
        });
        Ok(())
    }

    /// Creates an image from a template and tracks it as an edge.
    pub fn add_image_resource(
        &mut self,
        template: ImageTemplate,
        creation_type: CreationType,
    ) -> Result<ResourceHandle> {
        let instance = self.allocator.create_image(&template)?;
        let handle = self.insert_edge(ResourceInstance::Image(instance), creation_type)?;
        if matches!(template.size, ImageSize::Relative(_)) {
            self.relative_images.push((handle, template));
        }
        Ok(handle)
    }

    /// Creates a buffer from a template and tracks it as an edge.
    pub fn add_buffer_resource(
        &mut self,
        template: BufferTemplate,
        creation_type: CreationType,
    ) -> Result<ResourceHandle> {
        let instance = self.allocator.create_buffer(&template)?;
        self.insert_edge(ResourceInstance::Buffer(instance), creation_type)
    }

    /// Creates an immutable sampler and tracks it as an edge.
    pub fn add_sampler_resource(&mut self, template: SamplerTemplate) -> Result<ResourceHandle> {
        let instance = self.allocator.create_sampler(&template)?;
        self.insert_edge(ResourceInstance::Sampler(instance), CreationType::Internal)
    }

    /// Re-exports an externally owned instance as a graph edge.
    pub fn import_resource(&mut self, instance: ResourceInstance) -> Result<ResourceHandle> {
        self.insert_edge(instance, CreationType::External)
    }

    fn insert_edge(
        &mut self,
        instance: ResourceInstance,
        creation_type: CreationType,
    ) -> Result<ResourceHandle> {
        if self.compiled {
            return Err(EmberError::Config(format!(
                "cannot add resource '{}' after compile",
                instance.name()
            )));
        }
        let handle = self.registry.add(instance);
        let previous = self.edges.insert(
            handle.raw(),
            Edge {
                handle,
                creation_type,
                producers: NodeSet::new(),
                consumers: NodeSet::new(),
            },
        );
        debug_assert!(previous.is_none(), "registry handles are unique");
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Compile
    // ------------------------------------------------------------------

    /// Fills edge producer/consumer sets from the passes' declared bindings
    /// and topologically orders the nodes. Idempotent; on error the graph
    /// topology is left untouched.
    pub fn compile(&mut self) -> Result<()> {
        if self.compiled {
            return Ok(());
        }

        // Producer/consumer fill, computed aside so a failed compile does
        // not partially mutate the graph.
        let mut producers: FxHashMap<u64, NodeSet> = FxHashMap::default();
        let mut consumers: FxHashMap<u64, NodeSet> = FxHashMap::default();

        for (node_index, node) in self.nodes.iter().enumerate() {
            for (usage, map) in [
                (ResourceUsage::Read, &mut consumers),
                (ResourceUsage::Write, &mut producers),
            ] {
                for binding in node.pass.resources(usage) {
                    if self.registry.try_get(binding.resource).is_none()
                        || !self.edges.contains_key(&binding.resource.raw())
                    {
                        return Err(EmberError::Config(format!(
                            "pass '{}' binds resource {} which is not a graph edge",
                            node.pass.name(),
                            binding.resource.raw()
                        )));
                    }
                    let entry = map.entry(binding.resource.raw()).or_default();
                    if !entry.contains(&node_index) {
                        entry.push(node_index);
                    }
                }
            }
        }

        // In-degree counts one dependency per in-graph producer of each
        // consumed edge. External edges nobody in the graph writes
        // contribute nothing.
        let mut in_degree = vec![0usize; self.nodes.len()];
        for (raw, edge_consumers) in &consumers {
            let producer_count = producers.get(raw).map_or(0, |edge_producers| edge_producers.len());
            for &consumer in edge_consumers {
                // A collapsed read-modify-write never declares the same
                // node as both producer and consumer, so no self-edge
                // exclusion is needed here.
                in_degree[consumer] += producer_count;
            }
        }

        // Kahn's algorithm; the queue is seeded in insertion order and
        // drained FIFO, which makes the order deterministic.
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&index| in_degree[index] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            sorted.push(current);
            for binding in self.nodes[current].pass.resources(ResourceUsage::Write) {
                let raw = binding.resource.raw();
                // Multiple write bindings of one edge were deduplicated in
                // the producer fill; decrement once per produced edge.
                if producers.get(&raw).is_some_and(|p| p.contains(&current)) {
                    if let Some(edge_consumers) = consumers.get(&raw) {
                        for &successor in edge_consumers {
                            in_degree[successor] -= 1;
                            if in_degree[successor] == 0 {
                                queue.push_back(successor);
                            }
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .find(|index| !sorted.contains(index))
                .map_or("<unknown>", |index| self.nodes[index].pass.name());
            return Err(EmberError::Topology(format!(
                "cycle detected in the frame graph involving pass '{stuck}'"
            )));
        }

        // Success; commit the topology.
        for (raw, edge) in &mut self.edges {
            edge.producers = producers.remove(raw).unwrap_or_default();
            edge.consumers = consumers.remove(raw).unwrap_or_default();
        }
        self.sorted = sorted;
        self.compiled = true;
        debug!(
            "graph: compiled {} passes: [{}]",
            self.nodes.len(),
            self.sorted_pass_names().collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }

    /// A node's write bindings can target the same edge as another node;
    /// true when `writer` is recorded as a producer of any edge `reader`
    /// consumes. Exposed for tests and debugging tools.
    #[must_use]
    pub fn depends_on(&self, reader: &str, writer: &str) -> bool {
        let find = |name: &str| {
            self.nodes
                .iter()
                .position(|node| node.pass.name() == name)
        };
        let (Some(reader), Some(writer)) = (find(reader), find(writer)) else {
            return false;
        };
        self.edges
            .values()
            .any(|edge| edge.producers.contains(&writer) && edge.consumers.contains(&reader))
    }

    // ------------------------------------------------------------------
    // Execute
    // ------------------------------------------------------------------

    /// Executes the compiled graph into a command buffer: frame-start
    /// barrier, then per node barrier synthesis, debug label, pass
    /// execution; finally the frame-end barrier.
    pub fn execute(&mut self, cmd: &mut dyn CommandEncoder) -> Result<()> {
        if !self.compiled {
            return Err(EmberError::Config(
                "frame graph must be compiled before execute".into(),
            ));
        }

        cmd.pipeline_barrier(&frame_start_dependency());

        let ctx = ExecuteContext {
            registry: &self.registry,
            frame_index: self.frame_index,
        };
        for &index in &self.sorted {
            let node = &mut self.nodes[index];
            self.sync
                .synchronize_resources(node.pass.as_ref(), &self.registry, cmd);
            cmd.begin_label(node.pass.name());
            let result = node.pass.execute(&ctx, cmd);
            cmd.end_label();
            result?;
        }

        cmd.pipeline_barrier(&frame_end_dependency());
        self.frame_index += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resize and teardown
    // ------------------------------------------------------------------

    /// Rebuilds every relative-sized internal image at the current window
    /// extent. Called by the frame coordinator after a swapchain rebuild;
    /// must not run while a frame is recording.
    pub fn rebuild_relative_resources(&mut self) -> Result<()> {
        for (handle, template) in &self.relative_images {
            let instance = self.registry.get_mut(*handle);
            let ResourceInstance::Image(image) = instance else {
                continue;
            };
            self.allocator.recreate_image(image, template)?;
        }
        Ok(())
    }

    /// Destroys every internal resource and every pass-owned pipeline.
    /// External instances are left to their owners.
    pub fn destroy(&mut self) {
        for node in &mut self.nodes {
            node.pass.destroy(self.gpu.as_ref());
        }
        for edge in self.edges.values() {
            if edge.creation_type != CreationType::Internal {
                continue;
            }
            match self.registry.get(edge.handle) {
                ResourceInstance::Image(image) => self.gpu.destroy_image(AllocatedImage {
                    image: image.image(),
                    view: image.view(),
                }),
                ResourceInstance::Buffer(buffer) => self.gpu.destroy_buffer(buffer.buffer()),
                ResourceInstance::Sampler(sampler) => self.gpu.destroy_sampler(sampler.sampler()),
                // Array elements belong to the array's external owner.
                ResourceInstance::ImageArray(_) => {}
            }
        }
        self.registry.clear_shader_cache(self.gpu.as_ref());
    }
}
