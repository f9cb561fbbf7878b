//! Resource Registry
//!
//! Owns every live [`ResourceInstance`], indexed by its stable 64-bit
//! handle. Handles are minted monotonically starting at 1 and never
//! reused; the registry never removes entries during normal operation and
//! is torn down wholesale with the frame graph.
//!
//! The registry also caches compiled shader modules by path so passes that
//! share a shader do not recompile it; the cache is cleared (and the
//! modules destroyed) once every pipeline has been built.

use std::path::{Path, PathBuf};

use log::debug;
use rustc_hash::FxHashMap;

use crate::errors::{EmberError, Result};
use crate::gpu::{Gpu, ShaderModuleHandle};

use super::instance::{
    BufferInstance, ImageInstance, ResourceHandle, ResourceInstance, SamplerInstance,
};

#[derive(Default)]
pub struct ResourceRegistry {
    resources: FxHashMap<u64, ResourceInstance>,
    next_handle: u64,
    shader_cache: FxHashMap<PathBuf, ShaderModuleHandle>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: FxHashMap::default(),
            next_handle: 1,
            shader_cache: FxHashMap::default(),
        }
    }

    /// Inserts an instance and returns its freshly minted handle.
    pub fn add(&mut self, instance: ResourceInstance) -> ResourceHandle {
        let handle = ResourceHandle::from_raw(self.next_handle)
            .unwrap_or_else(|| unreachable!("handle counter starts at 1"));
        self.next_handle += 1;
        debug!("registry: add '{}' as handle {}", instance.name(), handle.raw());
        let previous = self.resources.insert(handle.raw(), instance);
        assert!(previous.is_none(), "duplicate resource handle");
        handle
    }

    /// Looks up an instance.
    ///
    /// # Panics
    ///
    /// Panics if the handle was never added; handles are only minted by
    /// [`add`](Self::add), so this indicates a programming error.
    #[must_use]
    pub fn get(&self, handle: ResourceHandle) -> &ResourceInstance {
        self.resources
            .get(&handle.raw())
            .unwrap_or_else(|| panic!("unknown resource handle {}", handle.raw()))
    }

    /// Fallible lookup for validation paths that report configuration
    /// errors instead of panicking.
    #[must_use]
    pub fn try_get(&self, handle: ResourceHandle) -> Option<&ResourceInstance> {
        self.resources.get(&handle.raw())
    }

    /// Looks up an image instance.
    ///
    /// # Panics
    ///
    /// Panics if the handle is unknown or does not refer to an image.
    #[must_use]
    pub fn image(&self, handle: ResourceHandle) -> &ImageInstance {
        self.get(handle)
            .as_image()
            .unwrap_or_else(|| panic!("resource {} is not an image", handle.raw()))
    }

    /// Looks up a buffer instance.
    ///
    /// # Panics
    ///
    /// Panics if the handle is unknown or does not refer to a buffer.
    #[must_use]
    pub fn buffer(&self, handle: ResourceHandle) -> &BufferInstance {
        self.get(handle)
            .as_buffer()
            .unwrap_or_else(|| panic!("resource {} is not a buffer", handle.raw()))
    }

    /// Looks up a sampler instance.
    ///
    /// # Panics
    ///
    /// Panics if the handle is unknown or does not refer to a sampler.
    #[must_use]
    pub fn sampler(&self, handle: ResourceHandle) -> &SamplerInstance {
        self.get(handle)
            .as_sampler()
            .unwrap_or_else(|| panic!("resource {} is not a sampler", handle.raw()))
    }

    pub(crate) fn get_mut(&mut self, handle: ResourceHandle) -> &mut ResourceInstance {
        self.resources
            .get_mut(&handle.raw())
            .unwrap_or_else(|| panic!("unknown resource handle {}", handle.raw()))
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterates over all (handle, instance) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceHandle, &ResourceInstance)> {
        self.resources.iter().map(|(&raw, instance)| {
            let handle = ResourceHandle::from_raw(raw)
                .unwrap_or_else(|| unreachable!("registry keys are nonzero"));
            (handle, instance)
        })
    }

    // ------------------------------------------------------------------
    // Shader module cache
    // ------------------------------------------------------------------

    /// Loads (or returns the cached) shader module for `path`.
    pub fn shader(&mut self, gpu: &dyn Gpu, path: &Path) -> Result<ShaderModuleHandle> {
        if let Some(&module) = self.shader_cache.get(path) {
            return Ok(module);
        }
        let code = std::fs::read(path).map_err(|err| {
            EmberError::Allocation(format!("cannot read shader '{}': {err}", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let module = gpu.create_shader_module(&name, &code)?;
        debug!("registry: compiled shader module '{name}'");
        self.shader_cache.insert(path.to_path_buf(), module);
        Ok(module)
    }

    /// Destroys all cached shader modules. Called once pipeline
    /// construction has finished.
    pub fn clear_shader_cache(&mut self, gpu: &dyn Gpu) {
        for (_, module) in self.shader_cache.drain() {
            gpu.destroy_shader_module(module);
        }
    }
}
