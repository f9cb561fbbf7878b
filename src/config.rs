//! Render Configuration
//!
//! Feature toggles and tunable parameters read by render passes at
//! execute time through providers. The host obtains a mutable reference
//! via [`RenderEngine::config_mut`](crate::engine::RenderEngine::config_mut)
//! and changes take effect on the next frame; nothing here requires a
//! graph rebuild.

/// Ambient-occlusion parameters.
#[derive(Debug, Clone, Copy)]
pub struct SsaoConfig {
    pub enabled: bool,
    /// Sampling radius in view-space units.
    pub radius: f32,
    /// Occlusion strength multiplier applied in the lighting pass.
    pub strength: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            strength: 1.0,
        }
    }
}

/// Volumetric lighting parameters for the froxel chain.
#[derive(Debug, Clone, Copy)]
pub struct VolumetricConfig {
    pub enabled: bool,
    /// Uniform fog density.
    pub density: f32,
    /// Henyey-Greenstein scattering anisotropy, in `[-1, 1]`.
    pub anisotropy: f32,
    /// Per-frame jitter amplitude for the noise pass.
    pub noise_scale: f32,
}

impl Default for VolumetricConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            density: 0.02,
            anisotropy: 0.35,
            noise_scale: 1.0,
        }
    }
}

/// Auto-exposure parameters for the luminance adaptation chain.
#[derive(Debug, Clone, Copy)]
pub struct LuminanceConfig {
    /// Adaptation speed in f-stops per second.
    pub adaptation_speed: f32,
    pub min_log_luminance: f32,
    pub max_log_luminance: f32,
}

impl Default for LuminanceConfig {
    fn default() -> Self {
        Self {
            adaptation_speed: 1.1,
            min_log_luminance: -10.0,
            max_log_luminance: 2.0,
        }
    }
}

/// Tone-mapping parameters.
#[derive(Debug, Clone, Copy)]
pub struct HdrConfig {
    /// Exposure bias in f-stops applied before the tone curve.
    pub exposure: f32,
    /// Output gamma.
    pub gamma: f32,
    /// Blends between plain exposure mapping (0) and the filmic curve (1).
    pub filmic_strength: f32,
}

impl Default for HdrConfig {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            gamma: 2.2,
            filmic_strength: 1.0,
        }
    }
}

/// Configuration options for the rendering system.
///
/// Pass-level toggles disable the *work* of a pass, not its place in the
/// compiled graph: a disabled pass still executes its barriers so resource
/// state stays converged across frames.
#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    pub ssao: SsaoConfig,
    pub volumetric: VolumetricConfig,
    pub luminance: LuminanceConfig,
    pub hdr: HdrConfig,

    /// Whether the skybox pass draws.
    pub skybox_enabled: bool,

    /// Vertical synchronization for the presentation engine.
    pub vsync: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ssao: SsaoConfig::default(),
            volumetric: VolumetricConfig::default(),
            luminance: LuminanceConfig::default(),
            hdr: HdrConfig::default(),
            skybox_enabled: true,
            vsync: true,
        }
    }
}
