use bevy::prelude::*;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Largest texture edge wgpu guarantees on every backend
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Upper bound on simulated particles (one texel each)
pub const MAX_PARTICLES: u32 = 1 << 20;

/// GPU particle flow field
#[derive(Parser, Debug, Clone)]
#[command(name = "flow_field_particles", version, about)]
pub struct Cli {
    /// Show the debug panel.
    #[arg(long, env = "FLOW_FIELD_DEBUG")]
    pub debug: bool,

    /// Run the simulation pass on the CPU instead of a compute shader.
    #[arg(long)]
    pub cpu: bool,

    /// Simulation texture width.
    #[arg(long, default_value_t = 512)]
    pub width: u32,

    /// Simulation texture height.
    #[arg(long, default_value_t = 1)]
    pub height: u32,

    /// Seed for the initial particle state. Random when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sprite size in world units.
    #[arg(long, default_value_t = 0.02)]
    pub particle_size: f32,

    /// Global particle opacity.
    #[arg(long, default_value_t = 0.8)]
    pub alpha: f32,

    /// Scale of the fixed per-particle position jitter.
    #[arg(long, default_value_t = 0.02)]
    pub position_randomness: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("flow field dimensions must be non-zero, got {width}x{height}")]
    EmptyFlowField { width: u32, height: u32 },

    #[error("flow field edge of {0} texels exceeds the {MAX_TEXTURE_DIMENSION} texture limit")]
    DimensionTooLarge(u32),

    #[error("flow field of {width}x{height} texels exceeds the {MAX_PARTICLES} particle limit")]
    TooManyParticles { width: u32, height: u32 },

    #[error("particle size must be positive, got {0}")]
    InvalidParticleSize(f32),

    #[error("particle alpha must be within [0, 1], got {0}")]
    InvalidAlpha(f32),

    #[error("position randomness must not be negative, got {0}")]
    InvalidPositionRandomness(f32),
}

/// Where the simulation pass is evaluated
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SimulationBackend {
    #[default]
    Gpu,
    Cpu,
}

impl SimulationBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationBackend::Gpu => "GPU (Compute Shader)",
            SimulationBackend::Cpu => "CPU (Perlin Noise)",
        }
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct FlowFieldSettings {
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
    pub backend: SimulationBackend,
}

impl Default for FlowFieldSettings {
    fn default() -> Self {
        Self {
            width: 512,
            height: 1,
            seed: None,
            backend: SimulationBackend::Gpu,
        }
    }
}

impl FlowFieldSettings {
    /// Number of particles, one per simulation texel
    pub fn size(&self) -> u32 {
        self.width * self.height
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct ParticleSettings {
    pub size: f32,
    pub alpha: f32,
    pub position_randomness: f32,
    pub seed: Option<u64>,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            size: 0.02,
            alpha: 0.8,
            position_randomness: 0.02,
            seed: None,
        }
    }
}

/// Validated application settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub debug: bool,
    pub flow_field: FlowFieldSettings,
    pub particles: ParticleSettings,
}

impl TryFrom<Cli> for Settings {
    type Error = SettingsError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let (width, height) = (cli.width, cli.height);
        if width == 0 || height == 0 {
            return Err(SettingsError::EmptyFlowField { width, height });
        }
        if let Some(edge) = [width, height].into_iter().find(|&e| e > MAX_TEXTURE_DIMENSION) {
            return Err(SettingsError::DimensionTooLarge(edge));
        }
        if width.checked_mul(height).is_none_or(|size| size > MAX_PARTICLES) {
            return Err(SettingsError::TooManyParticles { width, height });
        }
        if !(cli.particle_size > 0.0) {
            return Err(SettingsError::InvalidParticleSize(cli.particle_size));
        }
        if !(0.0..=1.0).contains(&cli.alpha) {
            return Err(SettingsError::InvalidAlpha(cli.alpha));
        }
        if !(cli.position_randomness >= 0.0) {
            return Err(SettingsError::InvalidPositionRandomness(
                cli.position_randomness,
            ));
        }

        let backend = if cli.cpu {
            SimulationBackend::Cpu
        } else {
            SimulationBackend::Gpu
        };

        Ok(Self {
            debug: cli.debug,
            flow_field: FlowFieldSettings {
                width,
                height,
                seed: cli.seed,
                backend,
            },
            particles: ParticleSettings {
                size: cli.particle_size,
                alpha: cli.alpha,
                position_randomness: cli.position_randomness,
                seed: cli.seed,
            },
        })
    }
}

/// Deterministic RNG when a seed is configured, entropy otherwise.
/// `stream` keeps consumers seeded from the same value independent.
pub fn seeded_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ stream.rotate_left(32)),
        None => StdRng::from_entropy(),
    }
}
