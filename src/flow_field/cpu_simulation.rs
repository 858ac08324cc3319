use bevy::prelude::*;
use noise::{NoiseFn, Perlin};

use super::map::{FlowFieldPass, FlowFieldUniforms, texels_to_bytes};

/// Offsets decorrelating the noise sampled for each axis
const AXIS_OFFSETS: [f32; 3] = [123.45, 12.345, 1234.5];

/// CPU evaluation of the simulation pass.
///
/// Texels are independent, so a single buffer advanced in place holds
/// the same state the ping-pong textures do on the GPU.
#[derive(Resource)]
pub struct CpuFlowField {
    noise: Perlin,
    base: Vec<Vec4>,
    state: Vec<Vec4>,
}

impl CpuFlowField {
    /// The first `advance` reads `base`, matching the first GPU pass
    pub fn new(base: Vec<Vec4>, seed: u32) -> Self {
        Self {
            noise: Perlin::new(seed),
            state: base.clone(),
            base,
        }
    }

    pub fn state(&self) -> &[Vec4] {
        &self.state
    }

    pub fn advance(&mut self, uniforms: &FlowFieldUniforms) {
        for (texel, base) in self.state.iter_mut().zip(&self.base) {
            *texel = advance_texel(&self.noise, *texel, *base, uniforms);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        texels_to_bytes(&self.state)
    }
}

/// Age one particle; re-seed it from `base` when its life wraps,
/// otherwise drift it through the noise field
pub fn advance_texel(
    noise: &impl NoiseFn<f64, 4>,
    state: Vec4,
    base: Vec4,
    uniforms: &FlowFieldUniforms,
) -> Vec4 {
    let life = state.w + uniforms.life_speed;
    if life >= 1.0 {
        return base.truncate().extend(life.fract());
    }

    let time = f64::from(uniforms.time * uniforms.time_frequency);
    let sample = state.truncate() * uniforms.position_frequency;
    let drift = Vec3::from_array(AXIS_OFFSETS.map(|offset| {
        let p = sample + offset;
        noise
            .get([p.x.into(), p.y.into(), p.z.into(), time])
            .clamp(-1.0, 1.0) as f32
    }));

    (state.truncate() + drift * uniforms.position_speed).extend(life)
}

/// Advance the CPU state and upload it into this frame's output target
pub(super) fn step_cpu_flow_field(
    pass: Option<Res<FlowFieldPass>>,
    mut simulation: ResMut<CpuFlowField>,
    mut images: ResMut<Assets<Image>>,
) {
    let Some(pass) = pass else {
        return;
    };
    simulation.advance(&pass.uniforms);

    let Some(image) = images.get_mut(&pass.output) else {
        warn!("Flow field target missing, skipping CPU upload");
        return;
    };
    image.data = Some(simulation.to_bytes());
}
