/// Particle sprites driven by the flow field texture
///
/// One camera-facing quad per simulation texel. The vertex shader reads the
/// texel for position and life; everything in the mesh itself is static.

pub mod material;

pub use material::*;

use bevy::color::{ColorToComponents, Mix};
use bevy::pbr::NotShadowCaster;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::view::NoFrustumCulling;
use rand::Rng;

use crate::flow_field::{FlowFieldMap, FlowFieldSystems};
use crate::settings::{ParticleSettings, seeded_rng};

/// RNG stream for per-particle attributes
const PARTICLES_STREAM: u64 = 1;

const CORNERS: [[f32; 2]; 4] = [[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5], [-0.5, 0.5]];

/// Particle colors are picked between these two
const INSIDE_COLOR: Color = Color::srgb(1.0, 0.38, 0.19);
const OUTSIDE_COLOR: Color = Color::srgb(0.11, 0.22, 0.52);

pub struct ParticlesPlugin {
    pub settings: ParticleSettings,
}

impl ParticlesPlugin {
    pub fn new(settings: ParticleSettings) -> Self {
        Self { settings }
    }
}

impl Plugin for ParticlesPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.settings)
            .add_plugins(MaterialPlugin::<ParticlesMaterial>::default())
            .add_systems(Startup, spawn_particles.after(FlowFieldSystems::Setup))
            .add_systems(Update, sync_particles_texture.after(FlowFieldSystems::Render));
    }
}

/// Marker for the particle system entity
#[derive(Component)]
pub struct FlowFieldParticles;

/// Build one quad per texel of a `width x height` flow field
pub fn build_particles_mesh(width: u32, height: u32, rng: &mut impl Rng) -> Mesh {
    let count = (width * height) as usize;
    let mut offsets = Vec::with_capacity(count * 4);
    let mut fbo_uvs = Vec::with_capacity(count * 4);
    let mut corners = Vec::with_capacity(count * 4);
    let mut colors = Vec::with_capacity(count * 4);
    let mut indices = Vec::with_capacity(count * 6);

    let inside = LinearRgba::from(INSIDE_COLOR);
    let outside = LinearRgba::from(OUTSIDE_COLOR);

    for y in 0..height {
        for x in 0..width {
            // Texel center so the shader's floor(uv * size) lands on (x, y)
            let fbo_uv = [
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            ];
            let offset: [f32; 3] = [
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
            ];
            let color = inside.mix(&outside, rng.gen_range(0.0..1.0)).to_f32_array();

            let first = offsets.len() as u32;
            for corner in CORNERS {
                offsets.push(offset);
                fbo_uvs.push(fbo_uv);
                corners.push(corner);
                colors.push(color);
            }
            indices.extend([first, first + 1, first + 2, first, first + 2, first + 3]);
        }
    }

    Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    )
    .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, offsets)
    .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, fbo_uvs)
    .with_inserted_attribute(Mesh::ATTRIBUTE_UV_1, corners)
    .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
    .with_inserted_indices(Indices::U32(indices))
}

fn spawn_particles(
    mut commands: Commands,
    settings: Res<ParticleSettings>,
    map: Res<FlowFieldMap>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ParticlesMaterial>>,
) {
    let mut rng = seeded_rng(settings.seed, PARTICLES_STREAM);
    let mesh = build_particles_mesh(map.width(), map.height(), &mut rng);

    let material = materials.add(ParticlesMaterial {
        uniforms: ParticlesUniform {
            size: settings.size,
            position_randomness: settings.position_randomness,
            alpha: settings.alpha,
            ..default()
        },
        fbo_texture: map.texture().clone(),
    });

    commands.spawn((
        Mesh3d(meshes.add(mesh)),
        MeshMaterial3d(material),
        Transform::default(),
        // Sprite positions come from the texture, so mesh bounds mean nothing
        NoFrustumCulling,
        NotShadowCaster,
        FlowFieldParticles,
    ));

    info!("Spawned {} flow field particles", map.size());
}

/// Point every particle material at the texture written this frame
fn sync_particles_texture(
    map: Res<FlowFieldMap>,
    particles: Query<&MeshMaterial3d<ParticlesMaterial>, With<FlowFieldParticles>>,
    mut materials: ResMut<Assets<ParticlesMaterial>>,
) {
    for handle in &particles {
        if let Some(material) = materials.get_mut(&handle.0)
            && material.fbo_texture != *map.texture()
        {
            material.fbo_texture = map.texture().clone();
        }
    }
}
