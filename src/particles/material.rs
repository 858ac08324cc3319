use bevy::pbr::{MaterialPipeline, MaterialPipelineKey};
use bevy::prelude::*;
use bevy::reflect::TypePath;
use bevy::render::mesh::{MeshVertexAttribute, MeshVertexBufferLayoutRef};
use bevy::render::render_resource::{
    AsBindGroup, CompareFunction, RenderPipelineDescriptor, ShaderRef, ShaderType,
    SpecializedMeshPipelineError,
};

const SHADER_ASSET_PATH: &str = "shaders/particles.wgsl";

/// Vertex attributes read by the particle shader, in shader location order.
/// `POSITION` carries the fixed random offset, not a mesh-space position.
pub const PARTICLE_ATTRIBUTES: [MeshVertexAttribute; 4] = [
    Mesh::ATTRIBUTE_POSITION,
    // Texel of the flow field this sprite follows
    Mesh::ATTRIBUTE_UV_0,
    // Sprite corner in [-0.5, 0.5]
    Mesh::ATTRIBUTE_UV_1,
    Mesh::ATTRIBUTE_COLOR,
];

/// Maps flow field positions into the particle mesh's local space
#[derive(ShaderType, Debug, Clone, Copy, PartialEq)]
pub struct ParticlesUniform {
    pub fbo_matrix: Mat4,
    pub size: f32,
    pub position_randomness: f32,
    pub alpha: f32,
}

impl Default for ParticlesUniform {
    fn default() -> Self {
        Self {
            // [0, 1]^3 -> [-1, 1]^3
            fbo_matrix: Mat4::from_scale_rotation_translation(
                Vec3::splat(2.0),
                Quat::IDENTITY,
                Vec3::splat(-1.0),
            ),
            size: 0.02,
            position_randomness: 0.02,
            alpha: 0.8,
        }
    }
}

/// Additive, depth-ignoring sprites positioned from the flow field texture
#[derive(AsBindGroup, Debug, Clone, Asset, TypePath)]
pub struct ParticlesMaterial {
    #[uniform(0)]
    pub uniforms: ParticlesUniform,

    #[texture(1, sample_type = "float", filterable = false)]
    pub fbo_texture: Handle<Image>,
}

impl Material for ParticlesMaterial {
    fn vertex_shader() -> ShaderRef {
        SHADER_ASSET_PATH.into()
    }

    fn fragment_shader() -> ShaderRef {
        SHADER_ASSET_PATH.into()
    }

    fn alpha_mode(&self) -> AlphaMode {
        AlphaMode::Add
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        layout: &MeshVertexBufferLayoutRef,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        let attributes = PARTICLE_ATTRIBUTES
            .iter()
            .enumerate()
            .map(|(location, attribute)| attribute.at_shader_location(location as u32))
            .collect::<Vec<_>>();
        let vertex_layout = layout.0.get_layout(&attributes)?;
        descriptor.vertex.buffers = vec![vertex_layout];

        // Always drawn on top, never occluding each other
        if let Some(depth_stencil) = descriptor.depth_stencil.as_mut() {
            depth_stencil.depth_write_enabled = false;
            depth_stencil.depth_compare = CompareFunction::Always;
        }
        Ok(())
    }
}
