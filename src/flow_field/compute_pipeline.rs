use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResourcePlugin;
use bevy::render::graph::CameraDriverLabel;
use bevy::render::render_asset::RenderAssets;
use bevy::render::render_graph::{self, RenderGraph, RenderLabel};
use bevy::render::render_resource::binding_types::{texture_2d, texture_storage_2d, uniform_buffer};
use bevy::render::render_resource::*;
use bevy::render::renderer::{RenderContext, RenderDevice, RenderQueue};
use bevy::render::texture::GpuImage;
use bevy::render::{Render, RenderApp, RenderSet};

use super::map::{FlowFieldPass, FlowFieldUniforms, SIMULATION_FORMAT};

const SHADER_ASSET_PATH: &str = "shaders/flow_field.wgsl";

/// Must match `@workgroup_size` in the shader
const WORKGROUP_SIZE: u32 = 8;

/// Dispatches the simulation pass from the render graph every frame
pub struct FlowFieldComputePlugin;

impl Plugin for FlowFieldComputePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(ExtractResourcePlugin::<FlowFieldPass>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app.init_resource::<FlowFieldUniformBuffers>().add_systems(
            Render,
            prepare_bind_groups
                .in_set(RenderSet::PrepareBindGroups)
                .run_if(resource_exists::<FlowFieldPass>),
        );

        // Simulate before the cameras draw so particles see this frame's state
        let mut render_graph = render_app.world_mut().resource_mut::<RenderGraph>();
        render_graph.add_node(FlowFieldLabel, FlowFieldNode::default());
        render_graph.add_node_edge(FlowFieldLabel, CameraDriverLabel);
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app.init_resource::<FlowFieldPipeline>();
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
struct FlowFieldLabel;

#[derive(Resource)]
struct FlowFieldPipeline {
    bind_group_layout: BindGroupLayout,
    pipeline: CachedComputePipelineId,
}

impl FromWorld for FlowFieldPipeline {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let bind_group_layout = render_device.create_bind_group_layout(
            "flow_field_bind_group_layout",
            &BindGroupLayoutEntries::sequential(
                ShaderStages::COMPUTE,
                (
                    // Base texture, re-seed source
                    texture_2d(TextureSampleType::Float { filterable: false }),
                    // Previous state
                    texture_2d(TextureSampleType::Float { filterable: false }),
                    // Next state
                    texture_storage_2d(SIMULATION_FORMAT, StorageTextureAccess::WriteOnly),
                    uniform_buffer::<FlowFieldUniforms>(false),
                ),
            ),
        );

        let shader = world.resource::<AssetServer>().load(SHADER_ASSET_PATH);
        let pipeline = world
            .resource::<PipelineCache>()
            .queue_compute_pipeline(ComputePipelineDescriptor {
                label: Some("flow_field_pipeline".into()),
                layout: vec![bind_group_layout.clone()],
                push_constant_ranges: vec![],
                shader,
                shader_defs: vec![],
                entry_point: "main".into(),
                zero_initialize_workgroup_memory: false,
            });

        Self {
            bind_group_layout,
            pipeline,
        }
    }
}

/// The seed pass runs at time zero, whichever frame it lands on
#[derive(Resource, Default)]
struct FlowFieldUniformBuffers {
    seed: UniformBuffer<FlowFieldUniforms>,
    advance: UniformBuffer<FlowFieldUniforms>,
}

/// `seed` reads the base texture in place of the previous state
#[derive(Resource)]
struct FlowFieldBindGroups {
    seed: BindGroup,
    advance: BindGroup,
}

fn prepare_bind_groups(
    mut commands: Commands,
    pipeline: Res<FlowFieldPipeline>,
    pass: Res<FlowFieldPass>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
    mut uniform_buffers: ResMut<FlowFieldUniformBuffers>,
) {
    let (Some(base), Some(input), Some(output)) = (
        gpu_images.get(&pass.base),
        gpu_images.get(&pass.input),
        gpu_images.get(&pass.output),
    ) else {
        commands.remove_resource::<FlowFieldBindGroups>();
        return;
    };

    let buffers = &mut *uniform_buffers;
    buffers.seed.set(pass.uniforms.seeding());
    buffers.seed.write_buffer(&render_device, &render_queue);
    buffers.advance.set(pass.uniforms);
    buffers.advance.write_buffer(&render_device, &render_queue);
    let (Some(seed_uniforms), Some(advance_uniforms)) =
        (buffers.seed.binding(), buffers.advance.binding())
    else {
        return;
    };

    let seed = render_device.create_bind_group(
        "flow_field_seed_bind_group",
        &pipeline.bind_group_layout,
        &BindGroupEntries::sequential((
            &base.texture_view,
            &base.texture_view,
            &output.texture_view,
            seed_uniforms,
        )),
    );
    let advance = render_device.create_bind_group(
        "flow_field_advance_bind_group",
        &pipeline.bind_group_layout,
        &BindGroupEntries::sequential((
            &base.texture_view,
            &input.texture_view,
            &output.texture_view,
            advance_uniforms,
        )),
    );

    commands.insert_resource(FlowFieldBindGroups { seed, advance });
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum FlowFieldState {
    #[default]
    Loading,
    /// Pipeline compiled, waiting for textures
    Ready,
    /// This frame writes the base state
    Seed,
    Advance,
    Failed,
}

impl FlowFieldState {
    /// `Seed` lasts exactly one dispatched frame, whenever the pipeline
    /// becomes usable, so the first pass that runs always starts from base
    fn next(self, pipeline: &CachedPipelineState, bind_groups_ready: bool) -> Self {
        let state = match (self, pipeline) {
            (FlowFieldState::Loading, CachedPipelineState::Ok(_)) => FlowFieldState::Ready,
            // Shader assets still on their way; the cache re-queues the pipeline
            (
                FlowFieldState::Loading,
                CachedPipelineState::Err(
                    PipelineCacheError::ShaderNotLoaded(_)
                    | PipelineCacheError::ShaderImportNotYetAvailable,
                ),
            ) => FlowFieldState::Loading,
            (FlowFieldState::Loading, CachedPipelineState::Err(_)) => FlowFieldState::Failed,
            (FlowFieldState::Seed, _) => FlowFieldState::Advance,
            (state, _) => state,
        };
        match state {
            FlowFieldState::Ready if bind_groups_ready => FlowFieldState::Seed,
            state => state,
        }
    }
}

#[derive(Default)]
struct FlowFieldNode {
    state: FlowFieldState,
}

impl render_graph::Node for FlowFieldNode {
    fn update(&mut self, world: &mut World) {
        let Some(pipeline) = world.get_resource::<FlowFieldPipeline>() else {
            return;
        };
        let pipeline_state = world
            .resource::<PipelineCache>()
            .get_compute_pipeline_state(pipeline.pipeline);
        let bind_groups_ready = world.contains_resource::<FlowFieldBindGroups>();

        let next = self.state.next(pipeline_state, bind_groups_ready);
        if next != self.state {
            match (next, pipeline_state) {
                (FlowFieldState::Ready, _) => info!("Flow field pipeline ready"),
                (FlowFieldState::Seed, _) => debug!("Seeding flow field from base texture"),
                (FlowFieldState::Failed, CachedPipelineState::Err(err)) => {
                    error!("Flow field pipeline failed, assets/{SHADER_ASSET_PATH}: {err}")
                }
                _ => {}
            }
        }
        self.state = next;
    }

    fn run(
        &self,
        _graph: &mut render_graph::RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), render_graph::NodeRunError> {
        let (Some(pipeline), Some(bind_groups), Some(pass)) = (
            world.get_resource::<FlowFieldPipeline>(),
            world.get_resource::<FlowFieldBindGroups>(),
            world.get_resource::<FlowFieldPass>(),
        ) else {
            return Ok(());
        };

        let bind_group = match self.state {
            FlowFieldState::Seed => &bind_groups.seed,
            FlowFieldState::Advance => &bind_groups.advance,
            _ => return Ok(()),
        };

        let Some(compute_pipeline) = world
            .resource::<PipelineCache>()
            .get_compute_pipeline(pipeline.pipeline)
        else {
            return Ok(());
        };

        let mut compute_pass =
            render_context
                .command_encoder()
                .begin_compute_pass(&ComputePassDescriptor {
                    label: Some("flow_field_pass"),
                    timestamp_writes: None,
                });

        compute_pass.set_pipeline(compute_pipeline);
        compute_pass.set_bind_group(0, bind_group, &[]);
        compute_pass.dispatch_workgroups(
            pass.size.x.div_ceil(WORKGROUP_SIZE),
            pass.size.y.div_ceil(WORKGROUP_SIZE),
            1,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUED: CachedPipelineState = CachedPipelineState::Queued;

    #[test]
    fn test_waits_for_pipeline() {
        let state = FlowFieldState::Loading.next(&QUEUED, true);
        assert_eq!(state, FlowFieldState::Loading);

        let not_loaded =
            CachedPipelineState::Err(PipelineCacheError::ShaderNotLoaded(AssetId::default()));
        assert_eq!(
            FlowFieldState::Loading.next(&not_loaded, true),
            FlowFieldState::Loading
        );

        let import_pending =
            CachedPipelineState::Err(PipelineCacheError::ShaderImportNotYetAvailable);
        assert_eq!(
            FlowFieldState::Loading.next(&import_pending, true),
            FlowFieldState::Loading
        );
    }

    #[test]
    fn test_shader_errors_are_fatal() {
        let broken = CachedPipelineState::Err(PipelineCacheError::CreateShaderModule(
            "invalid WGSL".into(),
        ));
        let state = FlowFieldState::Loading.next(&broken, true);
        assert_eq!(state, FlowFieldState::Failed);
        assert_eq!(state.next(&QUEUED, true), FlowFieldState::Failed);
    }

    #[test]
    fn test_seeds_once_then_advances() {
        let state = FlowFieldState::Ready.next(&QUEUED, false);
        assert_eq!(state, FlowFieldState::Ready);

        let state = state.next(&QUEUED, true);
        assert_eq!(state, FlowFieldState::Seed);
        let state = state.next(&QUEUED, true);
        assert_eq!(state, FlowFieldState::Advance);
        assert_eq!(state.next(&QUEUED, false), FlowFieldState::Advance);
    }
}
