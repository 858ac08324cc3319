/// Ping-pong flow field simulation
///
/// Every frame one pass reads the previous particle state, drifts each
/// position through a 4D noise field, ages it, and writes the result into
/// the other texture. Particles sample whichever texture was written last.

pub mod compute_pipeline;
pub mod cpu_simulation;
pub mod map;

pub use compute_pipeline::*;
pub use cpu_simulation::*;
pub use map::*;

use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use rand::Rng;

use crate::debug::DebugPanel;
use crate::settings::{FlowFieldSettings, SimulationBackend, seeded_rng};

/// RNG stream for the base state
const FLOW_FIELD_STREAM: u64 = 0;

#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowFieldSystems {
    Setup,
    Render,
}

pub struct FlowFieldPlugin {
    pub settings: FlowFieldSettings,
}

impl FlowFieldPlugin {
    pub fn new(settings: FlowFieldSettings) -> Self {
        Self { settings }
    }
}

impl Plugin for FlowFieldPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.settings)
            .add_systems(Startup, setup_flow_field.in_set(FlowFieldSystems::Setup))
            .add_systems(
                Update,
                (
                    apply_debug_controls.run_if(resource_exists_and_changed::<DebugPanel>),
                    render_flow_field,
                )
                    .chain()
                    .in_set(FlowFieldSystems::Render),
            );

        match self.settings.backend {
            SimulationBackend::Gpu => {
                app.add_plugins(FlowFieldComputePlugin);
            }
            SimulationBackend::Cpu => {
                app.add_systems(
                    Update,
                    step_cpu_flow_field
                        .after(render_flow_field)
                        .in_set(FlowFieldSystems::Render),
                );
            }
        }

        info!(
            "Flow field plugin initialized: {}x{} texels, {}",
            self.settings.width,
            self.settings.height,
            self.settings.backend.as_str()
        );
    }
}

fn setup_flow_field(
    mut commands: Commands,
    settings: Res<FlowFieldSettings>,
    mut images: ResMut<Assets<Image>>,
    mut panel: Option<ResMut<DebugPanel>>,
) {
    let mut rng = seeded_rng(settings.seed, FLOW_FIELD_STREAM);
    let base = random_texels(settings.size() as usize, &mut rng);

    // The CPU backend rewrites target pixels, so keep them in the main world
    let target_usage = match settings.backend {
        SimulationBackend::Gpu => RenderAssetUsages::RENDER_WORLD,
        SimulationBackend::Cpu => RenderAssetUsages::default(),
    };
    let map = FlowFieldMap::new(&settings, &base, target_usage, &mut images);

    if let Some(panel) = panel.as_deref_mut().filter(|panel| panel.is_enabled())
        && let Err(err) = map.register_debug(panel)
    {
        warn!("Flow field debug controls unavailable: {err}");
    }

    if settings.backend == SimulationBackend::Cpu {
        let noise_seed = rng.gen_range(0..=u32::MAX);
        commands.insert_resource(CpuFlowField::new(base, noise_seed));
    }

    debug!("Flow field textures created ({} particles)", map.size());
    commands.insert_resource(map);
}

fn apply_debug_controls(panel: Res<DebugPanel>, mut map: ResMut<FlowFieldMap>) {
    if map.apply_debug(&panel) {
        debug!("Flow field uniforms updated: {:?}", map.uniforms());
    }
}

fn render_flow_field(mut commands: Commands, time: Res<Time>, mut map: ResMut<FlowFieldMap>) {
    let pass = map.render(time.elapsed_secs() * 1000.0);
    commands.insert_resource(pass);
}
