mod debug;
mod flow_field;
mod particles;
mod settings;

use bevy::prelude::*;
use clap::Parser;

use crate::debug::DebugPanelPlugin;
use crate::flow_field::FlowFieldPlugin;
use crate::particles::ParticlesPlugin;
use crate::settings::{Cli, Settings};

fn main() -> AppExit {
    let settings = match Settings::try_from(Cli::parse()) {
        Ok(settings) => settings,
        Err(err) => {
            // LogPlugin isn't running yet
            eprintln!("flow_field_particles: {err}");
            return AppExit::from_code(2);
        }
    };

    App::new()
        .insert_resource(ClearColor(Color::BLACK))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Flow Field".into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins((
            DebugPanelPlugin::new(settings.debug),
            FlowFieldPlugin::new(settings.flow_field),
            ParticlesPlugin::new(settings.particles),
        ))
        .add_systems(Startup, setup_camera)
        .run()
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 0.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}
