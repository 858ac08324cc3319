use bevy::prelude::*;

use super::DebugPanel;

/// Marker for the overlay text listing the panel's controls
#[derive(Component)]
pub struct DebugPanelText;

const HELP: &str = "Tab select | Left/Right adjust (Shift x10) | F1 hide";

pub fn spawn_debug_overlay(mut commands: Commands) {
    commands
        .spawn((
            Text::new(""),
            TextFont {
                font_size: 14.0,
                ..default()
            },
            Node {
                position_type: PositionType::Absolute,
                top: Val::Px(12.0),
                right: Val::Px(12.0),
                padding: UiRect::all(Val::Px(8.0)),
                ..default()
            },
            BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.7)),
            DebugPanelText,
        ))
        .with_child((
            TextSpan::new(HELP),
            TextFont {
                font_size: 12.0,
                ..default()
            },
            TextColor(Color::srgb(1.0, 1.0, 0.5)),
        ));
}

pub fn handle_debug_keys(keyboard: Res<ButtonInput<KeyCode>>, mut panel: ResMut<DebugPanel>) {
    if keyboard.just_pressed(KeyCode::F1) {
        panel.toggle_visible();
    }
    if !panel.is_visible() {
        return;
    }

    if keyboard.just_pressed(KeyCode::Tab) {
        panel.select_next();
    }

    let scale = if keyboard.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]) {
        10
    } else {
        1
    };
    let direction = match (
        keyboard.just_pressed(KeyCode::ArrowLeft),
        keyboard.just_pressed(KeyCode::ArrowRight),
    ) {
        (true, false) => -1,
        (false, true) => 1,
        _ => return,
    };

    if let Some(value) = panel.nudge_selected(direction * scale)
        && let Some(range) = panel.selected()
    {
        info!("{}/{} = {value}", range.folder, range.label);
    }
}

pub fn refresh_debug_overlay(
    panel: Res<DebugPanel>,
    mut overlay: Query<(&mut Text, &mut Visibility), With<DebugPanelText>>,
) {
    for (mut text, mut visibility) in &mut overlay {
        text.0 = panel.describe();
        *visibility = if panel.is_visible() {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}
