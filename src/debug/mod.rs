/// Debug panel: folders of range controls that systems bind to their own
/// parameters, adjustable from the keyboard and shown as an overlay.

pub mod ui;

pub use ui::*;

use bevy::prelude::*;

pub struct DebugPanelPlugin {
    pub enabled: bool,
}

impl DebugPanelPlugin {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Plugin for DebugPanelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(DebugPanel::new(self.enabled));

        if self.enabled {
            app.add_systems(Startup, spawn_debug_overlay).add_systems(
                Update,
                (
                    handle_debug_keys,
                    refresh_debug_overlay.run_if(resource_changed::<DebugPanel>),
                )
                    .chain(),
            );
            info!("Debug panel enabled");
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DebugPanelError {
    #[error("debug folder `{0}` is already registered")]
    DuplicateFolder(String),

    #[error("unknown debug folder `{0}`")]
    UnknownFolder(String),

    #[error("range `{label}` is already registered in folder `{folder}`")]
    DuplicateRange { folder: String, label: String },

    #[error("range `{label}` has min {min} greater than max {max}")]
    InvertedRange { label: String, min: f32, max: f32 },

    #[error("range `{label}` needs a positive step, got {step}")]
    InvalidStep { label: String, step: f32 },
}

/// Registration request, one per folder or control
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEntry {
    Folder {
        label: String,
        open: bool,
    },
    Range {
        folder: String,
        label: String,
        min: f32,
        max: f32,
        step: f32,
        value: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugFolder {
    pub label: String,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeControl {
    pub folder: String,
    pub label: String,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    value: f32,
}

impl RangeControl {
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Clamp to [min, max] and snap to the step grid anchored at `min`.
    /// Values already on the grid, up to float error, are kept as given.
    fn quantize(&self, value: f32) -> f32 {
        let steps = ((value - self.min) / self.step).round();
        let snapped = self.min + steps * self.step;
        let snapped = if (snapped - value).abs() <= self.step * 1e-3 {
            value
        } else {
            snapped
        };
        snapped.clamp(self.min, self.max)
    }

    /// Digits needed to show one step
    pub fn decimals(&self) -> usize {
        (-self.step.log10() - 1e-4).ceil().max(0.0) as usize
    }
}

#[derive(Resource, Debug, Default)]
pub struct DebugPanel {
    enabled: bool,
    visible: bool,
    folders: Vec<DebugFolder>,
    ranges: Vec<RangeControl>,
    selected: Option<usize>,
}

impl DebugPanel {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            visible: enabled,
            ..default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_visible(&self) -> bool {
        self.enabled && self.visible
    }

    pub fn toggle_visible(&mut self) {
        self.visible = !self.visible;
    }

    pub fn register(&mut self, entry: DebugEntry) -> Result<(), DebugPanelError> {
        match entry {
            DebugEntry::Folder { label, open } => {
                if self.folder(&label).is_some() {
                    return Err(DebugPanelError::DuplicateFolder(label));
                }
                debug!("Registered debug folder `{label}`");
                self.folders.push(DebugFolder { label, open });
            }
            DebugEntry::Range {
                folder,
                label,
                min,
                max,
                step,
                value,
            } => {
                if self.folder(&folder).is_none() {
                    return Err(DebugPanelError::UnknownFolder(folder));
                }
                if self.range(&folder, &label).is_some() {
                    return Err(DebugPanelError::DuplicateRange { folder, label });
                }
                if min > max {
                    return Err(DebugPanelError::InvertedRange { label, min, max });
                }
                if !(step > 0.0) {
                    return Err(DebugPanelError::InvalidStep { label, step });
                }

                debug!("Registered debug range `{folder}/{label}` [{min}, {max}]");
                let mut range = RangeControl {
                    folder,
                    label,
                    min,
                    max,
                    step,
                    value,
                };
                range.value = range.quantize(value);

                if self.selected.is_none() && self.is_shown(&range) {
                    self.selected = Some(self.ranges.len());
                }
                self.ranges.push(range);
            }
        }
        Ok(())
    }

    pub fn folder(&self, label: &str) -> Option<&DebugFolder> {
        self.folders.iter().find(|f| f.label == label)
    }

    pub fn range(&self, folder: &str, label: &str) -> Option<&RangeControl> {
        self.ranges
            .iter()
            .find(|r| r.folder == folder && r.label == label)
    }

    pub fn value(&self, folder: &str, label: &str) -> Option<f32> {
        self.range(folder, label).map(RangeControl::value)
    }

    /// Set a range's value, returning what was stored after clamping and snapping
    pub fn set_value(&mut self, folder: &str, label: &str, value: f32) -> Option<f32> {
        let range = self
            .ranges
            .iter_mut()
            .find(|r| r.folder == folder && r.label == label)?;
        range.value = range.quantize(value);
        Some(range.value)
    }

    pub fn selected(&self) -> Option<&RangeControl> {
        self.selected.map(|index| &self.ranges[index])
    }

    fn is_shown(&self, range: &RangeControl) -> bool {
        self.folder(&range.folder).is_some_and(|f| f.open)
    }

    /// Move the selection to the next range in an open folder
    pub fn select_next(&mut self) {
        let count = self.ranges.len();
        let start = self.selected.unwrap_or(count.saturating_sub(1));
        self.selected = (1..=count)
            .map(|offset| (start + offset) % count)
            .find(|&index| self.is_shown(&self.ranges[index]));
    }

    /// Nudge the selected range by whole steps
    pub fn nudge_selected(&mut self, steps: i32) -> Option<f32> {
        let range = &mut self.ranges[self.selected?];
        range.value = range.quantize(range.value + steps as f32 * range.step);
        Some(range.value)
    }

    /// Text shown in the overlay
    pub fn describe(&self) -> String {
        let mut text = String::new();
        for folder in &self.folders {
            let marker = if folder.open { "v" } else { ">" };
            text.push_str(&format!("{marker} {}\n", folder.label));
            if !folder.open {
                continue;
            }
            for (index, range) in self.ranges.iter().enumerate() {
                if range.folder != folder.label {
                    continue;
                }
                let cursor = if self.selected == Some(index) { ">" } else { " " };
                text.push_str(&format!(
                    "{cursor} {:<20} {:.*}\n",
                    range.label,
                    range.decimals(),
                    range.value
                ));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> DebugPanel {
        let mut panel = DebugPanel::new(true);
        panel
            .register(DebugEntry::Folder {
                label: "flowField".into(),
                open: true,
            })
            .unwrap();
        panel
            .register(range("uPositionSpeed", 0.0001, 0.1, 0.0001, 0.02))
            .unwrap();
        panel
            .register(range("uLifeSpeed", 0.00001, 0.01, 0.00001, 0.003))
            .unwrap();
        panel
    }

    fn range(label: &str, min: f32, max: f32, step: f32, value: f32) -> DebugEntry {
        DebugEntry::Range {
            folder: "flowField".into(),
            label: label.into(),
            min,
            max,
            step,
            value,
        }
    }

    #[test]
    fn test_registration_errors() {
        let mut panel = panel();

        assert_eq!(
            panel.register(DebugEntry::Folder {
                label: "flowField".into(),
                open: false,
            }),
            Err(DebugPanelError::DuplicateFolder("flowField".into()))
        );
        assert!(matches!(
            panel.register(range("uLifeSpeed", 0.0, 1.0, 0.1, 0.5)),
            Err(DebugPanelError::DuplicateRange { .. })
        ));
        assert!(matches!(
            panel.register(range("inverted", 1.0, 0.0, 0.1, 0.5)),
            Err(DebugPanelError::InvertedRange { .. })
        ));
        assert!(matches!(
            panel.register(range("flat", 0.0, 1.0, 0.0, 0.5)),
            Err(DebugPanelError::InvalidStep { .. })
        ));

        let orphan = DebugEntry::Range {
            folder: "missing".into(),
            label: "x".into(),
            min: 0.0,
            max: 1.0,
            step: 0.1,
            value: 0.0,
        };
        assert_eq!(
            panel.register(orphan),
            Err(DebugPanelError::UnknownFolder("missing".into()))
        );
    }

    #[test]
    fn test_set_value_clamps_and_snaps() {
        let mut panel = panel();

        let stored = panel.set_value("flowField", "uPositionSpeed", 5.0).unwrap();
        assert_eq!(stored, 0.1);
        let stored = panel.set_value("flowField", "uPositionSpeed", -1.0).unwrap();
        assert_eq!(stored, 0.0001);
        let stored = panel
            .set_value("flowField", "uPositionSpeed", 0.050_04)
            .unwrap();
        assert!((stored - 0.05).abs() < 1e-6);

        assert_eq!(panel.set_value("flowField", "unknown", 1.0), None);
    }

    #[test]
    fn test_selection_and_nudge() {
        let mut panel = panel();
        assert_eq!(panel.selected().unwrap().label, "uPositionSpeed");

        let value = panel.nudge_selected(10).unwrap();
        assert!((value - 0.021).abs() < 1e-6);

        panel.select_next();
        assert_eq!(panel.selected().unwrap().label, "uLifeSpeed");
        panel.select_next();
        assert_eq!(panel.selected().unwrap().label, "uPositionSpeed");
    }

    #[test]
    fn test_closed_folders_are_skipped() {
        let mut panel = panel();
        panel
            .register(DebugEntry::Folder {
                label: "hidden".into(),
                open: false,
            })
            .unwrap();
        panel
            .register(DebugEntry::Range {
                folder: "hidden".into(),
                label: "secret".into(),
                min: 0.0,
                max: 1.0,
                step: 0.1,
                value: 0.5,
            })
            .unwrap();

        for _ in 0..5 {
            panel.select_next();
            assert_eq!(panel.selected().unwrap().folder, "flowField");
        }
        assert!(!panel.describe().contains("secret"));
    }

    #[test]
    fn test_registered_value_is_snapped() {
        let mut panel = panel();
        panel
            .register(range("coarse", 0.0, 1.0, 0.25, 0.3))
            .unwrap();
        panel
            .register(range("clamped", 0.0, 1.0, 0.25, 7.0))
            .unwrap();

        assert_eq!(panel.value("flowField", "coarse"), Some(0.25));
        assert_eq!(panel.value("flowField", "clamped"), Some(1.0));
        assert_eq!(panel.value("flowField", "uLifeSpeed"), Some(0.003));
    }

    #[test]
    fn test_selection_starts_in_open_folder() {
        let mut panel = DebugPanel::new(true);
        panel
            .register(DebugEntry::Folder {
                label: "hidden".into(),
                open: false,
            })
            .unwrap();
        panel
            .register(DebugEntry::Range {
                folder: "hidden".into(),
                label: "secret".into(),
                min: 0.0,
                max: 1.0,
                step: 0.1,
                value: 0.5,
            })
            .unwrap();
        assert!(panel.selected().is_none());
        assert_eq!(panel.nudge_selected(1), None);

        panel
            .register(DebugEntry::Folder {
                label: "flowField".into(),
                open: true,
            })
            .unwrap();
        panel
            .register(range("uLifeSpeed", 0.00001, 0.01, 0.00001, 0.003))
            .unwrap();
        assert_eq!(panel.selected().unwrap().label, "uLifeSpeed");
    }

    #[test]
    fn test_describe_uses_step_precision() {
        let panel = panel();
        let text = panel.describe();
        assert!(text.starts_with("v flowField\n"));
        assert!(text.contains("> uPositionSpeed"));
        assert!(text.contains("0.0200"));
        assert!(text.contains("0.00300"));
    }

    #[test]
    fn test_disabled_panel_is_hidden() {
        let mut panel = DebugPanel::new(false);
        assert!(!panel.is_visible());
        panel.toggle_visible();
        assert!(!panel.is_visible());
    }
}
