use bevy::image::{ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor};
use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::*;
use rand::Rng;

use crate::debug::{DebugEntry, DebugPanel, DebugPanelError};
use crate::settings::FlowFieldSettings;

/// Texel format of the simulation textures: rgb = position, a = life
pub const SIMULATION_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

/// Bytes per simulation texel
pub const TEXEL_SIZE: usize = 16;

/// Folder the flow field registers its controls under
pub const DEBUG_FOLDER: &str = "flowField";

/// (label, min, max, step) for every tweakable uniform
pub const DEBUG_RANGES: [(&str, f32, f32, f32); 4] = [
    ("uTimeFrequency", 0.0, 0.001, 0.000_000_1),
    ("uPositionFrequency", 0.0001, 20.0, 0.0001),
    ("uPositionSpeed", 0.0001, 0.1, 0.0001),
    ("uLifeSpeed", 0.000_01, 0.01, 0.000_01),
];

/// Uniforms of the simulation pass
#[derive(ShaderType, Debug, Clone, Copy, PartialEq)]
pub struct FlowFieldUniforms {
    /// Elapsed application time in milliseconds
    pub time: f32,
    pub time_frequency: f32,
    pub position_frequency: f32,
    pub position_speed: f32,
    pub life_speed: f32,
}

impl Default for FlowFieldUniforms {
    fn default() -> Self {
        Self {
            time: 0.0,
            time_frequency: 0.000_03,
            position_frequency: 2.0,
            position_speed: 0.02,
            life_speed: 0.003,
        }
    }
}

impl FlowFieldUniforms {
    /// Look up a tweakable uniform by its debug label
    pub fn field(&self, label: &str) -> Option<f32> {
        match label {
            "uTimeFrequency" => Some(self.time_frequency),
            "uPositionFrequency" => Some(self.position_frequency),
            "uPositionSpeed" => Some(self.position_speed),
            "uLifeSpeed" => Some(self.life_speed),
            _ => None,
        }
    }

    /// Copy for a pass that starts from the base state at time zero
    pub fn seeding(self) -> Self {
        Self { time: 0.0, ..self }
    }

    pub fn field_mut(&mut self, label: &str) -> Option<&mut f32> {
        match label {
            "uTimeFrequency" => Some(&mut self.time_frequency),
            "uPositionFrequency" => Some(&mut self.position_frequency),
            "uPositionSpeed" => Some(&mut self.position_speed),
            "uLifeSpeed" => Some(&mut self.life_speed),
            _ => None,
        }
    }
}

/// One simulation pass: read `input`, write `output`.
/// Extracted to the render world every frame.
#[derive(Resource, Clone, Debug, ExtractResource)]
pub struct FlowFieldPass {
    pub base: Handle<Image>,
    pub input: Handle<Image>,
    pub output: Handle<Image>,
    pub uniforms: FlowFieldUniforms,
    pub size: UVec2,
}

/// Double-buffered flow field simulation state
#[derive(Resource, Debug)]
pub struct FlowFieldMap {
    width: u32,
    height: u32,
    base_texture: Handle<Image>,
    targets: [Handle<Image>; 2],
    /// Index into `targets` holding the latest state
    current: usize,
    first_render: bool,
    uniforms: FlowFieldUniforms,
}

impl FlowFieldMap {
    /// Upload the base state and allocate both render targets.
    /// The first `render` call seeds `current` from `base`.
    pub fn new(
        settings: &FlowFieldSettings,
        base: &[Vec4],
        target_usage: RenderAssetUsages,
        images: &mut Assets<Image>,
    ) -> Self {
        let (width, height) = (settings.width, settings.height);
        let base_texture = images.add(create_base_texture(width, height, base));

        let target = create_render_target(width, height, target_usage);
        let a = images.add(target.clone());
        let b = images.add(target);

        Self {
            width,
            height,
            base_texture,
            targets: [a, b],
            current: 0,
            first_render: true,
            uniforms: FlowFieldUniforms::default(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> u32 {
        self.width * self.height
    }

    pub fn base_texture(&self) -> &Handle<Image> {
        &self.base_texture
    }

    pub fn current(&self) -> &Handle<Image> {
        &self.targets[self.current]
    }

    pub fn other(&self) -> &Handle<Image> {
        &self.targets[1 - self.current]
    }

    /// Texture holding the most recently simulated state
    pub fn texture(&self) -> &Handle<Image> {
        self.current()
    }

    pub fn uniforms(&self) -> &FlowFieldUniforms {
        &self.uniforms
    }

    /// Describe this frame's pass and advance the ping-pong state.
    ///
    /// The first call writes the base state into `current` at time zero.
    /// Every later call reads `current`, writes `other`, then swaps them.
    pub fn render(&mut self, elapsed_ms: f32) -> FlowFieldPass {
        if self.first_render {
            self.first_render = false;
            let mut pass = self.pass(self.base_texture.clone(), self.current().clone());
            pass.uniforms = pass.uniforms.seeding();
            return pass;
        }

        self.uniforms.time = elapsed_ms;
        let pass = self.pass(self.current().clone(), self.other().clone());
        self.current = 1 - self.current;
        pass
    }

    fn pass(&self, input: Handle<Image>, output: Handle<Image>) -> FlowFieldPass {
        FlowFieldPass {
            base: self.base_texture.clone(),
            input,
            output,
            uniforms: self.uniforms,
            size: UVec2::new(self.width, self.height),
        }
    }

    /// Register the flow field folder and one range per tweakable uniform
    pub fn register_debug(&self, panel: &mut DebugPanel) -> Result<(), DebugPanelError> {
        panel.register(DebugEntry::Folder {
            label: DEBUG_FOLDER.into(),
            open: true,
        })?;

        for (label, min, max, step) in DEBUG_RANGES {
            let value = self.uniforms.field(label).unwrap_or(min);
            panel.register(DebugEntry::Range {
                folder: DEBUG_FOLDER.into(),
                label: label.into(),
                min,
                max,
                step,
                value,
            })?;
        }

        Ok(())
    }

    /// Copy the panel's range values into the uniforms.
    /// Returns whether anything changed.
    pub fn apply_debug(&mut self, panel: &DebugPanel) -> bool {
        let mut changed = false;
        for (label, ..) in DEBUG_RANGES {
            let (Some(value), Some(field)) =
                (panel.value(DEBUG_FOLDER, label), self.uniforms.field_mut(label))
            else {
                continue;
            };
            if *field != value {
                *field = value;
                changed = true;
            }
        }
        changed
    }
}

/// Uniform random texels, every channel in [0, 1)
pub fn random_texels(count: usize, rng: &mut impl Rng) -> Vec<Vec4> {
    (0..count)
        .map(|_| {
            Vec4::new(
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
            )
        })
        .collect()
}

/// Pack texels for an `Rgba32Float` upload
pub fn texels_to_bytes(texels: &[Vec4]) -> Vec<u8> {
    texels
        .iter()
        .flat_map(|texel| texel.to_array())
        .flat_map(f32::to_le_bytes)
        .collect()
}

fn nearest_clamped_sampler() -> ImageSampler {
    ImageSampler::Descriptor(ImageSamplerDescriptor {
        address_mode_u: ImageAddressMode::ClampToEdge,
        address_mode_v: ImageAddressMode::ClampToEdge,
        address_mode_w: ImageAddressMode::ClampToEdge,
        mag_filter: ImageFilterMode::Nearest,
        min_filter: ImageFilterMode::Nearest,
        mipmap_filter: ImageFilterMode::Nearest,
        ..default()
    })
}

/// Upload the re-seed state as a float texture
pub fn create_base_texture(width: u32, height: u32, texels: &[Vec4]) -> Image {
    let mut image = Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        texels_to_bytes(texels),
        SIMULATION_FORMAT,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.sampler = nearest_clamped_sampler();
    image
}

/// One half of the ping-pong pair: sampled by the next pass and the
/// particles, written as a storage texture
pub fn create_render_target(width: u32, height: u32, asset_usage: RenderAssetUsages) -> Image {
    let mut image = Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        vec![0u8; width as usize * height as usize * TEXEL_SIZE],
        SIMULATION_FORMAT,
        asset_usage,
    );
    image.texture_descriptor.usage = TextureUsages::STORAGE_BINDING
        | TextureUsages::TEXTURE_BINDING
        | TextureUsages::COPY_DST;
    image.sampler = nearest_clamped_sampler();
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn map(images: &mut Assets<Image>) -> FlowFieldMap {
        let settings = FlowFieldSettings {
            width: 8,
            height: 2,
            ..default()
        };
        let base = random_texels(16, &mut StdRng::seed_from_u64(1));
        FlowFieldMap::new(&settings, &base, RenderAssetUsages::default(), images)
    }

    #[test]
    fn test_first_render_seeds_current_from_base() {
        let mut images = Assets::<Image>::default();
        let mut map = map(&mut images);
        let a = map.current().clone();

        let pass = map.render(500.0);
        assert_eq!(pass.input, *map.base_texture());
        assert_eq!(pass.output, a);
        assert_eq!(pass.uniforms.time, 0.0);
        assert_eq!(*map.texture(), a);
    }

    #[test]
    fn test_render_ping_pongs() {
        let mut images = Assets::<Image>::default();
        let mut map = map(&mut images);
        let a = map.current().clone();
        let b = map.other().clone();
        map.render(0.0);

        let second = map.render(16.0);
        assert_eq!((second.input.clone(), second.output.clone()), (a.clone(), b.clone()));
        assert_eq!(second.uniforms.time, 16.0);
        assert_eq!(*map.texture(), b);

        let third = map.render(32.0);
        assert_eq!((third.input, third.output), (b, a.clone()));
        assert_eq!(*map.texture(), a);
        assert_ne!(map.current(), map.other());
    }

    #[test]
    fn test_targets_share_descriptor() {
        let mut images = Assets::<Image>::default();
        let map = map(&mut images);
        let a = images.get(map.current()).unwrap();
        let b = images.get(map.other()).unwrap();

        assert_eq!(a.texture_descriptor, b.texture_descriptor);
        assert_eq!(a.texture_descriptor.format, SIMULATION_FORMAT);
        assert_eq!(a.texture_descriptor.size.width, 8);
        assert_eq!(a.texture_descriptor.size.height, 2);
        assert!(a.texture_descriptor.usage.contains(TextureUsages::STORAGE_BINDING));
        assert!(a.texture_descriptor.usage.contains(TextureUsages::TEXTURE_BINDING));
    }

    #[test]
    fn test_base_texture_layout() {
        let texels = random_texels(4, &mut StdRng::seed_from_u64(9));
        let image = create_base_texture(4, 1, &texels);

        assert_eq!(image.texture_descriptor.mip_level_count, 1);
        assert_eq!(image.data.as_deref().map(<[u8]>::len), Some(4 * TEXEL_SIZE));
        let ImageSampler::Descriptor(sampler) = &image.sampler else {
            panic!("expected an explicit sampler");
        };
        assert_eq!(sampler.mag_filter, ImageFilterMode::Nearest);
        assert_eq!(sampler.min_filter, ImageFilterMode::Nearest);
        assert_eq!(sampler.address_mode_u, ImageAddressMode::ClampToEdge);
    }

    #[test]
    fn test_random_texels_in_unit_range() {
        let texels = random_texels(1024, &mut StdRng::seed_from_u64(5));
        assert_eq!(texels.len(), 1024);
        assert!(texels.iter().all(|t| t.cmpge(Vec4::ZERO).all() && t.cmplt(Vec4::ONE).all()));
    }

    #[test]
    fn test_texels_to_bytes_is_little_endian_rgba() {
        let bytes = texels_to_bytes(&[Vec4::new(1.0, 0.0, 0.5, 0.25)]);
        assert_eq!(bytes.len(), TEXEL_SIZE);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0.25f32.to_le_bytes());
    }

    #[test]
    fn test_seeding_resets_time_only() {
        let uniforms = FlowFieldUniforms {
            time: 4_200.0,
            life_speed: 0.007,
            ..default()
        };
        let seeding = uniforms.seeding();
        assert_eq!(seeding.time, 0.0);
        assert_eq!(seeding.life_speed, 0.007);
        assert_eq!(seeding.position_frequency, uniforms.position_frequency);
    }

    #[test]
    fn test_uniform_defaults() {
        let uniforms = FlowFieldUniforms::default();
        assert_eq!(uniforms.time, 0.0);
        assert_eq!(uniforms.time_frequency, 0.00003);
        assert_eq!(uniforms.position_frequency, 2.0);
        assert_eq!(uniforms.position_speed, 0.02);
        assert_eq!(uniforms.life_speed, 0.003);
        assert_eq!(uniforms.field("uTime"), None);
    }

    #[test]
    fn test_debug_registration_and_binding() {
        let mut images = Assets::<Image>::default();
        let mut map = map(&mut images);
        let mut panel = DebugPanel::new(true);
        map.register_debug(&mut panel).unwrap();

        assert!(panel.folder(DEBUG_FOLDER).is_some_and(|f| f.open));
        let expected = [
            ("uTimeFrequency", 0.0, 0.001, 0.000_000_1, 0.000_03),
            ("uPositionFrequency", 0.0001, 20.0, 0.0001, 2.0),
            ("uPositionSpeed", 0.0001, 0.1, 0.0001, 0.02),
            ("uLifeSpeed", 0.000_01, 0.01, 0.000_01, 0.003),
        ];
        assert_eq!(DEBUG_RANGES.len(), expected.len());
        for (label, min, max, step, value) in expected {
            let range = panel.range(DEBUG_FOLDER, label).unwrap();
            assert_eq!((range.min, range.max, range.step), (min, max, step), "{label}");
            assert_eq!(range.value(), value, "{label}");
        }

        assert!(!map.apply_debug(&panel));
        panel.set_value(DEBUG_FOLDER, "uLifeSpeed", 0.005);
        assert!(map.apply_debug(&panel));
        assert!((map.uniforms().life_speed - 0.005).abs() < 1e-6);

        // A second registration collides with the first
        assert!(map.register_debug(&mut panel).is_err());
    }
}
