//! Materials.
//!
//! [`build_material`] maps the core schema fields onto a flat [`Material`]
//! with glTF defaults, then hands the material to each declared extension in
//! order (see [`crate::extensions`]).

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use glbgraph_core::schema::{self, TextureInfo};
use glbgraph_core::Result;
use serde::Deserialize;
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::extensions::MaterialExtension;
use crate::texture::Texture;

pub const TEXTURE_TRANSFORM_EXTENSION: &str = "KHR_texture_transform";

/// Texture slots a material can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapSlot {
    Diffuse,
    Opacity,
    Metalness,
    Gloss,
    Specular,
    SpecularityFactor,
    Normal,
    Ao,
    Emissive,
    ClearCoat,
    ClearCoatGloss,
    ClearCoatNormal,
    Refraction,
    Sheen,
    SheenGloss,
    Thickness,
    Iridescence,
    IridescenceThickness,
    Anisotropy,
}

/// Colour channels a map is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    R,
    G,
    B,
    A,
    Rgb,
}

/// A texture bound to a material slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureMap {
    /// Index into [`crate::ResourceGraph::textures`].
    pub texture: usize,
    pub uv: u32,
    pub channel: Channel,
    pub tiling: Vec2,
    pub offset: Vec2,
    /// Degrees.
    pub rotation: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    None,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    Back,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub maps: BTreeMap<MapSlot, TextureMap>,

    pub diffuse: Vec3,
    pub opacity: f32,
    pub use_metalness: bool,
    pub metalness: f32,
    pub gloss: f32,
    pub gloss_invert: bool,
    pub specular: Vec3,
    pub specular_srgb: bool,
    pub use_metalness_specular_color: bool,
    pub specularity_factor: f32,
    pub bumpiness: f32,
    pub ao_intensity: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,

    pub blend: BlendMode,
    pub alpha_test: f32,
    pub depth_write: bool,
    pub cull: CullMode,
    pub two_sided_lighting: bool,

    pub use_lighting: bool,
    pub use_skybox: bool,

    pub clear_coat: f32,
    pub clear_coat_gloss: f32,
    pub clear_coat_gloss_invert: bool,
    pub clear_coat_bumpiness: f32,

    pub refraction_index: f32,
    pub dispersion: f32,
    pub refraction: f32,
    pub use_dynamic_refraction: bool,

    pub use_sheen: bool,
    pub sheen: Vec3,
    pub sheen_gloss: f32,
    pub sheen_gloss_invert: bool,

    pub thickness: f32,
    pub attenuation: Vec3,
    pub attenuation_distance: Option<f32>,

    pub use_iridescence: bool,
    pub iridescence: f32,
    pub iridescence_refraction_index: f32,
    pub iridescence_thickness_min: f32,
    pub iridescence_thickness_max: f32,

    pub enable_ggx_specular: bool,
    pub anisotropy_intensity: f32,
    /// Degrees.
    pub anisotropy_rotation: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            maps: BTreeMap::new(),
            diffuse: Vec3::ONE,
            opacity: 1.0,
            use_metalness: false,
            metalness: 1.0,
            gloss: 1.0,
            gloss_invert: false,
            specular: Vec3::ONE,
            specular_srgb: false,
            use_metalness_specular_color: false,
            specularity_factor: 1.0,
            bumpiness: 1.0,
            ao_intensity: 1.0,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            blend: BlendMode::None,
            alpha_test: 0.0,
            depth_write: true,
            cull: CullMode::Back,
            two_sided_lighting: false,
            use_lighting: true,
            use_skybox: true,
            clear_coat: 0.0,
            clear_coat_gloss: 0.0,
            clear_coat_gloss_invert: false,
            clear_coat_bumpiness: 1.0,
            refraction_index: 1.0 / 1.5,
            dispersion: 0.0,
            refraction: 0.0,
            use_dynamic_refraction: false,
            use_sheen: false,
            sheen: Vec3::ZERO,
            sheen_gloss: 0.0,
            sheen_gloss_invert: false,
            thickness: 0.0,
            attenuation: Vec3::ONE,
            attenuation_distance: None,
            use_iridescence: false,
            iridescence: 0.0,
            iridescence_refraction_index: 1.3,
            iridescence_thickness_min: 100.0,
            iridescence_thickness_max: 400.0,
            enable_ggx_specular: false,
            anisotropy_intensity: 0.0,
            anisotropy_rotation: 0.0,
        }
    }
}

impl Material {
    pub fn map(&self, slot: MapSlot) -> Option<&TextureMap> {
        self.maps.get(&slot)
    }

    /// Binds `info` to every `(slot, channel)` pair.
    ///
    /// Nothing is bound when the referenced texture did not load.
    pub fn set_maps(
        &mut self,
        info: &TextureInfo,
        textures: &[Option<Texture>],
        slots: &[(MapSlot, Channel)],
    ) {
        if !matches!(textures.get(info.index), Some(Some(_))) {
            return;
        }
        for &(slot, channel) in slots {
            self.maps.insert(slot, texture_map(info, channel));
        }
    }

    pub fn set_map(
        &mut self,
        info: &TextureInfo,
        textures: &[Option<Texture>],
        slot: MapSlot,
        channel: Channel,
    ) {
        self.set_maps(info, textures, &[(slot, channel)]);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextureTransform {
    offset: Option<[f32; 2]>,
    scale: Option<[f32; 2]>,
    rotation: Option<f32>,
    tex_coord: Option<u32>,
}

/// Resolves UV channel and `KHR_texture_transform` for a texture reference.
///
/// The V offset is re-expressed for a bottom-left UV origin and the rotation
/// is negated and converted to degrees.
pub fn texture_map(info: &TextureInfo, channel: Channel) -> TextureMap {
    let transform: Option<TextureTransform> = info
        .extensions
        .get(TEXTURE_TRANSFORM_EXTENSION)
        .and_then(|value| serde_json::from_value(value.clone()).ok());

    let mut map = TextureMap {
        texture: info.index,
        uv: info.tex_coord,
        channel,
        tiling: Vec2::ONE,
        offset: Vec2::ZERO,
        rotation: 0.0,
    };
    if let Some(transform) = transform {
        let [ox, oy] = transform.offset.unwrap_or([0.0, 0.0]);
        let [sx, sy] = transform.scale.unwrap_or([1.0, 1.0]);
        map.tiling = Vec2::new(sx, sy);
        map.offset = Vec2::new(ox, 1.0 - sy - oy);
        map.rotation = transform.rotation.map_or(0.0, |r| -r.to_degrees());
        if let Some(uv) = transform.tex_coord {
            map.uv = uv;
        }
    }
    map
}

/// Builds a material from its schema record and the loaded textures.
///
/// # Errors
///
/// Returns `GraphError::Json` if a supported extension carries a malformed
/// payload.
pub fn build_material(material: &schema::Material, textures: &[Option<Texture>]) -> Result<Material> {
    let mut built = Material {
        name: material.name.clone().unwrap_or_default(),
        ..Material::default()
    };

    if let Some(pbr) = &material.pbr_metallic_roughness {
        built.use_metalness = true;
        if let Some([r, g, b, a]) = pbr.base_color_factor {
            built.diffuse = Vec3::new(r, g, b);
            built.opacity = a;
        }
        if let Some(info) = &pbr.base_color_texture {
            built.set_maps(
                info,
                textures,
                &[(MapSlot::Diffuse, Channel::Rgb), (MapSlot::Opacity, Channel::A)],
            );
        }
        built.metalness = pbr.metallic_factor.unwrap_or(1.0);
        built.gloss = pbr.roughness_factor.unwrap_or(1.0);
        built.gloss_invert = true;
        if let Some(info) = &pbr.metallic_roughness_texture {
            built.set_maps(
                info,
                textures,
                &[(MapSlot::Metalness, Channel::B), (MapSlot::Gloss, Channel::G)],
            );
        }
    }

    if let Some(info) = &material.normal_texture {
        built.set_map(info, textures, MapSlot::Normal, Channel::Rgb);
        built.bumpiness = info.scale.unwrap_or(1.0);
    }
    if let Some(info) = &material.occlusion_texture {
        built.set_map(info, textures, MapSlot::Ao, Channel::R);
        built.ao_intensity = info.strength.unwrap_or(1.0);
    }
    if let Some([r, g, b]) = material.emissive_factor {
        built.emissive = Vec3::new(r, g, b);
    }
    if let Some(info) = &material.emissive_texture {
        built.set_map(info, textures, MapSlot::Emissive, Channel::Rgb);
    }

    match material.alpha_mode.as_deref() {
        Some("BLEND") => {
            built.blend = BlendMode::Normal;
            built.depth_write = false;
        }
        Some("MASK") => {
            built.blend = BlendMode::None;
            built.alpha_test = material.alpha_cutoff.unwrap_or(0.5);
        }
        _ => built.blend = BlendMode::None,
    }

    if material.double_sided {
        built.two_sided_lighting = true;
        built.cull = CullMode::None;
    } else {
        built.two_sided_lighting = false;
        built.cull = CullMode::Back;
    }

    for (name, payload) in &material.extensions {
        MaterialExtension::parse(name, payload)?.apply(&mut built, textures);
    }
    Ok(built)
}

impl<'a> GraphBuilder<'a> {
    /// Builds every schema material; run once textures are installed.
    pub fn build_materials(&mut self) -> Result<()> {
        let materials = self
            .document
            .materials
            .iter()
            .map(|material| build_material(material, &self.graph.textures))
            .collect::<Result<Vec<_>>>()?;
        debug!(materials = materials.len(), "built materials");
        self.graph.materials = materials;
        Ok(())
    }
}
