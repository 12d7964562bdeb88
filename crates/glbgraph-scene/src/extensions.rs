//! Material extension dispatch.
//!
//! Each supported `KHR_materials_*` extension is a variant of
//! [`MaterialExtension`] carrying its decoded payload. Names outside the set
//! parse to [`MaterialExtension::Unknown`], which leaves the material as is.

use glam::Vec3;
use glbgraph_core::schema::TextureInfo;
use glbgraph_core::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::material::{Channel, MapSlot, Material};
use crate::texture::Texture;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecularGlossiness {
    pub diffuse_factor: Option<[f32; 4]>,
    pub diffuse_texture: Option<TextureInfo>,
    pub specular_factor: Option<[f32; 3]>,
    pub glossiness_factor: Option<f32>,
    pub specular_glossiness_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clearcoat {
    pub clearcoat_factor: Option<f32>,
    pub clearcoat_texture: Option<TextureInfo>,
    pub clearcoat_roughness_factor: Option<f32>,
    pub clearcoat_roughness_texture: Option<TextureInfo>,
    pub clearcoat_normal_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specular {
    pub specular_factor: Option<f32>,
    pub specular_texture: Option<TextureInfo>,
    pub specular_color_factor: Option<[f32; 3]>,
    pub specular_color_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ior {
    pub ior: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dispersion {
    pub dispersion: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transmission {
    pub transmission_factor: Option<f32>,
    pub transmission_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheen {
    pub sheen_color_factor: Option<[f32; 3]>,
    pub sheen_color_texture: Option<TextureInfo>,
    pub sheen_roughness_factor: Option<f32>,
    pub sheen_roughness_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub thickness_factor: Option<f32>,
    pub thickness_texture: Option<TextureInfo>,
    pub attenuation_distance: Option<f32>,
    pub attenuation_color: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissiveStrength {
    pub emissive_strength: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iridescence {
    pub iridescence_factor: Option<f32>,
    pub iridescence_texture: Option<TextureInfo>,
    pub iridescence_ior: Option<f32>,
    pub iridescence_thickness_minimum: Option<f32>,
    pub iridescence_thickness_maximum: Option<f32>,
    pub iridescence_thickness_texture: Option<TextureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anisotropy {
    pub anisotropy_strength: Option<f32>,
    /// Radians.
    pub anisotropy_rotation: Option<f32>,
    pub anisotropy_texture: Option<TextureInfo>,
}

/// A material extension and its payload.
#[derive(Debug, Clone)]
pub enum MaterialExtension {
    SpecularGlossiness(SpecularGlossiness),
    Clearcoat(Clearcoat),
    Unlit,
    Specular(Specular),
    Ior(Ior),
    Dispersion(Dispersion),
    Transmission(Transmission),
    Sheen(Sheen),
    Volume(Volume),
    EmissiveStrength(EmissiveStrength),
    Iridescence(Iridescence),
    Anisotropy(Anisotropy),
    Unknown(String),
}

fn payload<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T> {
    Ok(T::deserialize(value)?)
}

fn color(rgb: [f32; 3]) -> Vec3 {
    Vec3::from_array(rgb)
}

/// Material extensions with a dedicated transform.
pub const MATERIAL_EXTENSIONS: &[&str] = &[
    "KHR_materials_pbrSpecularGlossiness",
    "KHR_materials_clearcoat",
    "KHR_materials_unlit",
    "KHR_materials_specular",
    "KHR_materials_ior",
    "KHR_materials_dispersion",
    "KHR_materials_transmission",
    "KHR_materials_sheen",
    "KHR_materials_volume",
    "KHR_materials_emissive_strength",
    "KHR_materials_iridescence",
    "KHR_materials_anisotropy",
];

impl MaterialExtension {
    /// Decodes the payload of the extension called `name`.
    pub fn parse(name: &str, value: &Value) -> Result<Self> {
        Ok(match name {
            "KHR_materials_pbrSpecularGlossiness" => Self::SpecularGlossiness(payload(value)?),
            "KHR_materials_clearcoat" => Self::Clearcoat(payload(value)?),
            "KHR_materials_unlit" => Self::Unlit,
            "KHR_materials_specular" => Self::Specular(payload(value)?),
            "KHR_materials_ior" => Self::Ior(payload(value)?),
            "KHR_materials_dispersion" => Self::Dispersion(payload(value)?),
            "KHR_materials_transmission" => Self::Transmission(payload(value)?),
            "KHR_materials_sheen" => Self::Sheen(payload(value)?),
            "KHR_materials_volume" => Self::Volume(payload(value)?),
            "KHR_materials_emissive_strength" => Self::EmissiveStrength(payload(value)?),
            "KHR_materials_iridescence" => Self::Iridescence(payload(value)?),
            "KHR_materials_anisotropy" => Self::Anisotropy(payload(value)?),
            other => Self::Unknown(other.to_string()),
        })
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Mutates `material` in place.
    pub fn apply(&self, material: &mut Material, textures: &[Option<Texture>]) {
        match self {
            Self::SpecularGlossiness(ext) => {
                material.use_metalness = false;
                match ext.diffuse_factor {
                    Some([r, g, b, a]) => {
                        material.diffuse = Vec3::new(r, g, b);
                        material.opacity = a;
                    }
                    None => {
                        material.diffuse = Vec3::ONE;
                        material.opacity = 1.0;
                    }
                }
                if let Some(info) = &ext.diffuse_texture {
                    material.set_maps(
                        info,
                        textures,
                        &[(MapSlot::Diffuse, Channel::Rgb), (MapSlot::Opacity, Channel::A)],
                    );
                }
                material.specular = ext.specular_factor.map_or(Vec3::ONE, color);
                material.gloss = ext.glossiness_factor.unwrap_or(1.0);
                if let Some(info) = &ext.specular_glossiness_texture {
                    material.specular_srgb = true;
                    material.set_maps(
                        info,
                        textures,
                        &[(MapSlot::Specular, Channel::Rgb), (MapSlot::Gloss, Channel::A)],
                    );
                }
                material.gloss_invert = false;
            }
            Self::Clearcoat(ext) => {
                material.clear_coat = ext.clearcoat_factor.unwrap_or(0.0);
                if let Some(info) = &ext.clearcoat_texture {
                    material.set_map(info, textures, MapSlot::ClearCoat, Channel::R);
                }
                material.clear_coat_gloss = ext.clearcoat_roughness_factor.unwrap_or(0.0);
                if let Some(info) = &ext.clearcoat_roughness_texture {
                    material.set_map(info, textures, MapSlot::ClearCoatGloss, Channel::G);
                }
                if let Some(info) = &ext.clearcoat_normal_texture {
                    material.set_map(info, textures, MapSlot::ClearCoatNormal, Channel::Rgb);
                    material.clear_coat_bumpiness = info.scale.unwrap_or(1.0);
                }
                material.clear_coat_gloss_invert = true;
            }
            Self::Unlit => {
                material.use_lighting = false;
                material.use_skybox = false;
                material.emissive = material.diffuse;
                match material.maps.remove(&MapSlot::Diffuse) {
                    Some(map) => {
                        material.maps.insert(MapSlot::Emissive, map);
                    }
                    None => {
                        material.maps.remove(&MapSlot::Emissive);
                    }
                }
                material.diffuse = Vec3::ZERO;
                material.emissive_intensity = 1.0;
            }
            Self::Specular(ext) => {
                material.use_metalness_specular_color = true;
                if let Some(info) = &ext.specular_color_texture {
                    material.specular_srgb = true;
                    material.set_map(info, textures, MapSlot::Specular, Channel::Rgb);
                }
                material.specular = ext.specular_color_factor.map_or(Vec3::ONE, color);
                material.specularity_factor = ext.specular_factor.unwrap_or(1.0);
                if let Some(info) = &ext.specular_texture {
                    material.set_map(info, textures, MapSlot::SpecularityFactor, Channel::A);
                }
            }
            Self::Ior(ext) => {
                material.refraction_index = 1.0 / ext.ior.unwrap_or(1.5);
            }
            Self::Dispersion(ext) => {
                material.dispersion = ext.dispersion.unwrap_or(0.0);
            }
            Self::Transmission(ext) => {
                material.blend = crate::material::BlendMode::Normal;
                material.use_dynamic_refraction = true;
                material.refraction = ext.transmission_factor.unwrap_or(0.0);
                if let Some(info) = &ext.transmission_texture {
                    material.set_map(info, textures, MapSlot::Refraction, Channel::R);
                }
            }
            Self::Sheen(ext) => {
                material.use_sheen = true;
                material.sheen = ext.sheen_color_factor.map_or(Vec3::ONE, color);
                if let Some(info) = &ext.sheen_color_texture {
                    material.set_map(info, textures, MapSlot::Sheen, Channel::Rgb);
                }
                material.sheen_gloss = ext.sheen_roughness_factor.unwrap_or(0.0);
                if let Some(info) = &ext.sheen_roughness_texture {
                    material.set_map(info, textures, MapSlot::SheenGloss, Channel::A);
                }
                material.sheen_gloss_invert = true;
            }
            Self::Volume(ext) => {
                material.thickness = ext.thickness_factor.unwrap_or(0.0);
                if let Some(info) = &ext.thickness_texture {
                    material.set_map(info, textures, MapSlot::Thickness, Channel::G);
                }
                material.attenuation_distance = ext.attenuation_distance;
                material.attenuation = ext.attenuation_color.map_or(Vec3::ONE, color);
            }
            Self::EmissiveStrength(ext) => {
                material.emissive_intensity = ext.emissive_strength.unwrap_or(1.0);
            }
            Self::Iridescence(ext) => {
                material.use_iridescence = true;
                material.iridescence = ext.iridescence_factor.unwrap_or(0.0);
                if let Some(info) = &ext.iridescence_texture {
                    material.set_map(info, textures, MapSlot::Iridescence, Channel::R);
                }
                material.iridescence_refraction_index = ext.iridescence_ior.unwrap_or(1.3);
                material.iridescence_thickness_min =
                    ext.iridescence_thickness_minimum.unwrap_or(100.0);
                material.iridescence_thickness_max =
                    ext.iridescence_thickness_maximum.unwrap_or(400.0);
                if let Some(info) = &ext.iridescence_thickness_texture {
                    material.set_map(info, textures, MapSlot::IridescenceThickness, Channel::G);
                }
            }
            Self::Anisotropy(ext) => {
                material.enable_ggx_specular = true;
                material.anisotropy_intensity = ext.anisotropy_strength.unwrap_or(0.0);
                material.anisotropy_rotation =
                    ext.anisotropy_rotation.map_or(0.0, f32::to_degrees);
                if let Some(info) = &ext.anisotropy_texture {
                    material.set_map(info, textures, MapSlot::Anisotropy, Channel::Rgb);
                }
            }
            Self::Unknown(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::material::build_material;
    use crate::texture::DecodedImage;

    fn textures() -> Vec<Option<Texture>> {
        vec![Some(Texture::new("t", Rc::new(DecodedImage::default())))]
    }

    fn build(json: Value) -> Material {
        build_material(&serde_json::from_value(json).unwrap(), &textures()).unwrap()
    }

    #[test]
    fn test_unknown_extension_is_ignored() {
        let ext = MaterialExtension::parse("EXT_made_up", &json!({"x": 1})).unwrap();
        assert!(!ext.is_known());
        let built = build(json!({"extensions": {"EXT_made_up": {"x": 1}}}));
        assert_eq!(built, Material::default());
    }

    #[test]
    fn test_specular_glossiness() {
        let built = build(json!({
            "pbrMetallicRoughness": {"roughnessFactor": 0.2},
            "extensions": {
                "KHR_materials_pbrSpecularGlossiness": {
                    "diffuseFactor": [0.1, 0.2, 0.3, 0.4],
                    "glossinessFactor": 0.6,
                    "specularGlossinessTexture": {"index": 0}
                }
            }
        }));
        assert!(!built.use_metalness);
        assert!(!built.gloss_invert);
        assert_eq!(built.gloss, 0.6);
        assert_eq!(built.opacity, 0.4);
        assert_eq!(built.specular, Vec3::ONE);
        assert_eq!(built.map(MapSlot::Gloss).unwrap().channel, Channel::A);
        assert!(built.map(MapSlot::Specular).is_some());
    }

    #[test]
    fn test_clearcoat_uses_factor() {
        let built = build(json!({
            "extensions": {
                "KHR_materials_clearcoat": {
                    "clearcoatFactor": 0.8,
                    "clearcoatRoughnessFactor": 0.1,
                    "clearcoatNormalTexture": {"index": 0, "scale": 2.0}
                }
            }
        }));
        assert_eq!(built.clear_coat, 0.8);
        assert_eq!(built.clear_coat_gloss, 0.1);
        assert!(built.clear_coat_gloss_invert);
        assert_eq!(built.clear_coat_bumpiness, 2.0);
    }

    #[test]
    fn test_unlit_moves_diffuse_to_emissive() {
        let built = build(json!({
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 0.5, 0.0, 1.0],
                "baseColorTexture": {"index": 0}
            },
            "extensions": {"KHR_materials_unlit": {}}
        }));
        assert!(!built.use_lighting);
        assert_eq!(built.emissive, Vec3::new(1.0, 0.5, 0.0));
        assert_eq!(built.diffuse, Vec3::ZERO);
        assert!(built.map(MapSlot::Diffuse).is_none());
        assert!(built.map(MapSlot::Emissive).is_some());
    }

    #[test]
    fn test_extensions_apply_in_declaration_order() {
        let built = build(json!({
            "extensions": {
                "KHR_materials_emissive_strength": {"emissiveStrength": 4.0},
                "KHR_materials_unlit": {}
            }
        }));
        // Unlit runs second and resets the intensity.
        assert_eq!(built.emissive_intensity, 1.0);

        let built = build(json!({
            "extensions": {
                "KHR_materials_unlit": {},
                "KHR_materials_emissive_strength": {"emissiveStrength": 4.0}
            }
        }));
        assert_eq!(built.emissive_intensity, 4.0);
    }

    #[test]
    fn test_ior_transmission_volume() {
        let built = build(json!({
            "extensions": {
                "KHR_materials_ior": {"ior": 2.0},
                "KHR_materials_transmission": {"transmissionFactor": 0.9},
                "KHR_materials_volume": {"thicknessFactor": 0.5, "attenuationDistance": 3.0}
            }
        }));
        assert_eq!(built.refraction_index, 0.5);
        assert_eq!(built.refraction, 0.9);
        assert!(built.use_dynamic_refraction);
        assert_eq!(built.blend, crate::material::BlendMode::Normal);
        assert_eq!(built.thickness, 0.5);
        assert_eq!(built.attenuation_distance, Some(3.0));
        assert_eq!(built.attenuation, Vec3::ONE);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let result = MaterialExtension::parse("KHR_materials_ior", &json!({"ior": "high"}));
        assert!(result.unwrap_err().is_format());
    }
}
