//! Camera and light components attached to nodes.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use glam::{Quat, Vec3};
use glbgraph_core::schema;
use glbgraph_core::Result;
use serde::Deserialize;
use serde_json::Value;

pub const LIGHTS_EXTENSION: &str = "KHR_lights_punctual";

/// Far clip used when a perspective camera leaves `zfar` unset.
pub const DEFAULT_FAR_CLIP: f32 = 1000.0;

/// Range used when a light leaves `range` unset.
pub const DEFAULT_LIGHT_RANGE: f32 = 9999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Perspective,
    Orthographic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: Option<String>,
    pub projection: Projection,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Half the vertical extent of an orthographic view.
    pub ortho_height: f32,
    /// Fixed aspect ratio; `None` follows the render target.
    pub aspect_ratio: Option<f32>,
    pub near_clip: f32,
    pub far_clip: f32,
}

impl Camera {
    pub fn from_schema(camera: &schema::Camera) -> Self {
        let mut built = Camera {
            name: camera.name.clone(),
            projection: Projection::Perspective,
            fov: 45.0,
            ortho_height: 10.0,
            aspect_ratio: None,
            near_clip: 0.1,
            far_clip: DEFAULT_FAR_CLIP,
        };
        if camera.camera_type == "orthographic" {
            built.projection = Projection::Orthographic;
            if let Some(ortho) = &camera.orthographic {
                built.ortho_height = ortho.ymag * 0.5;
                if ortho.ymag != 0.0 {
                    built.aspect_ratio = Some(ortho.xmag / ortho.ymag);
                }
                built.near_clip = ortho.znear;
                built.far_clip = ortho.zfar;
            }
        } else if let Some(perspective) = &camera.perspective {
            built.fov = perspective.yfov.to_degrees();
            built.aspect_ratio = perspective.aspect_ratio;
            built.near_clip = perspective.znear;
            if let Some(far) = perspective.zfar {
                built.far_clip = far;
            }
        }
        built
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    Directional,
    Omni,
    Spot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub name: Option<String>,
    pub light_type: LightType,
    pub color: Vec3,
    /// Clamped to `[0, 2]`.
    pub intensity: f32,
    /// Declared intensity times the photometric conversion of the light type.
    pub luminance: f32,
    pub range: f32,
    /// Degrees.
    pub inner_cone_angle: f32,
    /// Degrees.
    pub outer_cone_angle: f32,
    /// Turns the node's -Z axis onto the light's -Y shining direction.
    pub local_rotation: Quat,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpotSchema {
    inner_cone_angle: Option<f32>,
    outer_cone_angle: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct LightSchema {
    name: Option<String>,
    #[serde(rename = "type")]
    light_type: String,
    color: Option<[f32; 3]>,
    intensity: Option<f32>,
    range: Option<f32>,
    spot: Option<SpotSchema>,
}

#[derive(Debug, Deserialize)]
struct LightsSchema {
    #[serde(default)]
    lights: Vec<LightSchema>,
}

/// Photometric scale from intensity to luminance. Angles in radians.
pub fn light_unit_conversion(light_type: LightType, outer: f32, inner: f32) -> f32 {
    match light_type {
        LightType::Spot => {
            let falloff_end = outer.cos();
            let falloff_start = inner.cos();
            2.0 * PI * ((1.0 - falloff_start) + (falloff_start - falloff_end) / 2.0)
        }
        LightType::Omni => 4.0 * PI,
        LightType::Directional => 1.0,
    }
}

impl Light {
    fn from_schema(light: LightSchema) -> Self {
        let light_type = match light.light_type.as_str() {
            "point" => LightType::Omni,
            "spot" => LightType::Spot,
            _ => LightType::Directional,
        };
        let (inner, outer) = match &light.spot {
            Some(spot) => (
                spot.inner_cone_angle.unwrap_or(0.0),
                spot.outer_cone_angle.unwrap_or(FRAC_PI_4),
            ),
            None => (0.0, FRAC_PI_4),
        };
        let declared = light.intensity.unwrap_or(1.0);
        Light {
            name: light.name,
            light_type,
            color: light.color.map_or(Vec3::ONE, Vec3::from_array),
            intensity: declared.clamp(0.0, 2.0),
            luminance: declared * light_unit_conversion(light_type, outer, inner),
            range: light.range.unwrap_or(DEFAULT_LIGHT_RANGE),
            inner_cone_angle: inner.to_degrees(),
            outer_cone_angle: outer.to_degrees(),
            local_rotation: Quat::from_rotation_x(FRAC_PI_2),
        }
    }

    /// Decodes the document-level light list of `KHR_lights_punctual`.
    pub fn parse_all(extension: &Value) -> Result<Vec<Light>> {
        let lights = LightsSchema::deserialize(extension)?;
        Ok(lights.lights.into_iter().map(Light::from_schema).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_perspective_camera() {
        let camera: schema::Camera = serde_json::from_value(json!({
            "type": "perspective",
            "perspective": {"yfov": std::f32::consts::FRAC_PI_2, "znear": 0.5, "aspectRatio": 1.5}
        }))
        .unwrap();
        let built = Camera::from_schema(&camera);
        assert_eq!(built.projection, Projection::Perspective);
        assert!((built.fov - 90.0).abs() < 1e-4);
        assert_eq!(built.aspect_ratio, Some(1.5));
        assert_eq!(built.near_clip, 0.5);
        assert_eq!(built.far_clip, DEFAULT_FAR_CLIP);
    }

    #[test]
    fn test_orthographic_camera() {
        let camera: schema::Camera = serde_json::from_value(json!({
            "type": "orthographic",
            "orthographic": {"xmag": 4.0, "ymag": 2.0, "znear": 0.1, "zfar": 50.0}
        }))
        .unwrap();
        let built = Camera::from_schema(&camera);
        assert_eq!(built.projection, Projection::Orthographic);
        assert_eq!(built.ortho_height, 1.0);
        assert_eq!(built.aspect_ratio, Some(2.0));
        assert_eq!(built.far_clip, 50.0);
    }

    #[test]
    fn test_lights() {
        let lights = Light::parse_all(&json!({
            "lights": [
                {"type": "point", "intensity": 5.0},
                {"type": "spot", "range": 10.0, "spot": {"outerConeAngle": 0.5}},
                {"type": "directional", "color": [1.0, 0.0, 0.0]}
            ]
        }))
        .unwrap();
        assert_eq!(lights.len(), 3);

        assert_eq!(lights[0].light_type, LightType::Omni);
        assert_eq!(lights[0].intensity, 2.0);
        assert!((lights[0].luminance - 20.0 * PI).abs() < 1e-3);
        assert_eq!(lights[0].range, DEFAULT_LIGHT_RANGE);

        assert_eq!(lights[1].light_type, LightType::Spot);
        assert_eq!(lights[1].inner_cone_angle, 0.0);
        assert!((lights[1].outer_cone_angle - 0.5f32.to_degrees()).abs() < 1e-4);
        assert_eq!(lights[1].range, 10.0);

        assert_eq!(lights[2].color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(lights[2].luminance, 1.0);
    }
}
