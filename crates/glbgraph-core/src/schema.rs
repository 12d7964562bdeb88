//! glTF 2.0 JSON schema model.
//!
//! The model is a passive set of serde structs. Decoding gates on the asset
//! version and nothing else; indices and extension payloads are checked by
//! the stage that first uses them.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::component::ElementType;
use crate::error::{GraphError, Result};

/// Lowest supported major version of the asset format.
pub const MIN_MAJOR_VERSION: u32 = 2;

/// Extension objects keyed by extension name, in declaration order.
pub type Extensions = Map<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub asset: Asset,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub buffers: Vec<Buffer>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub textures: Vec<Texture>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub samplers: Vec<Sampler>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// Default scene index (if present).
    pub scene: Option<usize>,
    #[serde(default)]
    pub animations: Vec<Animation>,
    #[serde(default)]
    pub skins: Vec<Skin>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub extensions: Extensions,
    #[serde(default)]
    pub extensions_used: Vec<String>,
    #[serde(default)]
    pub extensions_required: Vec<String>,
}

impl Document {
    /// Decodes schema bytes and checks the asset version.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Json` for invalid UTF-8 or JSON and
    /// `GraphError::Format` when the major version is below 2.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let document: Document = serde_json::from_slice(bytes)?;
        if let Some(major) = document.asset.major_version() {
            if major < MIN_MAJOR_VERSION {
                return Err(GraphError::format(format!(
                    "Unsupported asset version {}, expected at least {}.0",
                    document.asset.version, MIN_MAJOR_VERSION
                )));
            }
        }
        Ok(document)
    }

    /// Returns the extension object declared at document level, if any.
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions.get(name)
    }

    pub fn requires_extension(&self, name: &str) -> bool {
        self.extensions_required.iter().any(|ext| ext == name)
    }

    /// Index of the scene shown by default.
    pub fn default_scene(&self) -> usize {
        self.scene.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default)]
    pub version: String,
    pub min_version: Option<String>,
    pub generator: Option<String>,
    pub copyright: Option<String>,
}

impl Asset {
    /// Parses the major part of `version`; `None` if it is not numeric.
    pub fn major_version(&self) -> Option<u32> {
        self.version.split('.').next()?.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    #[serde(default)]
    pub byte_length: usize,
    pub uri: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
    pub target: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub min: Option<Vec<f64>>,
    pub max: Option<Vec<f64>>,
    pub sparse: Option<Sparse>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sparse {
    pub count: usize,
    pub indices: SparseIndices,
    pub values: SparseValues,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseIndices {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseValues {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    pub name: Option<String>,
    #[serde(default)]
    pub primitives: Vec<Primitive>,
    pub weights: Option<Vec<f32>>,
    pub extras: Option<Value>,
}

impl Mesh {
    /// Morph target names from `extras.targetNames`.
    pub fn target_names(&self) -> Option<Vec<String>> {
        let names = self.extras.as_ref()?.get("targetNames")?.as_array()?;
        Some(
            names
                .iter()
                .map(|n| n.as_str().unwrap_or_default().to_string())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Primitive {
    #[serde(default)]
    pub attributes: BTreeMap<String, usize>,
    pub indices: Option<usize>,
    pub mode: Option<u32>,
    pub material: Option<usize>,
    pub targets: Option<Vec<BTreeMap<String, usize>>>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: Option<String>,
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    pub normal_texture: Option<TextureInfo>,
    pub occlusion_texture: Option<TextureInfo>,
    pub emissive_texture: Option<TextureInfo>,
    pub emissive_factor: Option<[f32; 3]>,
    pub alpha_mode: Option<String>,
    pub alpha_cutoff: Option<f32>,
    #[serde(default)]
    pub double_sided: bool,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    pub base_color_factor: Option<[f32; 4]>,
    pub base_color_texture: Option<TextureInfo>,
    pub metallic_factor: Option<f32>,
    pub roughness_factor: Option<f32>,
    pub metallic_roughness_texture: Option<TextureInfo>,
}

/// Reference from a material slot to a texture.
///
/// `scale` is only meaningful for normal maps and `strength` for occlusion.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    pub index: usize,
    #[serde(default)]
    pub tex_coord: u32,
    pub scale: Option<f32>,
    pub strength: Option<f32>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Texture {
    pub name: Option<String>,
    pub sampler: Option<usize>,
    pub source: Option<usize>,
    #[serde(default)]
    pub extensions: Extensions,
}

impl Texture {
    /// Image index, preferring compressed-format extension sources.
    pub fn image_source(&self) -> Option<usize> {
        ["KHR_texture_basisu", "EXT_texture_webp", "EXT_texture_avif"]
            .iter()
            .find_map(|name| {
                self.extensions
                    .get(*name)?
                    .get("source")?
                    .as_u64()
                    .map(|source| source as usize)
            })
            .or(self.source)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub buffer_view: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: Option<u32>,
    pub wrap_t: Option<u32>,
}

/// A node in the scene graph.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub camera: Option<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    /// 4x4 transformation matrix (column-major).
    pub matrix: Option<[f32; 16]>,
    pub translation: Option<[f32; 3]>,
    /// Rotation quaternion [x, y, z, w].
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    pub weights: Option<Vec<f32>>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    pub name: Option<String>,
    pub inverse_bind_matrices: Option<usize>,
    pub skeleton: Option<usize>,
    pub joints: Vec<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    pub name: Option<String>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub samplers: Vec<AnimationSampler>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub sampler: usize,
    pub target: ChannelTarget,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTarget {
    pub node: Option<usize>,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSampler {
    pub input: usize,
    pub output: usize,
    pub interpolation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub camera_type: String,
    pub perspective: Option<Perspective>,
    pub orthographic: Option<Orthographic>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Perspective {
    pub aspect_ratio: Option<f32>,
    pub yfov: f32,
    pub zfar: Option<f32>,
    pub znear: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orthographic {
    pub xmag: f32,
    pub ymag: f32,
    pub zfar: f32,
    pub znear: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal() {
        let json = r#"{"asset":{"version":"2.0","generator":"unit"}}"#;
        let doc = Document::decode(json.as_bytes()).unwrap();
        assert_eq!(doc.asset.generator.as_deref(), Some("unit"));
        assert!(doc.meshes.is_empty());
        assert_eq!(doc.default_scene(), 0);
    }

    #[test]
    fn test_decode_rejects_old_version() {
        let json = r#"{"asset":{"version":"1.0"}}"#;
        let err = Document::decode(json.as_bytes()).unwrap_err();
        assert!(matches!(err, GraphError::Format(_)));
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        assert!(Document::decode(b"{\"asset\":").unwrap_err().is_format());
        assert!(Document::decode(&[0xFF, 0xFE, 0x00]).unwrap_err().is_format());
    }

    #[test]
    fn test_decode_accessor_and_sparse() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "accessors": [{
                "componentType": 5126, "count": 4, "type": "VEC3",
                "sparse": {
                    "count": 1,
                    "indices": {"bufferView": 1, "componentType": 5123},
                    "values": {"bufferView": 2, "byteOffset": 4}
                }
            }]
        }"#;
        let doc = Document::decode(json.as_bytes()).unwrap();
        let accessor = &doc.accessors[0];
        assert!(accessor.buffer_view.is_none());
        assert_eq!(accessor.element_type, ElementType::Vec3);
        let sparse = accessor.sparse.as_ref().unwrap();
        assert_eq!(sparse.indices.component_type, 5123);
        assert_eq!(sparse.values.byte_offset, 4);
    }

    #[test]
    fn test_material_extensions_keep_declaration_order() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "materials": [{
                "extensions": {
                    "KHR_materials_unlit": {},
                    "KHR_materials_clearcoat": {"clearcoatFactor": 1.0},
                    "KHR_materials_ior": {"ior": 1.5}
                }
            }]
        }"#;
        let doc = Document::decode(json.as_bytes()).unwrap();
        let names: Vec<&str> = doc.materials[0]
            .extensions
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            names,
            ["KHR_materials_unlit", "KHR_materials_clearcoat", "KHR_materials_ior"]
        );
    }

    #[test]
    fn test_texture_source_precedence() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "textures": [
                {"source": 0},
                {"source": 0, "extensions": {"EXT_texture_webp": {"source": 2}}},
                {"source": 0, "extensions": {
                    "EXT_texture_webp": {"source": 2},
                    "KHR_texture_basisu": {"source": 3}
                }}
            ]
        }"#;
        let doc = Document::decode(json.as_bytes()).unwrap();
        assert_eq!(doc.textures[0].image_source(), Some(0));
        assert_eq!(doc.textures[1].image_source(), Some(2));
        assert_eq!(doc.textures[2].image_source(), Some(3));
    }

    #[test]
    fn test_target_names() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "meshes": [{"primitives": [], "extras": {"targetNames": ["smile", "blink"]}}]
        }"#;
        let doc = Document::decode(json.as_bytes()).unwrap();
        assert_eq!(
            doc.meshes[0].target_names().unwrap(),
            vec!["smile".to_string(), "blink".to_string()]
        );
    }
}
