//! Synchronous graph construction.
//!
//! [`GraphBuilder`] owns the per-build state: resolved buffer views, the
//! vertex buffer and skin dedup caches, and the [`ResourceGraph`] being
//! filled. Each stage is a method; the caller runs them in dependency order
//! once every buffer (and, for materials, every texture) is available.

use std::collections::HashMap;
use std::rc::Rc;

use glbgraph_core::accessor::{self, NumericView, ViewData};
use glbgraph_core::schema::{Accessor, Document};
use glbgraph_core::{GraphError, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::components::{Camera, Light, LIGHTS_EXTENSION};
use crate::compressed::DRACO_EXTENSION;
use crate::device::{GraphicsDevice, VertexBuffer};
use crate::extensions::MATERIAL_EXTENSIONS;
use crate::graph::{Render, ResourceGraph};
use crate::instancing::INSTANCING_EXTENSION;
use crate::material::TEXTURE_TRANSFORM_EXTENSION;
use crate::mesh::VARIANTS_EXTENSION;
use crate::node::{self, NodeId};
use crate::skin::Skin;
use crate::texture::Texture;
use crate::warning::Warning;

/// Generator tag of an exporter known to write flipped V coordinates.
pub const FLIPPED_UV_GENERATOR: &str = "PlayCanvas";

/// Extensions the builder understands besides the material transforms.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    DRACO_EXTENSION,
    INSTANCING_EXTENSION,
    LIGHTS_EXTENSION,
    TEXTURE_TRANSFORM_EXTENSION,
    VARIANTS_EXTENSION,
    "KHR_mesh_quantization",
    "KHR_texture_basisu",
    "EXT_texture_webp",
    "EXT_texture_avif",
];

/// When to flip the V coordinate of UV channels 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlipV {
    /// Flip when the asset was written by [`FLIPPED_UV_GENERATOR`].
    #[default]
    Auto,
    Always,
    Never,
}

/// Options controlling what the builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildOptions {
    pub flip_v: FlipV,
    pub skip_meshes: bool,
    pub skip_animations: bool,
}

/// Per-build state and stage methods.
pub struct GraphBuilder<'a> {
    pub(crate) document: &'a Document,
    pub(crate) buffers: Vec<&'a [u8]>,
    pub(crate) views: Vec<ViewData<'a>>,
    pub(crate) device: &'a dyn GraphicsDevice,
    pub(crate) options: BuildOptions,
    pub(crate) flip_v: bool,
    pub(crate) vertex_buffers: HashMap<String, Rc<VertexBuffer>>,
    pub(crate) skin_cache: HashMap<String, Rc<Skin>>,
    pub(crate) graph: ResourceGraph,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder over fully loaded buffers.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Format` if a buffer view does not fit its buffer.
    pub fn new<B: AsRef<[u8]>>(
        document: &'a Document,
        buffers: &'a [B],
        device: &'a dyn GraphicsDevice,
        options: BuildOptions,
    ) -> Result<Self> {
        let views = accessor::resolve_views(&document.buffer_views, buffers)?;
        let buffers: Vec<&'a [u8]> = buffers.iter().map(AsRef::as_ref).collect();

        let generator = document.asset.generator.as_deref();
        let flip_v = match options.flip_v {
            FlipV::Auto => generator == Some(FLIPPED_UV_GENERATOR),
            FlipV::Always => true,
            FlipV::Never => false,
        };

        let mut builder = Self {
            document,
            buffers,
            views,
            device,
            options,
            flip_v,
            vertex_buffers: HashMap::new(),
            skin_cache: HashMap::new(),
            graph: ResourceGraph::default(),
        };
        builder.graph.default_scene = document.default_scene();
        for name in &document.extensions_required {
            let name = name.as_str();
            if !SUPPORTED_EXTENSIONS.contains(&name) && !MATERIAL_EXTENSIONS.contains(&name) {
                builder.warn(Warning::UnsupportedExtension {
                    name: name.to_string(),
                });
            }
        }
        if flip_v && options.flip_v == FlipV::Auto && !document.meshes.is_empty() {
            builder.warn(Warning::FlippedUv {
                generator: FLIPPED_UV_GENERATOR.to_string(),
            });
        }
        Ok(builder)
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Resolved buffer view bytes, by view index.
    pub fn view(&self, index: usize) -> Result<&ViewData<'a>> {
        self.views
            .get(index)
            .ok_or_else(|| GraphError::format(format!("Missing buffer view {}", index)))
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.graph.warnings.push(warning);
    }

    pub(crate) fn accessor(&self, index: usize) -> Result<&'a Accessor> {
        self.document
            .accessors
            .get(index)
            .ok_or_else(|| GraphError::format(format!("Missing accessor {}", index)))
    }

    pub(crate) fn extract(&self, index: usize, flatten: bool) -> Result<NumericView<'a>> {
        accessor::extract(self.accessor(index)?, &self.views, flatten)
    }

    /// Packed float32 values of an accessor, dequantized when normalized.
    pub(crate) fn extract_f32(&self, index: usize) -> Result<Vec<f32>> {
        let accessor = self.accessor(index)?;
        let view = accessor::extract(accessor, &self.views, true)?;
        Ok(view.to_float32(accessor.normalized).to_vec::<f32>())
    }

    /// Builds the node hierarchy.
    pub fn build_nodes(&mut self) -> Result<()> {
        self.graph.nodes = node::build_nodes(&self.document.nodes)?;
        debug!(nodes = self.graph.nodes.len(), "built node hierarchy");
        Ok(())
    }

    /// Creates scene roots; run after [`GraphBuilder::build_nodes`].
    pub fn build_scenes(&mut self) -> Result<()> {
        self.graph.scenes = node::build_scenes(&mut self.graph.nodes, &self.document.scenes)?;
        Ok(())
    }

    /// Attaches cameras to the nodes that reference them.
    pub fn build_cameras(&mut self) -> Result<()> {
        for (index, node) in self.document.nodes.iter().enumerate() {
            let Some(camera) = node.camera.and_then(|c| self.document.cameras.get(c)) else {
                continue;
            };
            self.graph
                .cameras
                .insert(NodeId(index), Camera::from_schema(camera));
        }
        Ok(())
    }

    /// Attaches `KHR_lights_punctual` lights to the nodes that reference them.
    pub fn build_lights(&mut self) -> Result<()> {
        let Some(extension) = self.document.extension(crate::components::LIGHTS_EXTENSION) else {
            return Ok(());
        };
        let lights = Light::parse_all(extension)?;
        for (index, node) in self.document.nodes.iter().enumerate() {
            let Some(light) = node
                .extensions
                .get(crate::components::LIGHTS_EXTENSION)
                .and_then(|ext| ext.get("light"))
                .and_then(|light| light.as_u64())
                .and_then(|light| lights.get(light as usize))
            else {
                continue;
            };
            self.graph.lights.insert(NodeId(index), light.clone());
        }
        Ok(())
    }

    /// Reads document-level `KHR_materials_variants` names.
    pub fn build_variants(&mut self) -> Result<()> {
        #[derive(Deserialize)]
        struct VariantName {
            #[serde(default)]
            name: String,
        }
        #[derive(Deserialize)]
        struct Variants {
            #[serde(default)]
            variants: Vec<VariantName>,
        }

        if let Some(value) = self.document.extension(crate::mesh::VARIANTS_EXTENSION) {
            let variants: Variants = serde_json::from_value(value.clone())?;
            self.graph.variants = variants.variants.into_iter().map(|v| v.name).collect();
        }
        Ok(())
    }

    /// Installs loaded textures, indexed like the schema's textures.
    pub fn set_textures(&mut self, textures: Vec<Option<Texture>>) {
        for (index, texture) in textures.iter().enumerate() {
            if texture.is_none() {
                self.warn(Warning::MissingImage { texture: index });
            }
        }
        self.graph.textures = textures;
    }

    /// Gives every mesh of a skinned node's mesh group that node's skin.
    pub fn link_skins(&mut self) {
        for node in &self.document.nodes {
            let (Some(mesh), Some(skin)) = (node.mesh, node.skin) else {
                continue;
            };
            let (Some(group), Some(skin)) =
                (self.graph.mesh_groups.get(mesh), self.graph.skins.get(skin))
            else {
                continue;
            };
            for id in group {
                if let Some(mesh) = self.graph.meshes.get_mut(id.0) {
                    mesh.skin = Some(Rc::clone(skin));
                }
            }
        }
    }

    /// Wraps every mesh group in a render named after its schema mesh.
    pub fn build_renders(&mut self) {
        self.graph.renders = self
            .graph
            .mesh_groups
            .iter()
            .enumerate()
            .map(|(index, group)| Render {
                name: self
                    .document
                    .meshes
                    .get(index)
                    .and_then(|mesh| mesh.name.clone()),
                meshes: group.clone(),
            })
            .collect();
    }

    /// Hands out the finished graph.
    pub fn finish(self) -> ResourceGraph {
        debug!(
            meshes = self.graph.meshes.len(),
            materials = self.graph.materials.len(),
            animations = self.graph.animations.len(),
            warnings = self.graph.warnings.len(),
            "resource graph complete"
        );
        self.graph
    }

    /// Runs every stage that needs neither textures nor decompression.
    ///
    /// Returns the compressed primitives still waiting for geometry.
    pub fn build_structure(&mut self) -> Result<Vec<crate::compressed::CompressedPrimitive>> {
        self.build_nodes()?;
        self.build_scenes()?;
        self.build_lights()?;
        self.build_cameras()?;
        self.build_instancing()?;
        self.build_variants()?;
        let pending = self.build_meshes()?;
        self.build_animations()?;
        self.build_skins()?;
        Ok(pending)
    }

    /// Builds a graph with no textures or compressed geometry in one call.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Unsupported` if the document contains compressed
    /// primitives, which need an asynchronous decompressor.
    pub fn build(mut self) -> Result<ResourceGraph> {
        let pending = self.build_structure()?;
        if !pending.is_empty() {
            return Err(GraphError::unsupported(
                "Compressed primitives require a geometry decompressor",
            ));
        }
        self.graph.textures = vec![None; self.document.textures.len()];
        self.build_materials()?;
        self.link_skins();
        self.build_renders();
        Ok(self.finish())
    }
}
