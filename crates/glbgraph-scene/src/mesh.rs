//! Mesh construction: vertex and index buffers, morph targets, variants.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};
use glam::Vec3;
use glbgraph_core::accessor::{bounding_box, BoundingBox, NumericView, Origin};
use glbgraph_core::schema;
use glbgraph_core::{ComponentKind, GraphError, Result};
use serde::Deserialize;
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::compressed::{CompressedPrimitive, DRACO_EXTENSION};
use crate::device::{
    DeviceCaps, GraphicsDevice, IndexBuffer, IndexFormat, Semantic, VertexBuffer,
    VertexElementDesc, VertexFormat,
};
use crate::skin::Skin;
use crate::warning::Warning;

pub const VARIANTS_EXTENSION: &str = "KHR_materials_variants";

/// Index of a mesh in [`crate::ResourceGraph::meshes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl Topology {
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode {
            0 => Some(Topology::Points),
            1 => Some(Topology::Lines),
            2 => Some(Topology::LineLoop),
            3 => Some(Topology::LineStrip),
            4 => Some(Topology::Triangles),
            5 => Some(Topology::TriangleStrip),
            6 => Some(Topology::TriangleFan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawPrimitive {
    pub topology: Topology,
    pub base: usize,
    pub count: usize,
    pub indexed: bool,
}

/// One blend shape.
#[derive(Debug, Clone, Default)]
pub struct MorphTarget {
    pub name: String,
    pub delta_positions: Option<Vec<f32>>,
    pub delta_normals: Option<Vec<f32>>,
    pub aabb: Option<BoundingBox>,
    pub default_weight: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Morph {
    pub targets: Vec<MorphTarget>,
}

impl Morph {
    pub fn target_index(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name == name)
    }
}

/// Drawable geometry built from one schema primitive.
#[derive(Debug)]
pub struct Mesh {
    pub id: MeshId,
    /// `None` only while a compressed primitive awaits decompression.
    pub vertex_buffer: Option<Rc<VertexBuffer>>,
    pub index_buffer: Option<IndexBuffer>,
    pub primitives: Vec<DrawPrimitive>,
    pub aabb: Option<BoundingBox>,
    pub morph: Option<Morph>,
    pub skin: Option<Rc<Skin>>,
    /// Schema material index.
    pub material: Option<usize>,
}

impl Mesh {
    pub fn new(id: MeshId, topology: Topology) -> Self {
        Self {
            id,
            vertex_buffer: None,
            index_buffer: None,
            primitives: vec![DrawPrimitive {
                topology,
                ..DrawPrimitive::default()
            }],
            aabb: None,
            morph: None,
            skin: None,
            material: None,
        }
    }
}

/// Attribute data feeding one vertex buffer build.
#[derive(Debug, Clone)]
pub struct VertexSource<'a> {
    pub view: NumericView<'a>,
    pub normalize: bool,
}

impl VertexSource<'_> {
    pub fn desc(&self, semantic: Semantic) -> VertexElementDesc {
        VertexElementDesc {
            semantic,
            components: self.view.components(),
            kind: self.view.kind(),
            normalize: self.normalize,
        }
    }
}

/// Dedup key of a primitive's vertex buffer: sorted `NAME:accessor` pairs of
/// the attributes the builder maps.
pub fn vertex_buffer_key(attributes: &BTreeMap<String, usize>) -> String {
    let mut ids: Vec<String> = attributes
        .iter()
        .filter(|(name, _)| Semantic::from_attribute(name).is_some())
        .map(|(name, index)| format!("{}:{}", name, index))
        .collect();
    ids.sort();
    ids.join(",")
}

/// Face-averaged vertex normals for a triangle list.
///
/// Triangles referencing vertices outside `positions` are skipped.
pub fn calculate_normals(positions: &[f32], indices: &[u32]) -> Vec<f32> {
    let count = positions.len() / 3;
    let point = |i: usize| Vec3::new(positions[i * 3], positions[i * 3 + 1], positions[i * 3 + 2]);
    let mut accumulated = vec![Vec3::ZERO; count];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= count || b >= count || c >= count {
            continue;
        }
        let (p1, p2, p3) = (point(a), point(b), point(c));
        let face = (p2 - p1).cross(p3 - p1).normalize_or_zero();
        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[c] += face;
    }

    accumulated
        .into_iter()
        .flat_map(|n| n.normalize_or_zero().to_array())
        .collect()
}

/// Generates float32 normals from a 3-component position source.
///
/// Without `indices` the vertices are taken as a sequential triangle list.
pub fn generate_normals(
    position: &VertexSource<'_>,
    indices: Option<&[u32]>,
) -> Option<VertexSource<'static>> {
    if position.view.components() != 3 {
        return None;
    }
    let positions = position.view.to_vec::<f32>();
    let sequential: Vec<u32>;
    let indices = match indices {
        Some(indices) => indices,
        None => {
            sequential = (0..position.view.count() as u32).collect();
            &sequential
        }
    };
    let normals = calculate_normals(&positions, indices);
    Some(VertexSource {
        view: NumericView::from_f32(&normals, 3),
        normalize: false,
    })
}

/// Origin of the position data if every source already sits in one buffer
/// with exactly the target layout.
fn interleaved_origin(
    format: &VertexFormat,
    sources: &BTreeMap<Semantic, VertexSource<'_>>,
) -> Option<Origin> {
    let position = sources.get(&Semantic::Position)?.view.origin()?;
    for element in &format.elements {
        let source = sources.get(&element.semantic)?;
        let origin = source.view.origin()?;
        let relative = origin.byte_offset.checked_sub(position.byte_offset);
        if origin.buffer != position.buffer
            || source.view.stride() != element.stride
            || source.view.element_size() != element.size
            || relative != Some(element.offset)
        {
            return None;
        }
    }
    Some(position)
}

/// Creates an interleaved vertex buffer from attribute sources.
///
/// Attributes are laid out in canonical semantic order; any the device cannot
/// fetch gain one component. Returns `None` when there is no position source.
pub fn create_vertex_buffer(
    device: &dyn GraphicsDevice,
    sources: &BTreeMap<Semantic, VertexSource<'_>>,
    buffers: &[&[u8]],
    flip_v: bool,
) -> Option<VertexBuffer> {
    let num_vertices = sources.get(&Semantic::Position)?.view.count();
    let caps = device.caps();

    let mut descs: Vec<VertexElementDesc> = sources
        .iter()
        .map(|(&semantic, source)| {
            let mut desc = source.desc(semantic);
            if !caps.supports_element(&desc) {
                desc.components += 1;
            }
            desc
        })
        .collect();
    descs.sort_by_key(|desc| desc.semantic.order());
    let format = VertexFormat::interleaved(&descs);

    let bulk = interleaved_origin(&format, sources).and_then(|origin| {
        let start = origin.byte_offset;
        buffers
            .get(origin.buffer)?
            .get(start..start + num_vertices * format.size)
    });

    let mut vertex_buffer = VertexBuffer::new(device, format.clone(), num_vertices);
    let data = vertex_buffer.lock();
    match bulk {
        Some(bytes) => data.copy_from_slice(bytes),
        None => {
            for element in &format.elements {
                let Some(source) = sources.get(&element.semantic) else {
                    continue;
                };
                let size = source.view.element_size();
                for vertex in 0..num_vertices.min(source.view.count()) {
                    let dst = vertex * element.stride + element.offset;
                    data[dst..dst + size].copy_from_slice(source.view.element(vertex));
                }
            }
        }
    }
    if flip_v {
        flip_tex_coord_vs(&format, data, num_vertices);
    }
    vertex_buffer.unlock();
    Some(vertex_buffer)
}

/// Replaces the V coordinate of UV channels 0 and 1 with its complement.
pub fn flip_tex_coord_vs(format: &VertexFormat, data: &mut [u8], num_vertices: usize) {
    let channels = format.elements.iter().filter(|e| {
        matches!(e.semantic, Semantic::TexCoord(0) | Semantic::TexCoord(1)) && e.components >= 2
    });
    for element in channels {
        let v_offset = element.offset + element.kind.size();
        for vertex in 0..num_vertices {
            let at = vertex * element.stride + v_offset;
            match element.kind {
                ComponentKind::F32 => {
                    let v = LittleEndian::read_f32(&data[at..]);
                    LittleEndian::write_f32(&mut data[at..], 1.0 - v);
                }
                ComponentKind::U16 => {
                    let v = LittleEndian::read_u16(&data[at..]);
                    LittleEndian::write_u16(&mut data[at..], u16::MAX - v);
                }
                ComponentKind::U8 => data[at] = u8::MAX - data[at],
                _ => {}
            }
        }
    }
}

/// Picks the index width for an index accessor stored as `kind`.
///
/// Returns the format and whether a 32-bit source had to be narrowed.
///
/// # Errors
///
/// Returns `GraphError::Format` for index data that is not unsigned.
pub fn index_format_for(kind: ComponentKind, caps: &DeviceCaps) -> Result<(IndexFormat, bool)> {
    match kind {
        ComponentKind::U8 if caps.u8_indices => Ok((IndexFormat::U8, false)),
        ComponentKind::U8 | ComponentKind::U16 => Ok((IndexFormat::U16, false)),
        ComponentKind::U32 if caps.u32_indices => Ok((IndexFormat::U32, false)),
        ComponentKind::U32 => Ok((IndexFormat::U16, true)),
        other => Err(GraphError::format(format!(
            "Index data must be unsigned, found {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
struct VariantMapping {
    material: usize,
    #[serde(default)]
    variants: Vec<usize>,
}

#[derive(Deserialize)]
struct PrimitiveVariants {
    #[serde(default)]
    mappings: Vec<VariantMapping>,
}

impl<'a> GraphBuilder<'a> {
    /// Builds one mesh group per schema mesh.
    ///
    /// Returns the compressed primitives whose geometry is still pending.
    pub fn build_meshes(&mut self) -> Result<Vec<CompressedPrimitive>> {
        let mut pending = Vec::new();
        if self.options.skip_meshes {
            return Ok(pending);
        }
        let document = self.document;
        for (mesh_index, mesh) in document.meshes.iter().enumerate() {
            let mut group = Vec::with_capacity(mesh.primitives.len());
            for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
                if let Some(component_type) = self.unsupported_component(primitive) {
                    self.warn(Warning::UnsupportedComponent {
                        mesh: mesh_index,
                        primitive: primitive_index,
                        component_type,
                    });
                    continue;
                }
                let built = if primitive.extensions.contains_key(DRACO_EXTENSION) {
                    let (id, compressed) =
                        self.build_compressed_mesh(mesh_index, primitive_index, primitive)?;
                    pending.push(compressed);
                    Some(id)
                } else {
                    self.build_mesh(mesh_index, mesh, primitive_index, primitive)?
                };
                group.extend(built);
            }
            self.graph.mesh_groups.push(group);
        }
        debug!(
            meshes = self.graph.meshes.len(),
            vertex_buffers = self.vertex_buffers.len(),
            pending = pending.len(),
            "built meshes"
        );
        Ok(pending)
    }

    /// Builds the mesh of one uncompressed primitive; `None` if it has no
    /// positions.
    pub fn build_mesh(
        &mut self,
        mesh_index: usize,
        mesh: &schema::Mesh,
        primitive_index: usize,
        primitive: &schema::Primitive,
    ) -> Result<Option<MeshId>> {
        let indices = match primitive.indices {
            Some(index) => Some(self.extract(index, true)?),
            None => None,
        };
        let index_values: Option<Vec<u32>> = indices.as_ref().map(|view| view.to_vec());

        let key = vertex_buffer_key(&primitive.attributes);
        let vertex_buffer = match self.vertex_buffers.get(&key) {
            Some(existing) => Some(Rc::clone(existing)),
            None => {
                let created = self
                    .vertex_buffer_for(primitive, index_values.as_deref())?
                    .map(Rc::new);
                if let Some(created) = &created {
                    self.vertex_buffers.insert(key, Rc::clone(created));
                }
                created
            }
        };
        let Some(vertex_buffer) = vertex_buffer else {
            self.warn(Warning::MissingPositions {
                mesh: mesh_index,
                primitive: primitive_index,
            });
            return Ok(None);
        };

        let id = MeshId(self.graph.meshes.len());
        let topology = self.topology(mesh_index, primitive_index, primitive);
        let mut result = Mesh::new(id, topology);
        result.aabb = self.position_bounds(primitive);

        match (indices, index_values) {
            (Some(view), Some(values)) => {
                let (format, narrowed) = index_format_for(view.kind(), &self.device.caps())?;
                if narrowed && vertex_buffer.num_vertices > usize::from(u16::MAX) {
                    self.warn(Warning::IndexDowngrade {
                        mesh: mesh_index,
                        vertices: vertex_buffer.num_vertices,
                    });
                }
                result.index_buffer = Some(IndexBuffer::with_indices(self.device, format, &values));
                result.primitives[0].count = values.len();
                result.primitives[0].indexed = true;
            }
            _ => result.primitives[0].count = vertex_buffer.num_vertices,
        }
        result.vertex_buffer = Some(vertex_buffer);

        if let Some(targets) = &primitive.targets {
            result.morph = Some(self.build_morph(mesh, targets)?);
        }
        result.material = primitive.material;
        self.record_variants(id, primitive)?;
        self.graph.meshes.push(result);
        Ok(Some(id))
    }

    fn vertex_buffer_for(
        &self,
        primitive: &schema::Primitive,
        indices: Option<&[u32]>,
    ) -> Result<Option<VertexBuffer>> {
        let mut sources = BTreeMap::new();
        for (name, &index) in &primitive.attributes {
            let Some(semantic) = Semantic::from_attribute(name) else {
                continue;
            };
            let source = VertexSource {
                view: self.extract(index, false)?,
                normalize: self.accessor(index)?.normalized,
            };
            sources.insert(semantic, source);
        }

        if !sources.contains_key(&Semantic::Normal) {
            let normals = sources
                .get(&Semantic::Position)
                .and_then(|position| generate_normals(position, indices));
            if let Some(normals) = normals {
                sources.insert(Semantic::Normal, normals);
            }
        }
        Ok(create_vertex_buffer(
            self.device,
            &sources,
            &self.buffers,
            self.flip_v,
        ))
    }

    /// First component type code among the primitive's accessors that has no
    /// [`ComponentKind`]. Missing accessors are left to extraction.
    fn unsupported_component(&self, primitive: &schema::Primitive) -> Option<u32> {
        let targets = primitive.targets.iter().flatten().flat_map(|t| t.values());
        primitive
            .attributes
            .values()
            .chain(primitive.indices.as_ref())
            .chain(targets)
            .filter_map(|&index| self.document.accessors.get(index))
            .flat_map(|accessor| {
                let sparse = accessor.sparse.as_ref().map(|s| s.indices.component_type);
                std::iter::once(accessor.component_type).chain(sparse)
            })
            .find(|&code| ComponentKind::from_code(code).is_err())
    }

    pub(crate) fn topology(
        &mut self,
        mesh_index: usize,
        primitive_index: usize,
        primitive: &schema::Primitive,
    ) -> Topology {
        let Some(mode) = primitive.mode else {
            return Topology::Triangles;
        };
        Topology::from_mode(mode).unwrap_or_else(|| {
            self.warn(Warning::UnknownTopology {
                mesh: mesh_index,
                primitive: primitive_index,
                mode,
            });
            Topology::Triangles
        })
    }

    pub(crate) fn position_bounds(&self, primitive: &schema::Primitive) -> Option<BoundingBox> {
        let &index = primitive.attributes.get("POSITION")?;
        self.document.accessors.get(index).and_then(bounding_box)
    }

    fn build_morph(
        &self,
        mesh: &schema::Mesh,
        targets: &[BTreeMap<String, usize>],
    ) -> Result<Morph> {
        let names = mesh.target_names();
        let targets = targets
            .iter()
            .enumerate()
            .map(|(index, target)| {
                let mut morph_target = MorphTarget {
                    name: names
                        .as_ref()
                        .and_then(|names| names.get(index))
                        .filter(|name| !name.is_empty())
                        .cloned()
                        .unwrap_or_else(|| index.to_string()),
                    default_weight: mesh
                        .weights
                        .as_ref()
                        .and_then(|weights| weights.get(index))
                        .copied()
                        .unwrap_or(0.0),
                    ..MorphTarget::default()
                };
                if let Some(&position) = target.get("POSITION") {
                    morph_target.delta_positions = Some(self.extract_f32(position)?);
                    morph_target.aabb = bounding_box(self.accessor(position)?);
                }
                if let Some(&normal) = target.get("NORMAL") {
                    morph_target.delta_normals = Some(self.extract_f32(normal)?);
                }
                Ok(morph_target)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Morph { targets })
    }

    /// Records `KHR_materials_variants` mappings and the default material.
    pub(crate) fn record_variants(
        &mut self,
        id: MeshId,
        primitive: &schema::Primitive,
    ) -> Result<()> {
        if let Some(value) = primitive.extensions.get(VARIANTS_EXTENSION) {
            let variants: PrimitiveVariants = serde_json::from_value(value.clone())?;
            let mut mapping = HashMap::new();
            for entry in variants.mappings {
                for variant in entry.variants {
                    mapping.insert(variant, entry.material);
                }
            }
            self.graph.mesh_variants.insert(id, mapping);
        }
        self.graph
            .mesh_default_materials
            .insert(id, primitive.material);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn f32_source(values: &[f32], components: usize) -> VertexSource<'static> {
        VertexSource {
            view: NumericView::from_f32(values, components),
            normalize: false,
        }
    }

    #[test]
    fn test_topology_codes() {
        assert_eq!(Topology::from_mode(0), Some(Topology::Points));
        assert_eq!(Topology::from_mode(6), Some(Topology::TriangleFan));
        assert_eq!(Topology::from_mode(7), None);
    }

    #[test]
    fn test_vertex_buffer_key_ignores_unmapped() {
        let attributes: BTreeMap<String, usize> = [
            ("TEXCOORD_0".to_string(), 2),
            ("POSITION".to_string(), 0),
            ("_BATCHID".to_string(), 9),
            ("NORMAL".to_string(), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            vertex_buffer_key(&attributes),
            "NORMAL:1,POSITION:0,TEXCOORD_0:2"
        );
    }

    #[test]
    fn test_calculate_normals_single_triangle() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let normals = calculate_normals(&positions, &[0, 1, 2]);
        assert_eq!(normals, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_generate_normals_requires_three_components() {
        let position = f32_source(&[0.0, 0.0, 1.0, 0.0], 2);
        assert!(generate_normals(&position, None).is_none());
    }

    #[test]
    fn test_vertex_buffer_canonical_order() {
        let device = MemoryDevice::default();
        let mut sources = BTreeMap::new();
        sources.insert(Semantic::TexCoord(0), f32_source(&[0.25, 0.75], 2));
        sources.insert(Semantic::Position, f32_source(&[1.0, 2.0, 3.0], 3));

        let buffer = create_vertex_buffer(&device, &sources, &[], false).unwrap();
        assert_eq!(buffer.num_vertices, 1);
        assert_eq!(buffer.format.size, 20);
        assert_eq!(buffer.format.elements[0].semantic, Semantic::Position);
        let floats: Vec<f32> = buffer
            .contents()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(floats, vec![1.0, 2.0, 3.0, 0.25, 0.75]);
    }

    #[test]
    fn test_vertex_buffer_without_position() {
        let device = MemoryDevice::default();
        let mut sources = BTreeMap::new();
        sources.insert(Semantic::Normal, f32_source(&[0.0, 1.0, 0.0], 3));
        assert!(create_vertex_buffer(&device, &sources, &[], false).is_none());
    }

    #[test]
    fn test_flip_v() {
        let device = MemoryDevice::default();
        let mut sources = BTreeMap::new();
        sources.insert(Semantic::Position, f32_source(&[0.0; 6], 3));
        sources.insert(Semantic::TexCoord(1), f32_source(&[0.5, 0.25, 0.0, 1.0], 2));
        sources.insert(Semantic::TexCoord(2), f32_source(&[0.5, 0.25, 0.0, 1.0], 2));

        let buffer = create_vertex_buffer(&device, &sources, &[], true).unwrap();
        let format = &buffer.format;
        let read = |vertex: usize, semantic: Semantic| {
            let element = format.element(semantic).unwrap();
            let at = vertex * format.size + element.offset + 4;
            LittleEndian::read_f32(&buffer.contents()[at..])
        };
        assert_eq!(read(0, Semantic::TexCoord(1)), 0.75);
        assert_eq!(read(1, Semantic::TexCoord(1)), 0.0);
        assert_eq!(read(0, Semantic::TexCoord(2)), 0.25);
    }

    #[test]
    fn test_widening_for_aligned_devices() {
        let device = MemoryDevice::new(DeviceCaps {
            aligned_vertex_elements: true,
            ..DeviceCaps::default()
        });
        let mut sources = BTreeMap::new();
        sources.insert(Semantic::Position, f32_source(&[0.0; 3], 3));
        sources.insert(
            Semantic::Color,
            VertexSource {
                view: NumericView::packed(ComponentKind::U8, 3, 1, vec![10u8, 20, 30]).unwrap(),
                normalize: true,
            },
        );
        let buffer = create_vertex_buffer(&device, &sources, &[], false).unwrap();
        let color = buffer.format.element(Semantic::Color).unwrap();
        assert_eq!(color.components, 4);
        assert_eq!(&buffer.contents()[12..16], &[10, 20, 30, 0]);
    }

    #[test]
    fn test_index_format_selection() {
        let full = DeviceCaps::default();
        let limited = DeviceCaps {
            u32_indices: false,
            u8_indices: false,
            aligned_vertex_elements: false,
        };
        assert_eq!(
            index_format_for(ComponentKind::U8, &full).unwrap(),
            (IndexFormat::U8, false)
        );
        assert_eq!(
            index_format_for(ComponentKind::U8, &limited).unwrap(),
            (IndexFormat::U16, false)
        );
        assert_eq!(
            index_format_for(ComponentKind::U32, &limited).unwrap(),
            (IndexFormat::U16, true)
        );
        assert!(index_format_for(ComponentKind::F32, &full).is_err());
    }
}
