//! Meshes whose geometry arrives through `KHR_draco_mesh_compression`.
//!
//! The mesh is registered as soon as the primitive is seen, so its id can
//! join the variant tables. Its buffers are filled once the decompressor
//! has produced interleaved vertices and indices.

use std::collections::BTreeMap;
use std::rc::Rc;

use glbgraph_core::schema;
use glbgraph_core::{ComponentKind, GraphError, Result};
use serde::Deserialize;

use crate::builder::GraphBuilder;
use crate::device::{IndexBuffer, IndexFormat, Semantic, VertexBuffer, VertexElementDesc, VertexFormat};
use crate::mesh::{DrawPrimitive, Mesh, MeshId, Topology};
use crate::warning::Warning;

pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DracoExtension {
    buffer_view: usize,
    #[serde(default)]
    attributes: BTreeMap<String, u32>,
}

/// Output of a geometry decompressor.
#[derive(Debug, Clone, Default)]
pub struct DecompressedGeometry {
    /// Interleaved vertex data.
    pub vertices: Vec<u8>,
    /// 16-bit indices when there are at most 65535 vertices, else 32-bit.
    pub indices: Vec<u8>,
    /// Decoder attribute ids in the order they appear in `vertices`.
    pub attributes: Vec<u32>,
}

/// A compressed primitive waiting for its geometry.
#[derive(Debug, Clone)]
pub struct CompressedPrimitive {
    pub mesh: MeshId,
    /// Compressed payload.
    pub data: Vec<u8>,
    /// Attribute name to decoder attribute id.
    pub attributes: BTreeMap<String, u32>,
    source_mesh: usize,
    topology: Topology,
    elements: Vec<(String, VertexElementDesc)>,
    has_normals: bool,
}

impl CompressedPrimitive {
    /// Vertex layout of the decompressed data.
    ///
    /// Elements follow the decoder's attribute order. A float32 normal is
    /// placed after the first element when the primitive declares none.
    pub fn vertex_format(&self, decoded_order: &[u32]) -> VertexFormat {
        let position_of = |name: &str| {
            self.attributes
                .get(name)
                .and_then(|id| decoded_order.iter().position(|a| a == id))
                .unwrap_or(usize::MAX)
        };
        let mut elements = self.elements.clone();
        elements.sort_by_key(|(name, _)| position_of(name));
        let mut descs: Vec<VertexElementDesc> = elements.into_iter().map(|(_, d)| d).collect();
        if !self.has_normals {
            let normal = VertexElementDesc {
                semantic: Semantic::Normal,
                components: 3,
                kind: ComponentKind::F32,
                normalize: false,
            };
            descs.insert(descs.len().min(1), normal);
        }
        VertexFormat::interleaved(&descs)
    }
}

impl<'a> GraphBuilder<'a> {
    /// Registers the mesh of a compressed primitive and returns the pending
    /// decompression work.
    pub fn build_compressed_mesh(
        &mut self,
        mesh_index: usize,
        primitive_index: usize,
        primitive: &schema::Primitive,
    ) -> Result<(MeshId, CompressedPrimitive)> {
        let extension: DracoExtension = match primitive.extensions.get(DRACO_EXTENSION) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => {
                return Err(GraphError::format(format!(
                    "Mesh {} primitive {} has no {}",
                    mesh_index, primitive_index, DRACO_EXTENSION
                )))
            }
        };

        let mut elements = Vec::with_capacity(primitive.attributes.len());
        for (name, &index) in &primitive.attributes {
            let Some(semantic) = Semantic::from_attribute(name) else {
                continue;
            };
            let accessor = self.accessor(index)?;
            let kind = ComponentKind::from_code(accessor.component_type)?;
            let normalize = accessor.normalized
                || (semantic == Semantic::Color
                    && matches!(kind, ComponentKind::U8 | ComponentKind::U16));
            elements.push((
                name.clone(),
                VertexElementDesc {
                    semantic,
                    components: accessor.element_type.components(),
                    kind,
                    normalize,
                },
            ));
        }

        let id = MeshId(self.graph.meshes.len());
        let topology = self.topology(mesh_index, primitive_index, primitive);
        let mut mesh = Mesh::new(id, topology);
        mesh.aabb = self.position_bounds(primitive);
        mesh.material = primitive.material;
        self.record_variants(id, primitive)?;
        self.graph.meshes.push(mesh);

        let data = self.view(extension.buffer_view)?.bytes.to_vec();
        let pending = CompressedPrimitive {
            mesh: id,
            data,
            attributes: extension.attributes,
            source_mesh: mesh_index,
            topology,
            elements,
            has_normals: primitive.attributes.contains_key("NORMAL"),
        };
        Ok((id, pending))
    }

    /// Fills a compressed mesh with decompressed geometry.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ExternalResource` if the geometry does not match
    /// the declared layout.
    pub fn complete_compressed(
        &mut self,
        primitive: &CompressedPrimitive,
        geometry: &DecompressedGeometry,
    ) -> Result<()> {
        let format = primitive.vertex_format(&geometry.attributes);
        if format.size == 0 {
            return Err(GraphError::external(format!(
                "Compressed mesh {} has no vertex attributes",
                primitive.mesh.0
            )));
        }
        let num_vertices = geometry.vertices.len() / format.size;
        let index_format = if num_vertices <= 65535 {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        };
        let num_indices = geometry.indices.len() / index_format.size();

        let mut vertex_buffer = VertexBuffer::new(self.device, format, num_vertices);
        let size = vertex_buffer.format.size * num_vertices;
        vertex_buffer
            .lock()
            .copy_from_slice(&geometry.vertices[..size]);
        vertex_buffer.unlock();

        let index_bytes = &geometry.indices[..num_indices * index_format.size()];
        let index_buffer = if index_format == IndexFormat::U32 && !self.device.caps().u32_indices {
            self.warn(Warning::IndexDowngrade {
                mesh: primitive.source_mesh,
                vertices: num_vertices,
            });
            let indices: Vec<u32> = index_bytes
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            IndexBuffer::with_indices(self.device, IndexFormat::U16, &indices)
        } else {
            let mut index_buffer = IndexBuffer::new(self.device, index_format, num_indices);
            index_buffer.lock().copy_from_slice(index_bytes);
            index_buffer.unlock();
            index_buffer
        };

        let mesh = self
            .graph
            .meshes
            .get_mut(primitive.mesh.0)
            .ok_or_else(|| GraphError::format(format!("Missing mesh {}", primitive.mesh.0)))?;
        mesh.vertex_buffer = Some(Rc::new(vertex_buffer));
        mesh.index_buffer = Some(index_buffer);
        mesh.primitives = vec![DrawPrimitive {
            topology: primitive.topology,
            base: 0,
            count: num_indices,
            indexed: true,
        }];
        Ok(())
    }
}
