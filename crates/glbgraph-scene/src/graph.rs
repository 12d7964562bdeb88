//! The finished resource graph.

use std::collections::HashMap;
use std::rc::Rc;

use glam::Mat4;

use crate::animation::AnimTrack;
use crate::components::{Camera, Light};
use crate::material::Material;
use crate::mesh::{Mesh, MeshId};
use crate::node::{NodeId, NodeTree};
use crate::skin::Skin;
use crate::texture::Texture;
use crate::warning::Warning;

/// Meshes built from one schema mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Render {
    pub name: Option<String>,
    pub meshes: Vec<MeshId>,
}

/// Every resource built from one document.
///
/// Collections indexed like the schema (`materials`, `textures`, `skins`,
/// `animations`, `mesh_groups`, `renders`) keep that indexing; `meshes` is
/// an arena addressed by [`MeshId`].
#[derive(Debug, Default)]
pub struct ResourceGraph {
    pub nodes: NodeTree,
    /// Root node of each scene.
    pub scenes: Vec<NodeId>,
    pub default_scene: usize,
    pub meshes: Vec<Mesh>,
    pub mesh_groups: Vec<Vec<MeshId>>,
    pub renders: Vec<Render>,
    pub materials: Vec<Material>,
    pub textures: Vec<Option<Texture>>,
    pub animations: Vec<AnimTrack>,
    pub skins: Vec<Rc<Skin>>,
    pub cameras: HashMap<NodeId, Camera>,
    pub lights: HashMap<NodeId, Light>,
    pub instancing: HashMap<NodeId, Vec<Mat4>>,
    /// `KHR_materials_variants` names.
    pub variants: Vec<String>,
    /// Variant index to material index, per mesh.
    pub mesh_variants: HashMap<MeshId, HashMap<usize, usize>>,
    pub mesh_default_materials: HashMap<MeshId, Option<usize>>,
    pub warnings: Vec<Warning>,
}

impl ResourceGraph {
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn scene_root(&self) -> Option<NodeId> {
        self.scenes.get(self.default_scene).copied()
    }

    /// Material of `mesh` under the named variant, falling back to the
    /// primitive's own material.
    pub fn material_for_variant(&self, mesh: MeshId, variant: &str) -> Option<usize> {
        let mapped = self
            .variants
            .iter()
            .position(|name| name == variant)
            .and_then(|index| self.mesh_variants.get(&mesh)?.get(&index).copied());
        mapped.or_else(|| self.mesh_default_materials.get(&mesh).copied().flatten())
    }

    /// Releases the renders and every mesh they reference.
    ///
    /// Vertex buffers shared between meshes are freed with their last mesh.
    pub fn destroy(&mut self) {
        self.renders.clear();
        self.mesh_groups.clear();
        self.meshes.clear();
        self.mesh_variants.clear();
        self.mesh_default_materials.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Topology;

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph {
            variants: vec!["day".to_string(), "night".to_string()],
            ..ResourceGraph::default()
        };
        graph.meshes.push(Mesh::new(MeshId(0), Topology::Triangles));
        graph.mesh_groups.push(vec![MeshId(0)]);
        graph.renders.push(Render {
            name: None,
            meshes: vec![MeshId(0)],
        });
        graph
            .mesh_variants
            .insert(MeshId(0), HashMap::from([(1, 7)]));
        graph.mesh_default_materials.insert(MeshId(0), Some(2));
        graph
    }

    #[test]
    fn test_material_for_variant() {
        let graph = graph();
        assert_eq!(graph.material_for_variant(MeshId(0), "night"), Some(7));
        assert_eq!(graph.material_for_variant(MeshId(0), "day"), Some(2));
        assert_eq!(graph.material_for_variant(MeshId(0), "dusk"), Some(2));
        assert_eq!(graph.material_for_variant(MeshId(5), "night"), None);
    }

    #[test]
    fn test_destroy() {
        let mut graph = graph();
        graph.destroy();
        assert!(graph.renders.is_empty());
        assert!(graph.meshes.is_empty());
        assert!(graph.material_for_variant(MeshId(0), "night").is_none());
    }
}
