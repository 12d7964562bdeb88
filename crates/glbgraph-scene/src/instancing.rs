//! `EXT_mesh_gpu_instancing`: per-instance transforms of a node's mesh.

use std::collections::BTreeMap;

use glam::{Mat4, Quat, Vec3};
use glbgraph_core::{GraphError, Result};
use serde::Deserialize;
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::node::NodeId;

pub const INSTANCING_EXTENSION: &str = "EXT_mesh_gpu_instancing";

#[derive(Debug, Deserialize)]
struct InstancingExtension {
    #[serde(default)]
    attributes: BTreeMap<String, usize>,
}

/// Composes instance matrices from flat TRS arrays.
///
/// Missing arrays default to identity components. The instance count is
/// taken from the first array present.
pub fn instance_matrices(
    translations: Option<&[f32]>,
    rotations: Option<&[f32]>,
    scales: Option<&[f32]>,
) -> Vec<Mat4> {
    let count = translations
        .map(|t| t.len() / 3)
        .or_else(|| rotations.map(|r| r.len() / 4))
        .or_else(|| scales.map(|s| s.len() / 3))
        .unwrap_or(0);
    (0..count)
        .map(|i| {
            let translation = translations
                .and_then(|t| t.get(i * 3..i * 3 + 3))
                .map_or(Vec3::ZERO, Vec3::from_slice);
            let rotation = rotations
                .and_then(|r| r.get(i * 4..i * 4 + 4))
                .map_or(Quat::IDENTITY, Quat::from_slice);
            let scale = scales
                .and_then(|s| s.get(i * 3..i * 3 + 3))
                .map_or(Vec3::ONE, Vec3::from_slice);
            Mat4::from_scale_rotation_translation(scale, rotation, translation)
        })
        .collect()
}

impl<'a> GraphBuilder<'a> {
    /// Collects instance matrices for every mesh node that declares them.
    pub fn build_instancing(&mut self) -> Result<()> {
        let document = self.document;
        for (index, node) in document.nodes.iter().enumerate() {
            let Some(value) = node.extensions.get(INSTANCING_EXTENSION) else {
                continue;
            };
            if node.mesh.is_none() {
                continue;
            }
            let extension: InstancingExtension = serde_json::from_value(value.clone())?;
            let read = |name: &str| -> Result<Option<Vec<f32>>> {
                extension
                    .attributes
                    .get(name)
                    .map(|&accessor| self.extract_f32(accessor))
                    .transpose()
            };
            let translations = read("TRANSLATION")?;
            let rotations = read("ROTATION")?;
            let scales = read("SCALE")?;
            if translations.is_none() && rotations.is_none() && scales.is_none() {
                return Err(GraphError::format(format!(
                    "Node {} declares instancing without attributes",
                    index
                )));
            }

            let matrices = instance_matrices(
                translations.as_deref(),
                rotations.as_deref(),
                scales.as_deref(),
            );
            debug!(node = index, instances = matrices.len(), "built instancing");
            self.graph.instancing.insert(NodeId(index), matrices);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_matrices() {
        let translations = [1.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        let scales = [2.0, 2.0, 2.0, 1.0, 1.0, 1.0];
        let matrices = instance_matrices(Some(&translations), None, Some(&scales));
        assert_eq!(matrices.len(), 2);
        assert_eq!(matrices[0].transform_point3(Vec3::ONE), Vec3::new(3.0, 2.0, 2.0));
        assert_eq!(matrices[1].transform_point3(Vec3::ZERO), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_rotation_only() {
        let rotations = [0.0, 0.0, 0.0, 1.0];
        let matrices = instance_matrices(None, Some(&rotations), None);
        assert_eq!(matrices, vec![Mat4::IDENTITY]);
        assert!(instance_matrices(None, None, None).is_empty());
    }
}
