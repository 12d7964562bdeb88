//! Skins: joint names and inverse bind matrices.

use std::rc::Rc;

use glam::Mat4;
use glbgraph_core::schema;
use glbgraph_core::{GraphError, Result};
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    /// One inverse bind matrix per bone.
    pub inverse_bind_matrices: Vec<Mat4>,
    pub bone_names: Vec<String>,
}

impl Skin {
    /// Identity used to share skins with the same bone sequence.
    pub fn key(bone_names: &[String]) -> String {
        bone_names.join("#")
    }
}

impl<'a> GraphBuilder<'a> {
    /// Builds every schema skin; run after the node hierarchy exists.
    pub fn build_skins(&mut self) -> Result<()> {
        let document = self.document;
        let skins = document
            .skins
            .iter()
            .map(|skin| self.build_skin(skin))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            skins = skins.len(),
            unique = self.skin_cache.len(),
            "built skins"
        );
        self.graph.skins = skins;
        Ok(())
    }

    /// Builds one skin, returning the shared instance when an identical bone
    /// sequence was built before.
    pub fn build_skin(&mut self, skin: &schema::Skin) -> Result<Rc<Skin>> {
        let joints = skin.joints.len();
        let inverse_bind_matrices = match skin.inverse_bind_matrices {
            Some(index) => {
                let values: Vec<f32> = self.extract(index, true)?.to_vec();
                if values.len() < joints * 16 {
                    return Err(GraphError::format(format!(
                        "Inverse bind matrices hold {} values, {} joints need {}",
                        values.len(),
                        joints,
                        joints * 16
                    )));
                }
                values
                    .chunks_exact(16)
                    .take(joints)
                    .map(Mat4::from_cols_slice)
                    .collect()
            }
            None => vec![Mat4::IDENTITY; joints],
        };

        let bone_names = skin
            .joints
            .iter()
            .map(|&joint| {
                self.graph
                    .nodes
                    .get(NodeId(joint))
                    .map(|node| node.name.clone())
                    .ok_or_else(|| GraphError::format(format!("Invalid joint node {}", joint)))
            })
            .collect::<Result<Vec<_>>>()?;

        let key = Skin::key(&bone_names);
        if let Some(existing) = self.skin_cache.get(&key) {
            return Ok(Rc::clone(existing));
        }
        let built = Rc::new(Skin {
            inverse_bind_matrices,
            bone_names,
        });
        self.skin_cache.insert(key, Rc::clone(&built));
        Ok(built)
    }
}
