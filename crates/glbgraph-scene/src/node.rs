//! Node hierarchy.
//!
//! Nodes live in an arena ([`NodeTree`]) and refer to each other by
//! [`NodeId`]. Sibling names are made unique when children are attached.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use glbgraph_core::schema;
use glbgraph_core::{GraphError, Result};

/// Index of a node in its [`NodeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub local_position: Vec3,
    pub local_rotation: Quat,
    pub local_scale: Vec3,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Schema mesh instantiated at this node.
    pub mesh: Option<usize>,
    /// Schema skin bound to the node's mesh.
    pub skin: Option<usize>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            local_scale: Vec3::ONE,
            parent: None,
            children: Vec::new(),
            mesh: None,
            skin: None,
        }
    }

    /// Creates a node from its schema description.
    ///
    /// A `matrix` is decomposed into translation, rotation and scale; explicit
    /// TRS fields then override the decomposed parts.
    pub fn from_schema(node: &schema::Node, index: usize) -> Self {
        let name = match node.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("node_{}", index),
        };
        let mut result = Node::new(name);

        if let Some(matrix) = &node.matrix {
            let (scale, rotation, translation) =
                Mat4::from_cols_array(matrix).to_scale_rotation_translation();
            result.local_position = translation;
            result.local_rotation = rotation;
            result.local_scale = scale;
        }
        if let Some(r) = node.rotation {
            result.local_rotation = Quat::from_xyzw(r[0], r[1], r[2], r[3]);
        }
        if let Some(t) = node.translation {
            result.local_position = Vec3::from_array(t);
        }
        if let Some(s) = node.scale {
            result.local_scale = Vec3::from_array(s);
        }
        result.mesh = node.mesh;
        result.skin = node.skin;
        result
    }
}

/// Arena of nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    nodes: Vec<Node>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| GraphError::format(format!("Invalid node index: {}", id.0)))
    }

    /// Returns true if `ancestor` is `node` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Attaches `child` under `parent`, detaching it from any previous parent.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Format` for unknown ids or if `child` is an
    /// ancestor of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        if self.is_ancestor(child, parent) {
            return Err(GraphError::format(format!(
                "Cycle detected: node {} is an ancestor of node {}",
                child.0, parent.0
            )));
        }
        if let Some(previous) = self.nodes[child.0].parent.take() {
            self.nodes[previous.0].children.retain(|&c| c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Names from the root down to `id`, inclusive.
    pub fn path(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            path.push(node.name.clone());
            current = node.parent.and_then(|p| self.get(p));
        }
        path.reverse();
        path
    }

    /// Nodes without a parent.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
    }
}

/// Builds one node per schema node and links the hierarchy.
///
/// A child that already has a parent is left where it is. A child whose name
/// repeats an earlier sibling's gets a counter suffix: `a`, `a1`, `a2`.
///
/// # Errors
///
/// Returns `GraphError::Format` for out-of-range child indices and cycles.
pub fn build_nodes(nodes: &[schema::Node]) -> Result<NodeTree> {
    let mut tree = NodeTree::new();
    for (index, node) in nodes.iter().enumerate() {
        tree.push(Node::from_schema(node, index));
    }

    for (index, node) in nodes.iter().enumerate() {
        let parent = NodeId(index);
        let mut unique_names: HashMap<String, usize> = HashMap::new();
        for &child_index in &node.children {
            let child = NodeId(child_index);
            if tree.node(child)?.parent.is_some() {
                continue;
            }
            let name = tree.nodes[child_index].name.clone();
            match unique_names.get_mut(&name) {
                Some(counter) => {
                    tree.nodes[child_index].name = format!("{}{}", name, counter);
                    *counter += 1;
                }
                None => {
                    unique_names.insert(name, 1);
                }
            }
            tree.add_child(parent, child)?;
        }
    }
    Ok(tree)
}

/// Creates scene roots.
///
/// A single scene holding a single node uses that node as its root. Otherwise
/// every scene gets a synthetic root, named after the scene or `scene_<index>`,
/// that adopts the scene's nodes.
///
/// # Errors
///
/// Returns `GraphError::Format` if a scene references a missing node.
pub fn build_scenes(tree: &mut NodeTree, scenes: &[schema::Scene]) -> Result<Vec<NodeId>> {
    if let [scene] = scenes {
        if let [node] = scene.nodes[..] {
            let root = NodeId(node);
            tree.node(root)?;
            return Ok(vec![root]);
        }
    }

    let mut roots = Vec::with_capacity(scenes.len());
    for (index, scene) in scenes.iter().enumerate() {
        let name = match scene.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("scene_{}", index),
        };
        let root = tree.push(Node::new(name));
        for &node in &scene.nodes {
            tree.add_child(root, NodeId(node))?;
        }
        roots.push(root);
    }
    Ok(roots)
}
