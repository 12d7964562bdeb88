//! Resource graph construction for glTF 2.0 documents.
//!
//! [`GraphBuilder`] turns a decoded [`glbgraph_core::Document`] plus its
//! loaded buffers into a [`ResourceGraph`]: a node hierarchy, device vertex
//! and index buffers, skins, animation tracks, textures and materials.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`builder`] | per-build state and stage ordering |
//! | [`device`] | vertex layouts and the graphics device abstraction |
//! | [`node`] | node arena, scene roots |
//! | [`mesh`] | vertex and index buffers, morph targets, variants |
//! | [`compressed`] | meshes waiting on a geometry decompressor |
//! | [`skin`] | inverse bind matrices and bone names |
//! | [`animation`] | tracks, morph weight split, quaternion continuity |
//! | [`texture`] | decoded images and sampler state |
//! | [`material`] | material translation and texture transforms |
//! | [`extensions`] | `KHR_materials_*` dispatch |
//! | [`components`] | cameras and punctual lights |
//! | [`instancing`] | `EXT_mesh_gpu_instancing` |
//!
//! Documents without textures or compressed meshes build in one call:
//!
//! ```ignore
//! let device = MemoryDevice::default();
//! let graph = GraphBuilder::new(&document, &buffers, &device, BuildOptions::default())?
//!     .build()?;
//! ```

pub mod animation;
pub mod builder;
pub mod components;
pub mod compressed;
pub mod device;
pub mod extensions;
pub mod graph;
pub mod instancing;
pub mod material;
pub mod mesh;
pub mod node;
pub mod skin;
pub mod texture;
pub mod warning;

pub use animation::{AnimBinding, AnimCurve, AnimData, AnimTrack, Interpolation};
pub use builder::{BuildOptions, FlipV, GraphBuilder};
pub use components::{Camera, Light, LightType, Projection};
pub use compressed::{CompressedPrimitive, DecompressedGeometry};
pub use device::{DeviceCaps, GraphicsDevice, IndexFormat, MemoryDevice, Semantic, VertexFormat};
pub use extensions::MaterialExtension;
pub use graph::{Render, ResourceGraph};
pub use material::{BlendMode, CullMode, MapSlot, Material, TextureMap};
pub use mesh::{Mesh, MeshId, Topology};
pub use node::{Node, NodeId, NodeTree};
pub use skin::Skin;
pub use texture::{create_textures, Address, DecodedImage, Filter, Texture};
pub use warning::Warning;
