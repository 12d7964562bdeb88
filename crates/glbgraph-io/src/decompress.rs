//! Geometry decompression collaborator.

use futures::future::LocalBoxFuture;
use glbgraph_core::Result;
use glbgraph_scene::{CompressedPrimitive, DecompressedGeometry};

/// Decodes `KHR_draco_mesh_compression` payloads.
///
/// Implementations return interleaved vertex bytes laid out in the order of
/// [`DecompressedGeometry::attributes`], and 16-bit indices when the
/// primitive has at most 65535 vertices, 32-bit otherwise.
pub trait GeometryDecompressor {
    fn decompress<'a>(
        &'a self,
        primitive: &'a CompressedPrimitive,
    ) -> LocalBoxFuture<'a, Result<DecompressedGeometry>>;
}
