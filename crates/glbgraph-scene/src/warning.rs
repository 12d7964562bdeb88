//! Non-fatal conditions reported while building a graph.

use thiserror::Error;

/// A recoverable problem; the build continues with a fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    #[error("Mesh {mesh} primitive {primitive} has no POSITION attribute and was skipped")]
    MissingPositions { mesh: usize, primitive: usize },

    #[error("Mesh {mesh} primitive {primitive} uses unsupported component type {component_type} and was skipped")]
    UnsupportedComponent {
        mesh: usize,
        primitive: usize,
        component_type: u32,
    },

    #[error("Mesh {mesh} primitive {primitive} uses unknown topology {mode}, drawing as triangles")]
    UnknownTopology {
        mesh: usize,
        primitive: usize,
        mode: u32,
    },

    #[error("Device has no 32-bit index support, mesh {mesh} with {vertices} vertices uses 16-bit indices and may render incorrectly")]
    IndexDowngrade { mesh: usize, vertices: usize },

    #[error("Asset generated by '{generator}' may have flipped UVs, V coordinates were flipped")]
    FlippedUv { generator: String },

    #[error("Texture {texture} has no usable image source")]
    MissingImage { texture: usize },

    #[error("Animation {animation} channel {channel} targets morph weights of a node without outputs")]
    MissingMorphOutput { animation: usize, channel: usize },

    #[error("Extension '{name}' is not supported and was ignored")]
    UnsupportedExtension { name: String },
}
