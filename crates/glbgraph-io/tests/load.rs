use std::cell::Cell;
use std::collections::HashMap;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use glbgraph_core::{assemble, GraphError, Result, SourceHint};
use glbgraph_io::{BufferResolver, GeometryDecompressor, GraphLoader, ImageResolver, ImageSource, LoadOptions};
use glbgraph_scene::material::MapSlot;
use glbgraph_scene::texture::Address;
use glbgraph_scene::{CompressedPrimitive, DecodedImage, DecompressedGeometry, MemoryDevice, Warning};
use serde_json::json;

#[derive(Default)]
struct MapResolver {
    files: HashMap<String, Vec<u8>>,
    loads: Cell<usize>,
}

impl BufferResolver for MapResolver {
    fn load_buffer<'a>(&'a self, _index: usize, uri: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>>> {
        self.loads.set(self.loads.get() + 1);
        let found = self
            .files
            .get(uri)
            .cloned()
            .ok_or_else(|| GraphError::external(format!("no such file {}", uri)));
        futures::future::ready(found).boxed_local()
    }
}

impl ImageResolver for MapResolver {
    fn load_image<'a>(
        &'a self,
        _index: usize,
        source: ImageSource,
    ) -> LocalBoxFuture<'a, Result<DecodedImage>> {
        self.loads.set(self.loads.get() + 1);
        async move {
            match source {
                ImageSource::Uri(uri) if self.files.contains_key(&uri) => {
                    Ok(DecodedImage::new(1, 1, vec![255; 4]))
                }
                other => Err(GraphError::external(format!("cannot load {:?}", other))),
            }
        }
        .boxed_local()
    }

    fn postprocess_image(&self, _index: usize, image: &mut DecodedImage) {
        image.pixels[0] = 7;
    }
}

struct Triangle;

impl GeometryDecompressor for Triangle {
    fn decompress<'a>(
        &'a self,
        _primitive: &'a CompressedPrimitive,
    ) -> LocalBoxFuture<'a, Result<DecompressedGeometry>> {
        // Position followed by the synthesized normal.
        let mut vertices = Vec::new();
        for corner in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for value in corner.iter().chain(&[0.0, 0.0, 1.0]) {
                vertices.extend_from_slice(&value.to_le_bytes());
            }
        }
        let indices = [0u16, 1, 2].iter().flat_map(|i| i.to_le_bytes()).collect();
        futures::future::ready(Ok(DecompressedGeometry {
            vertices,
            indices,
            attributes: vec![0],
        }))
        .boxed_local()
    }
}

fn triangle_bytes() -> Vec<u8> {
    [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn triangle_document(buffer: serde_json::Value) -> serde_json::Value {
    json!({
        "asset": {"version": "2.0"},
        "buffers": [buffer],
        "bufferViews": [{"buffer": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "nodes": [{"mesh": 0}],
        "scenes": [{"nodes": [0]}]
    })
}

#[test]
fn test_json_only_container_with_external_buffer() {
    let json = serde_json::to_vec(&triangle_document(
        json!({"byteLength": 36, "uri": "triangle.bin"}),
    ))
    .unwrap();
    let glb = assemble(&json, None);

    let mut resolver = MapResolver::default();
    resolver.files.insert("triangle.bin".into(), triangle_bytes());
    let device = MemoryDevice::default();
    let graph = pollster::block_on(
        GraphLoader::new(&device, &resolver)
            .with_options(LoadOptions::default().with_hint(SourceHint::Binary))
            .load(&glb),
    )
    .unwrap();

    assert_eq!(resolver.loads.get(), 1);
    assert_eq!(graph.meshes.len(), 1);
    assert_eq!(graph.meshes[0].vertex_buffer.as_ref().unwrap().num_vertices, 3);
    assert_eq!(graph.renders[0].meshes.len(), 1);
}

#[test]
fn test_binary_chunk_and_data_uri_buffers() {
    let glb = assemble(
        &serde_json::to_vec(&triangle_document(json!({"byteLength": 36}))).unwrap(),
        Some(&triangle_bytes()),
    );
    let resolver = MapResolver::default();
    let device = MemoryDevice::default();
    let graph = pollster::block_on(GraphLoader::new(&device, &resolver).load(&glb)).unwrap();
    assert_eq!(graph.meshes.len(), 1);

    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(triangle_bytes());
    let json = serde_json::to_vec(&triangle_document(json!({
        "byteLength": 36,
        "uri": format!("data:application/octet-stream;base64,{}", encoded)
    })))
    .unwrap();
    let graph = pollster::block_on(GraphLoader::new(&device, &resolver).load(&json)).unwrap();
    assert_eq!(graph.meshes.len(), 1);
    assert_eq!(resolver.loads.get(), 0);
}

#[test]
fn test_out_of_bounds_accessor_fails_the_load() {
    let mut document = triangle_document(json!({"byteLength": 100, "uri": "short.bin"}));
    document["bufferViews"][0]["byteLength"] = json!(100);
    document["accessors"][0]["count"] = json!(10);
    let json = serde_json::to_vec(&document).unwrap();

    let mut resolver = MapResolver::default();
    resolver.files.insert("short.bin".into(), vec![0; 100]);
    let device = MemoryDevice::default();
    let err = pollster::block_on(GraphLoader::new(&device, &resolver).load(&json)).unwrap_err();
    assert!(err.is_format());
}

#[test]
fn test_missing_buffer_is_external_failure() {
    let json = serde_json::to_vec(&triangle_document(
        json!({"byteLength": 36, "uri": "gone.bin"}),
    ))
    .unwrap();
    let resolver = MapResolver::default();
    let device = MemoryDevice::default();
    let err = pollster::block_on(GraphLoader::new(&device, &resolver).load(&json)).unwrap_err();
    assert!(matches!(err, GraphError::ExternalResource(_)));
}

#[test]
fn test_shared_image_yields_independent_textures() {
    let json = serde_json::to_vec(&json!({
        "asset": {"version": "2.0"},
        "images": [{"uri": "wood.png"}],
        "samplers": [{"wrapS": 33071}, {"wrapS": 33648}],
        "textures": [{"source": 0, "sampler": 0}, {"source": 0, "sampler": 1}],
        "materials": [
            {"pbrMetallicRoughness": {"baseColorTexture": {"index": 0}}},
            {"pbrMetallicRoughness": {"baseColorTexture": {"index": 1}}}
        ]
    }))
    .unwrap();

    let mut resolver = MapResolver::default();
    resolver.files.insert("wood.png".into(), Vec::new());
    let device = MemoryDevice::default();
    let graph = pollster::block_on(
        GraphLoader::new(&device, &resolver)
            .with_images(&resolver)
            .load(&json),
    )
    .unwrap();

    assert_eq!(resolver.loads.get(), 1);
    let first = graph.textures[0].as_ref().unwrap();
    let second = graph.textures[1].as_ref().unwrap();
    assert!(first.shares_image(second));
    assert_eq!(first.image.pixels[0], 7);
    assert_eq!(first.address_u, Address::ClampToEdge);
    assert_eq!(second.address_u, Address::MirroredRepeat);
    assert_eq!(graph.materials[0].map(MapSlot::Diffuse).unwrap().texture, 0);
    assert_eq!(graph.materials[1].map(MapSlot::Diffuse).unwrap().texture, 1);
}

#[test]
fn test_textures_without_image_resolver_are_missing() {
    let json = serde_json::to_vec(&json!({
        "asset": {"version": "2.0"},
        "images": [{"uri": "wood.png"}],
        "textures": [{"source": 0}],
        "materials": [{"pbrMetallicRoughness": {"baseColorTexture": {"index": 0}}}]
    }))
    .unwrap();
    let resolver = MapResolver::default();
    let device = MemoryDevice::default();
    let graph = pollster::block_on(GraphLoader::new(&device, &resolver).load(&json)).unwrap();
    assert!(graph.textures[0].is_none());
    assert!(graph.warnings.contains(&Warning::MissingImage { texture: 0 }));
    assert!(graph.materials[0].map(MapSlot::Diffuse).is_none());
}

#[test]
fn test_compressed_primitive() {
    let mut document = triangle_document(json!({"byteLength": 36, "uri": "draco.bin"}));
    document["extensionsRequired"] = json!(["KHR_draco_mesh_compression"]);
    document["meshes"][0]["primitives"][0]["extensions"] = json!({
        "KHR_draco_mesh_compression": {"bufferView": 0, "attributes": {"POSITION": 0}}
    });
    let json = serde_json::to_vec(&document).unwrap();

    let mut resolver = MapResolver::default();
    resolver.files.insert("draco.bin".into(), vec![0; 36]);
    let device = MemoryDevice::default();

    let err = pollster::block_on(GraphLoader::new(&device, &resolver).load(&json)).unwrap_err();
    assert!(matches!(err, GraphError::Unsupported(_)));

    let graph = pollster::block_on(
        GraphLoader::new(&device, &resolver)
            .with_decompressor(&Triangle)
            .load(&json),
    )
    .unwrap();
    let mesh = &graph.meshes[0];
    let vertex_buffer = mesh.vertex_buffer.as_ref().unwrap();
    assert_eq!(vertex_buffer.num_vertices, 3);
    assert_eq!(vertex_buffer.format.size, 24);
    assert_eq!(mesh.index_buffer.as_ref().unwrap().indices(), vec![0, 1, 2]);
    assert_eq!(mesh.primitives[0].count, 3);
}
