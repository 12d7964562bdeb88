//! glb-inspect - load a glTF/GLB asset and print what it contains.
//!
//! ```bash
//! glb-inspect model.glb
//! RUST_LOG=debug glb-inspect scene.gltf --no-flip-v
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use glbgraph_core::{GraphError, SourceHint};
use glbgraph_io::{FsResolver, GraphLoader, LoadOptions};
use glbgraph_scene::{DeviceCaps, FlipV, MemoryDevice, ResourceGraph};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "glb-inspect", version, about = "Summarize a glTF or GLB asset")]
struct Args {
    /// Asset to load (.glb or .gltf)
    file: PathBuf,

    /// Never flip texture V coordinates
    #[arg(long)]
    no_flip_v: bool,

    /// Skip mesh construction
    #[arg(long)]
    skip_meshes: bool,

    /// Emulate a device without 32-bit index support
    #[arg(long)]
    no_u32_indices: bool,

    /// Log pipeline stages
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Error, Debug)]
enum InspectError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Load(#[from] GraphError),
}

fn options(args: &Args) -> LoadOptions {
    let flip_v = if args.no_flip_v {
        FlipV::Never
    } else {
        FlipV::Auto
    };
    LoadOptions::default()
        .with_hint(SourceHint::from_path(&args.file))
        .with_flip_v(flip_v)
        .with_skip_meshes(args.skip_meshes)
}

fn load(path: &Path, options: LoadOptions, caps: DeviceCaps) -> Result<ResourceGraph, InspectError> {
    let bytes = std::fs::read(path).map_err(|source| InspectError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let device = MemoryDevice::new(caps);
    let resolver = FsResolver::for_asset(path);
    let graph = pollster::block_on(
        GraphLoader::new(&device, &resolver)
            .with_images(&resolver)
            .with_options(options)
            .load(&bytes),
    )?;
    info!(
        bytes = bytes.len(),
        device_bytes = device.allocated_bytes(),
        "loaded {}",
        path.display()
    );
    Ok(graph)
}

fn summarize(graph: &ResourceGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "nodes:      {}", graph.nodes.len());
    let _ = writeln!(out, "scenes:     {}", graph.scenes.len());
    let _ = writeln!(out, "meshes:     {}", graph.meshes.len());
    for (index, render) in graph.renders.iter().enumerate() {
        let name = render.name.as_deref().unwrap_or("<unnamed>");
        let _ = writeln!(out, "  [{}] {} ({} primitives)", index, name, render.meshes.len());
    }
    let _ = writeln!(out, "materials:  {}", graph.materials.len());
    let loaded = graph.textures.iter().filter(|t| t.is_some()).count();
    let _ = writeln!(out, "textures:   {} ({} loaded)", graph.textures.len(), loaded);
    let _ = writeln!(out, "skins:      {}", graph.skins.len());
    let _ = writeln!(out, "animations: {}", graph.animations.len());
    for track in &graph.animations {
        let _ = writeln!(
            out,
            "  {} ({:.2}s, {} curves)",
            track.name,
            track.duration,
            track.curves.len()
        );
    }
    let _ = writeln!(out, "cameras:    {}", graph.cameras.len());
    let _ = writeln!(out, "lights:     {}", graph.lights.len());
    if !graph.variants.is_empty() {
        let _ = writeln!(out, "variants:   {}", graph.variants.join(", "));
    }
    for warning in &graph.warnings {
        let _ = writeln!(out, "warning: {}", warning);
    }
    out
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let caps = DeviceCaps {
        u32_indices: !args.no_u32_indices,
        ..DeviceCaps::default()
    };
    match load(&args.file, options(&args), caps) {
        Ok(graph) => {
            print!("{}", summarize(&graph));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"{
        "asset": {"version": "2.0", "generator": "test"},
        "buffers": [{"byteLength": 36, "uri": "triangle.bin"}],
        "bufferViews": [{"buffer": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"}],
        "meshes": [{"name": "tri", "primitives": [{"attributes": {"POSITION": 0}}]}],
        "nodes": [{"mesh": 0}],
        "scenes": [{"nodes": [0]}]
    }"#;

    fn triangle_bin() -> Vec<u8> {
        [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_inspect_gltf_with_external_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triangle.gltf");
        std::fs::write(&path, TRIANGLE).unwrap();
        std::fs::write(dir.path().join("triangle.bin"), triangle_bin()).unwrap();

        let args = Args::parse_from(["glb-inspect", path.to_str().unwrap(), "--no-flip-v"]);
        let graph = load(&args.file, options(&args), DeviceCaps::default()).unwrap();
        let summary = summarize(&graph);
        assert!(summary.contains("meshes:     1"));
        assert!(summary.contains("[0] tri (1 primitives)"));
    }

    #[test]
    fn test_missing_file() {
        let err = load(
            Path::new("/nonexistent/model.glb"),
            LoadOptions::default(),
            DeviceCaps::default(),
        )
        .unwrap_err();
        assert!(matches!(err, InspectError::Read { .. }));
    }

    #[test]
    fn test_glb_hint_from_extension() {
        let args = Args::parse_from(["glb-inspect", "a/B.GLB", "--skip-meshes"]);
        let options = options(&args);
        assert_eq!(options.hint, SourceHint::Binary);
        assert!(options.build.skip_meshes);
    }
}
