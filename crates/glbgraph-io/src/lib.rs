//! Asynchronous loading of glTF and GLB assets into resource graphs.
//!
//! The loader drives `glbgraph-scene` and asks collaborators for everything
//! outside the input bytes: external buffers ([`BufferResolver`]), images
//! ([`ImageResolver`]) and compressed geometry ([`GeometryDecompressor`]).
//! Futures are single-threaded; run them with any executor, for example
//! `pollster::block_on`.
//!
//! ```ignore
//! let device = MemoryDevice::default();
//! let resolver = FsResolver::for_asset(&path);
//! let graph = pollster::block_on(
//!     GraphLoader::new(&device, &resolver)
//!         .with_images(&resolver)
//!         .with_options(LoadOptions::default().with_hint(SourceHint::from_path(&path)))
//!         .load(&bytes),
//! )?;
//! ```

pub mod decompress;
pub mod loader;
pub mod resolver;
pub mod uri;

pub use decompress::GeometryDecompressor;
pub use loader::{GraphLoader, LoadOptions};
pub use resolver::{decode_image, BufferResolver, FsResolver, ImageResolver, ImageSource};
