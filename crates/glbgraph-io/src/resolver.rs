//! Collaborators that fetch buffer and image bytes.
//!
//! Both traits return [`LocalBoxFuture`]s so implementations can suspend on
//! network or file access; the loader joins them on a single thread.
//! [`FsResolver`] reads relative URIs from a base directory and decodes
//! images with the `image` crate.

use std::path::{Path, PathBuf};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use glbgraph_core::{GraphError, Result};
use glbgraph_scene::{DecodedImage, Texture};
use image::ImageFormat;
use tracing::debug;

use crate::uri::percent_decode;

/// Where an image's encoded bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// External reference, relative to the asset.
    Uri(String),
    /// Bytes from a buffer view or a `data:` URI.
    Embedded {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
}

/// Loads the bytes of buffers declared by external URI.
pub trait BufferResolver {
    fn load_buffer<'a>(&'a self, index: usize, uri: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>>>;
}

/// Loads and decodes images.
pub trait ImageResolver {
    fn load_image<'a>(
        &'a self,
        index: usize,
        source: ImageSource,
    ) -> LocalBoxFuture<'a, Result<DecodedImage>>;

    /// Runs on every decoded image before textures are created.
    fn postprocess_image(&self, _index: usize, _image: &mut DecodedImage) {}

    /// Runs on every texture before materials are built.
    fn postprocess_texture(&self, _index: usize, _texture: &mut Texture) {}
}

/// Decodes PNG or JPEG bytes into RGBA8.
///
/// The MIME type picks the decoder when present; otherwise the format is
/// guessed from the bytes.
pub fn decode_image(bytes: &[u8], mime_type: Option<&str>) -> Result<DecodedImage> {
    let format = mime_type.and_then(ImageFormat::from_mime_type);
    let decoded = match format {
        Some(format) => image::load_from_memory_with_format(bytes, format),
        None => image::load_from_memory(bytes),
    }
    .map_err(|e| GraphError::external(format!("Failed to decode image: {}", e)))?;
    let rgba = decoded.to_rgba8();
    Ok(DecodedImage::new(rgba.width(), rgba.height(), rgba.into_raw()))
}

/// Resolves relative URIs against a directory on the local file system.
#[derive(Debug, Clone)]
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolver for the directory holding `asset`.
    pub fn for_asset<P: AsRef<Path>>(asset: P) -> Self {
        let base = asset
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(base)
    }

    pub fn resolve(&self, uri: &str) -> PathBuf {
        let decoded = String::from_utf8_lossy(&percent_decode(uri)).into_owned();
        self.base.join(decoded)
    }

    fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.resolve(uri);
        debug!(path = %path.display(), "reading resource");
        std::fs::read(&path)
            .map_err(|e| GraphError::external(format!("Failed to read {}: {}", path.display(), e)))
    }
}

impl BufferResolver for FsResolver {
    fn load_buffer<'a>(&'a self, _index: usize, uri: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>>> {
        async move { self.read(uri) }.boxed_local()
    }
}

impl ImageResolver for FsResolver {
    fn load_image<'a>(
        &'a self,
        _index: usize,
        source: ImageSource,
    ) -> LocalBoxFuture<'a, Result<DecodedImage>> {
        async move {
            match source {
                ImageSource::Uri(uri) => {
                    let bytes = self.read(&uri)?;
                    decode_image(&bytes, None)
                }
                ImageSource::Embedded { bytes, mime_type } => {
                    decode_image(&bytes, mime_type.as_deref())
                }
            }
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let decoded = decode_image(&png(2, 3), Some("image/png")).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 3));
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
        assert_eq!(decoded.pixels.len(), 2 * 3 * 4);
    }

    #[test]
    fn test_decode_garbage_is_external_failure() {
        let err = decode_image(b"not an image", None).unwrap_err();
        assert!(matches!(err, GraphError::ExternalResource(_)));
    }

    #[test]
    fn test_fs_resolver_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my buffer.bin"), [1u8, 2, 3]).unwrap();
        std::fs::write(dir.path().join("tex.png"), png(1, 1)).unwrap();
        let resolver = FsResolver::for_asset(dir.path().join("scene.gltf"));

        let bytes = pollster::block_on(resolver.load_buffer(0, "my%20buffer.bin")).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let image =
            pollster::block_on(resolver.load_image(0, ImageSource::Uri("tex.png".into()))).unwrap();
        assert_eq!(image.width, 1);

        let missing = pollster::block_on(resolver.load_buffer(1, "absent.bin")).unwrap_err();
        assert!(matches!(missing, GraphError::ExternalResource(_)));
    }
}
