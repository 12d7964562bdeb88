//! Asynchronous load orchestration.
//!
//! [`GraphLoader::load`] runs the pipeline with explicit barriers:
//!
//! 1. parse the container and decode the schema;
//! 2. load every buffer (join all);
//! 3. build nodes, meshes, skins and animations;
//! 4. load every image and decompress every compressed primitive (join);
//! 5. create textures and build materials;
//! 6. fill compressed meshes, link skins and group renders.
//!
//! Any failure aborts the load; no partial graph is returned.

use std::rc::Rc;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use glbgraph_core::container::{self, SourceHint};
use glbgraph_core::schema::{Buffer, Document, Image};
use glbgraph_core::{GraphError, Result};
use glbgraph_scene::compressed::DRACO_EXTENSION;
use glbgraph_scene::{
    create_textures, BuildOptions, DecodedImage, DecompressedGeometry, FlipV, GraphBuilder,
    GraphicsDevice, ResourceGraph,
};
use tracing::debug;

use crate::decompress::GeometryDecompressor;
use crate::resolver::{BufferResolver, ImageResolver, ImageSource};
use crate::uri::{decode_data_uri, is_data_uri};

/// Options for one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub hint: SourceHint,
    pub build: BuildOptions,
}

impl LoadOptions {
    pub fn with_hint(mut self, hint: SourceHint) -> Self {
        self.hint = hint;
        self
    }

    pub fn with_flip_v(mut self, flip_v: FlipV) -> Self {
        self.build.flip_v = flip_v;
        self
    }

    pub fn with_skip_meshes(mut self, skip: bool) -> Self {
        self.build.skip_meshes = skip;
        self
    }

    pub fn with_skip_animations(mut self, skip: bool) -> Self {
        self.build.skip_animations = skip;
        self
    }
}

/// Loads documents into resource graphs through the given collaborators.
pub struct GraphLoader<'a> {
    device: &'a dyn GraphicsDevice,
    buffers: &'a dyn BufferResolver,
    images: Option<&'a dyn ImageResolver>,
    decompressor: Option<&'a dyn GeometryDecompressor>,
    options: LoadOptions,
}

impl<'a> GraphLoader<'a> {
    pub fn new(device: &'a dyn GraphicsDevice, buffers: &'a dyn BufferResolver) -> Self {
        Self {
            device,
            buffers,
            images: None,
            decompressor: None,
            options: LoadOptions::default(),
        }
    }

    /// Without an image resolver every texture is reported missing.
    pub fn with_images(mut self, images: &'a dyn ImageResolver) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_decompressor(mut self, decompressor: &'a dyn GeometryDecompressor) -> Self {
        self.decompressor = Some(decompressor);
        self
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Loads `data`, a GLB file or bare glTF JSON.
    ///
    /// # Errors
    ///
    /// - `GraphError::Format` for malformed containers, schemas or accessors.
    /// - `GraphError::Unsupported` when compressed geometry is required and
    ///   no decompressor is set.
    /// - `GraphError::ExternalResource` when a collaborator fails.
    pub async fn load(&self, data: &[u8]) -> Result<ResourceGraph> {
        let parsed = container::parse(data, self.options.hint)?;
        let document = Document::decode(parsed.schema)?;
        if self.decompressor.is_none() && document.requires_extension(DRACO_EXTENSION) {
            return Err(GraphError::unsupported(format!(
                "{} is required but no geometry decompressor is available",
                DRACO_EXTENSION
            )));
        }

        let buffers = future::try_join_all(
            document
                .buffers
                .iter()
                .enumerate()
                .map(|(index, buffer)| self.load_buffer(index, buffer, parsed.binary)),
        )
        .await?;
        debug!(buffers = buffers.len(), "buffers loaded");

        let mut builder = GraphBuilder::new(&document, &buffers, self.device, self.options.build)?;
        let pending = builder.build_structure()?;

        let sources = document
            .images
            .iter()
            .map(|image| image_source(&builder, image))
            .collect::<Result<Vec<_>>>()?;
        let images = future::try_join_all(
            sources
                .into_iter()
                .enumerate()
                .map(|(index, source)| self.load_image(index, source)),
        );
        let geometries = future::try_join_all(
            pending
                .iter()
                .map(|primitive| self.decompress(primitive)),
        );
        let (images, geometries) = futures::try_join!(images, geometries)?;
        debug!(
            images = images.len(),
            decompressed = geometries.len(),
            "external resources loaded"
        );

        let images: Vec<Option<Rc<DecodedImage>>> = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                image.map(|mut image| {
                    if let Some(resolver) = self.images {
                        resolver.postprocess_image(index, &mut image);
                    }
                    Rc::new(image)
                })
            })
            .collect();
        let mut textures = create_textures(&document, &images);
        if let Some(resolver) = self.images {
            for (index, texture) in textures.iter_mut().enumerate() {
                if let Some(texture) = texture {
                    resolver.postprocess_texture(index, texture);
                }
            }
        }
        builder.set_textures(textures);
        builder.build_materials()?;

        for (primitive, geometry) in pending.iter().zip(&geometries) {
            builder.complete_compressed(primitive, geometry)?;
        }
        builder.link_skins();
        builder.build_renders();
        Ok(builder.finish())
    }

    fn load_buffer<'b>(
        &'b self,
        index: usize,
        buffer: &'b Buffer,
        binary: Option<&'b [u8]>,
    ) -> LocalBoxFuture<'b, Result<Vec<u8>>> {
        async move {
            match buffer.uri.as_deref() {
                Some(uri) if is_data_uri(uri) => Ok(decode_data_uri(uri)?.bytes),
                Some(uri) => self.buffers.load_buffer(index, uri).await,
                None => binary.map(<[u8]>::to_vec).ok_or_else(|| {
                    GraphError::format(format!(
                        "Buffer {} has no URI and the container has no binary chunk",
                        index
                    ))
                }),
            }
        }
        .boxed_local()
    }

    fn load_image<'b>(
        &'b self,
        index: usize,
        source: Option<ImageSource>,
    ) -> LocalBoxFuture<'b, Result<Option<DecodedImage>>> {
        async move {
            match (self.images, source) {
                (Some(resolver), Some(source)) => {
                    resolver.load_image(index, source).await.map(Some)
                }
                _ => Ok(None),
            }
        }
        .boxed_local()
    }

    fn decompress<'b>(
        &'b self,
        primitive: &'b glbgraph_scene::CompressedPrimitive,
    ) -> LocalBoxFuture<'b, Result<DecompressedGeometry>> {
        match self.decompressor {
            Some(decompressor) => decompressor.decompress(primitive),
            None => future::ready(Err(GraphError::unsupported(
                "Compressed primitives require a geometry decompressor",
            )))
            .boxed_local(),
        }
    }
}

/// Where an image's bytes come from; `None` if it declares no source.
fn image_source(builder: &GraphBuilder<'_>, image: &Image) -> Result<Option<ImageSource>> {
    if let Some(view) = image.buffer_view {
        return Ok(Some(ImageSource::Embedded {
            bytes: builder.view(view)?.bytes.to_vec(),
            mime_type: image.mime_type.clone(),
        }));
    }
    match image.uri.as_deref() {
        Some(uri) if is_data_uri(uri) => {
            let data = decode_data_uri(uri)?;
            Ok(Some(ImageSource::Embedded {
                bytes: data.bytes,
                mime_type: data.mime_type.or_else(|| image.mime_type.clone()),
            }))
        }
        Some(uri) => Ok(Some(ImageSource::Uri(uri.to_string()))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builders() {
        let options = LoadOptions::default()
            .with_hint(SourceHint::Binary)
            .with_flip_v(FlipV::Never)
            .with_skip_animations(true);
        assert_eq!(options.hint, SourceHint::Binary);
        assert_eq!(options.build.flip_v, FlipV::Never);
        assert!(options.build.skip_animations);
        assert!(!options.build.skip_meshes);
    }
}
