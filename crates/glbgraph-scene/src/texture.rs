//! Decoded images and the textures that sample them.

use std::rc::Rc;

use glbgraph_core::schema::{self, Document};
use tracing::debug;

/// An image after decoding, as RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl Filter {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            9728 => Some(Filter::Nearest),
            9729 => Some(Filter::Linear),
            9984 => Some(Filter::NearestMipmapNearest),
            9985 => Some(Filter::LinearMipmapNearest),
            9986 => Some(Filter::NearestMipmapLinear),
            9987 => Some(Filter::LinearMipmapLinear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    ClampToEdge,
    MirroredRepeat,
    Repeat,
}

impl Address {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            33071 => Some(Address::ClampToEdge),
            33648 => Some(Address::MirroredRepeat),
            10497 => Some(Address::Repeat),
            _ => None,
        }
    }
}

/// A texture: a shared decoded image plus its own sampler state.
///
/// Cloning shares the pixels and copies the sampler state, so two textures
/// over one image can sample it differently.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub image: Rc<DecodedImage>,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub address_u: Address,
    pub address_v: Address,
}

impl Texture {
    pub fn new(name: impl Into<String>, image: Rc<DecodedImage>) -> Self {
        Self {
            name: name.into(),
            image,
            min_filter: Filter::LinearMipmapLinear,
            mag_filter: Filter::Linear,
            address_u: Address::Repeat,
            address_v: Address::Repeat,
        }
    }

    /// Applies a schema sampler. Missing or unknown codes keep the defaults.
    pub fn apply_sampler(&mut self, sampler: &schema::Sampler) {
        self.min_filter = sampler
            .min_filter
            .and_then(Filter::from_code)
            .unwrap_or(Filter::LinearMipmapLinear);
        self.mag_filter = sampler
            .mag_filter
            .and_then(Filter::from_code)
            .unwrap_or(Filter::Linear);
        self.address_u = sampler
            .wrap_s
            .and_then(Address::from_code)
            .unwrap_or(Address::Repeat);
        self.address_v = sampler
            .wrap_t
            .and_then(Address::from_code)
            .unwrap_or(Address::Repeat);
    }

    pub fn shares_image(&self, other: &Texture) -> bool {
        Rc::ptr_eq(&self.image, &other.image)
    }
}

/// Creates one texture per schema texture from images loaded per image index.
///
/// A texture whose source image is missing or failed to load is `None`.
pub fn create_textures(
    document: &Document,
    images: &[Option<Rc<DecodedImage>>],
) -> Vec<Option<Texture>> {
    let mut used = vec![false; images.len()];
    document
        .textures
        .iter()
        .enumerate()
        .map(|(index, texture)| {
            let source = texture.image_source()?;
            let image = images.get(source)?.as_ref()?;
            if used[source] {
                debug!(texture = index, image = source, "cloning shared image");
            }
            used[source] = true;

            let name = texture
                .name
                .clone()
                .or_else(|| document.images.get(source).and_then(|i| i.name.clone()))
                .unwrap_or_else(|| format!("texture_{}", index));
            let mut built = Texture::new(name, Rc::clone(image));
            if let Some(sampler) = texture.sampler.and_then(|s| document.samplers.get(s)) {
                built.apply_sampler(sampler);
            }
            Some(built)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Document {
        Document::decode(
            br#"{
                "asset": {"version": "2.0"},
                "images": [{"uri": "a.png"}],
                "samplers": [{"wrapS": 33071, "wrapT": 33071}, {"wrapS": 33648, "magFilter": 9728}],
                "textures": [
                    {"source": 0, "sampler": 0},
                    {"source": 0, "sampler": 1},
                    {"source": 3}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_sampler_defaults() {
        let mut texture = Texture::new("t", Rc::new(DecodedImage::default()));
        texture.apply_sampler(&schema::Sampler {
            mag_filter: Some(1234),
            ..Default::default()
        });
        assert_eq!(texture.min_filter, Filter::LinearMipmapLinear);
        assert_eq!(texture.mag_filter, Filter::Linear);
        assert_eq!(texture.address_u, Address::Repeat);
    }

    #[test]
    fn test_shared_image_gets_independent_samplers() {
        let image = Rc::new(DecodedImage::new(1, 1, vec![255; 4]));
        let textures = create_textures(&document(), &[Some(image)]);
        let first = textures[0].as_ref().unwrap();
        let second = textures[1].as_ref().unwrap();

        assert!(first.shares_image(second));
        assert_eq!(first.address_u, Address::ClampToEdge);
        assert_eq!(second.address_u, Address::MirroredRepeat);
        assert_eq!(second.address_v, Address::Repeat);
        assert_eq!(second.mag_filter, Filter::Nearest);
        assert!(textures[2].is_none());
    }
}
