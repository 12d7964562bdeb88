//! Core format layer for glTF 2.0 and GLB assets.
//!
//! This crate reads the container and schema and exposes typed accessor data.
//! Nothing here allocates device resources; that is the job of
//! `glbgraph-scene`.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`container`] | GLB envelope parsing and writing |
//! | [`schema`] | serde model of the JSON document |
//! | [`accessor`] | typed views over buffer data, sparse patching, dequantization |
//! | [`component`] | component kinds and element shapes |
//! | [`error`] | the shared error type |
//!
//! ```ignore
//! use glbgraph_core::{accessor, container, schema::Document, SourceHint};
//!
//! let parsed = container::parse(&bytes, SourceHint::Auto)?;
//! let document = Document::decode(parsed.schema)?;
//! let views = accessor::resolve_views(&document.buffer_views, &buffers)?;
//! let positions = accessor::extract(&document.accessors[0], &views, true)?;
//! ```

pub mod accessor;
pub mod component;
pub mod container;
pub mod error;
pub mod schema;

pub use accessor::{bounding_box, extract, resolve_views, BoundingBox, NumericView, Origin, ViewData};
pub use component::{ComponentKind, ElementType};
pub use container::{assemble, Container, Parsed, SourceHint};
pub use error::{GraphError, Result};
pub use schema::Document;
