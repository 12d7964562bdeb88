//! Numeric component kinds and element shapes.
//!
//! An accessor stores `count` elements; each element is an [`ElementType`]
//! (scalar, vector or matrix) of components of one [`ComponentKind`].

use std::fmt;

use serde::Deserialize;

use crate::error::{GraphError, Result};

/// Fixed-width numeric kind of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// 8-bit signed integer (5120)
    I8,
    /// 8-bit unsigned integer (5121)
    U8,
    /// 16-bit signed integer (5122)
    I16,
    /// 16-bit unsigned integer (5123)
    U16,
    /// 32-bit unsigned integer (5125)
    U32,
    /// 32-bit floating point number (5126)
    F32,
}

impl ComponentKind {
    /// Resolves a schema `componentType` code.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Unsupported` for codes outside the supported set.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            5120 => Ok(ComponentKind::I8),
            5121 => Ok(ComponentKind::U8),
            5122 => Ok(ComponentKind::I16),
            5123 => Ok(ComponentKind::U16),
            5125 => Ok(ComponentKind::U32),
            5126 => Ok(ComponentKind::F32),
            _ => Err(GraphError::unsupported(format!(
                "Unsupported component type: {}",
                code
            ))),
        }
    }

    /// Returns the schema code for this kind.
    pub const fn code(self) -> u32 {
        match self {
            ComponentKind::I8 => 5120,
            ComponentKind::U8 => 5121,
            ComponentKind::I16 => 5122,
            ComponentKind::U16 => 5123,
            ComponentKind::U32 => 5125,
            ComponentKind::F32 => 5126,
        }
    }

    /// Returns the size of one component in bytes.
    pub const fn size(self) -> usize {
        match self {
            ComponentKind::I8 | ComponentKind::U8 => 1,
            ComponentKind::I16 | ComponentKind::U16 => 2,
            ComponentKind::U32 | ComponentKind::F32 => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ComponentKind::I8 => "int8",
            ComponentKind::U8 => "uint8",
            ComponentKind::I16 => "int16",
            ComponentKind::U16 => "uint16",
            ComponentKind::U32 => "uint32",
            ComponentKind::F32 => "float32",
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ComponentKind::F32)
    }

    /// Maps a fixed-point sample back to its normalized floating-point range.
    ///
    /// Signed kinds divide by their maximum magnitude and clamp to -1;
    /// unsigned kinds divide by their maximum value. `U32` and `F32` pass
    /// through unchanged.
    pub fn dequantize(self, value: f32) -> f32 {
        match self {
            ComponentKind::I8 => (value / 127.0).max(-1.0),
            ComponentKind::U8 => value / 255.0,
            ComponentKind::I16 => (value / 32767.0).max(-1.0),
            ComponentKind::U16 => value / 65535.0,
            ComponentKind::U32 | ComponentKind::F32 => value,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shape of one accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ElementType {
    #[serde(rename = "SCALAR")]
    Scalar,
    #[serde(rename = "VEC2")]
    Vec2,
    #[serde(rename = "VEC3")]
    Vec3,
    #[serde(rename = "VEC4")]
    Vec4,
    #[serde(rename = "MAT2")]
    Mat2,
    #[serde(rename = "MAT3")]
    Mat3,
    #[serde(rename = "MAT4")]
    Mat4,
}

impl ElementType {
    /// Number of components in one element.
    pub const fn components(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 | ElementType::Mat2 => 4,
            ElementType::Mat3 => 9,
            ElementType::Mat4 => 16,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Scalar => "SCALAR",
            ElementType::Vec2 => "VEC2",
            ElementType::Vec3 => "VEC3",
            ElementType::Vec4 => "VEC4",
            ElementType::Mat2 => "MAT2",
            ElementType::Mat3 => "MAT3",
            ElementType::Mat4 => "MAT4",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
