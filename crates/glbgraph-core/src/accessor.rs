//! Accessor data extraction.
//!
//! Turns a schema accessor plus resolved buffer views into a [`NumericView`]:
//! a typed window of `count` elements that either borrows the source bytes
//! (keeping the view's stride) or owns a tightly packed copy.

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use num_traits::AsPrimitive;

use crate::component::ComponentKind;
use crate::error::{GraphError, Result};
use crate::schema::{self, Accessor};

/// A buffer view resolved against its loaded buffer.
#[derive(Debug, Clone, Copy)]
pub struct ViewData<'a> {
    /// Index of the owning buffer.
    pub buffer: usize,
    /// Offset of `bytes` within the owning buffer.
    pub byte_offset: usize,
    pub bytes: &'a [u8],
    pub byte_stride: Option<usize>,
}

/// Resolves every buffer view against loaded buffer bytes.
///
/// # Errors
///
/// Returns `GraphError::Format` if a view names a missing buffer or its range
/// does not fit the buffer.
pub fn resolve_views<'a, B: AsRef<[u8]>>(
    views: &[schema::BufferView],
    buffers: &'a [B],
) -> Result<Vec<ViewData<'a>>> {
    views
        .iter()
        .enumerate()
        .map(|(index, view)| {
            let buffer = buffers
                .get(view.buffer)
                .ok_or_else(|| {
                    GraphError::format(format!(
                        "Buffer view {} references missing buffer {}",
                        index, view.buffer
                    ))
                })?
                .as_ref();
            let end = view
                .byte_offset
                .checked_add(view.byte_length)
                .filter(|&end| end <= buffer.len())
                .ok_or_else(|| {
                    GraphError::format(format!(
                        "Buffer view {} range {}+{} exceeds buffer {} of {} bytes",
                        index,
                        view.byte_offset,
                        view.byte_length,
                        view.buffer,
                        buffer.len()
                    ))
                })?;
            Ok(ViewData {
                buffer: view.buffer,
                byte_offset: view.byte_offset,
                bytes: &buffer[view.byte_offset..end],
                byte_stride: view.byte_stride,
            })
        })
        .collect()
}

/// Location of the first element inside a loaded buffer.
///
/// Only borrowed views carry an origin; it lets callers detect attributes
/// that already share one interleaved buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub buffer: usize,
    pub byte_offset: usize,
}

/// Typed, fixed-width view over accessor data.
#[derive(Debug, Clone)]
pub struct NumericView<'a> {
    kind: ComponentKind,
    components: usize,
    count: usize,
    stride: usize,
    data: Cow<'a, [u8]>,
    origin: Option<Origin>,
}

impl<'a> NumericView<'a> {
    /// Wraps tightly packed little-endian bytes.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Format` if `data` is shorter than
    /// `count * components * kind.size()` bytes.
    pub fn packed(
        kind: ComponentKind,
        components: usize,
        count: usize,
        data: impl Into<Cow<'a, [u8]>>,
    ) -> Result<Self> {
        let data = data.into();
        let element_size = components * kind.size();
        if data.len() < byte_len(count, element_size)? {
            return Err(GraphError::format(format!(
                "Packed data of {} bytes is too short for {} x {} {}",
                data.len(),
                count,
                components,
                kind
            )));
        }
        Ok(Self {
            kind,
            components,
            count,
            stride: element_size,
            data,
            origin: None,
        })
    }

    /// Builds an owned float32 view from decoded values.
    pub fn from_f32(values: &[f32], components: usize) -> NumericView<'static> {
        let mut data = vec![0u8; values.len() * 4];
        LittleEndian::write_f32_into(values, &mut data);
        NumericView {
            kind: ComponentKind::F32,
            components,
            count: values.len() / components.max(1),
            stride: components * 4,
            data: Cow::Owned(data),
            origin: None,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Distance in bytes between consecutive elements.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_size(&self) -> usize {
        self.components * self.kind.size()
    }

    pub fn is_packed(&self) -> bool {
        self.stride == self.element_size()
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.data, Cow::Borrowed(_))
    }

    pub fn origin(&self) -> Option<Origin> {
        self.origin
    }

    /// Raw bytes starting at the first element, including stride gaps.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of one element.
    pub fn element(&self, index: usize) -> &[u8] {
        let start = index * self.stride;
        &self.data[start..start + self.element_size()]
    }

    /// Returns the elements as tightly packed bytes, copying only when strided.
    pub fn packed_bytes(&self) -> Cow<'_, [u8]> {
        if self.is_packed() {
            return Cow::Borrowed(&self.data[..self.element_size() * self.count]);
        }
        let mut out = Vec::with_capacity(self.element_size() * self.count);
        for index in 0..self.count {
            out.extend_from_slice(self.element(index));
        }
        Cow::Owned(out)
    }

    /// Detaches the view from its source bytes.
    pub fn into_owned(self) -> NumericView<'static> {
        NumericView {
            kind: self.kind,
            components: self.components,
            count: self.count,
            stride: self.stride,
            data: Cow::Owned(self.data.into_owned()),
            origin: self.origin,
        }
    }

    /// Reads one component, converted with `as` semantics.
    pub fn get<T>(&self, index: usize, component: usize) -> T
    where
        T: Copy + 'static,
        i8: AsPrimitive<T>,
        u8: AsPrimitive<T>,
        i16: AsPrimitive<T>,
        u16: AsPrimitive<T>,
        u32: AsPrimitive<T>,
        f32: AsPrimitive<T>,
    {
        let at = index * self.stride + component * self.kind.size();
        read_component(self.kind, &self.data[at..])
    }

    /// Reads every component in element order, converted with `as` semantics.
    pub fn to_vec<T>(&self) -> Vec<T>
    where
        T: Copy + 'static,
        i8: AsPrimitive<T>,
        u8: AsPrimitive<T>,
        i16: AsPrimitive<T>,
        u16: AsPrimitive<T>,
        u32: AsPrimitive<T>,
        f32: AsPrimitive<T>,
    {
        let mut out = Vec::with_capacity(self.count * self.components);
        for index in 0..self.count {
            for component in 0..self.components {
                out.push(self.get(index, component));
            }
        }
        out
    }

    /// Derives float32 data.
    ///
    /// Float data and non-normalized integer data are returned unchanged.
    /// Normalized integer data is dequantized into a new packed float32 view.
    pub fn to_float32(self, normalized: bool) -> NumericView<'a> {
        if self.kind.is_float() || !normalized {
            return self;
        }
        let kind = self.kind;
        let values: Vec<f32> = self
            .to_vec::<f32>()
            .into_iter()
            .map(|value| kind.dequantize(value))
            .collect();
        NumericView::from_f32(&values, self.components)
    }
}

fn read_component<T>(kind: ComponentKind, bytes: &[u8]) -> T
where
    T: Copy + 'static,
    i8: AsPrimitive<T>,
    u8: AsPrimitive<T>,
    i16: AsPrimitive<T>,
    u16: AsPrimitive<T>,
    u32: AsPrimitive<T>,
    f32: AsPrimitive<T>,
{
    match kind {
        ComponentKind::I8 => (bytes[0] as i8).as_(),
        ComponentKind::U8 => bytes[0].as_(),
        ComponentKind::I16 => LittleEndian::read_i16(bytes).as_(),
        ComponentKind::U16 => LittleEndian::read_u16(bytes).as_(),
        ComponentKind::U32 => LittleEndian::read_u32(bytes).as_(),
        ComponentKind::F32 => LittleEndian::read_f32(bytes).as_(),
    }
}

/// Returns the `count` elements starting at `offset` of `view`, or a format
/// error if the last element would end past the view.
fn window<'a>(
    view: &ViewData<'a>,
    offset: usize,
    count: usize,
    element_size: usize,
    stride: usize,
) -> Result<&'a [u8]> {
    if stride < element_size {
        return Err(GraphError::format(format!(
            "Byte stride {} is smaller than element size {}",
            stride, element_size
        )));
    }
    let needed = match count {
        0 => 0,
        n => (n - 1)
            .checked_mul(stride)
            .and_then(|n| n.checked_add(element_size))
            .ok_or_else(|| {
                GraphError::format(format!(
                    "Accessor of {} elements with stride {} overflows",
                    count, stride
                ))
            })?,
    };
    let end = offset
        .checked_add(needed)
        .filter(|&end| end <= view.bytes.len())
        .ok_or_else(|| {
            GraphError::format(format!(
                "Accessor needs {} bytes at offset {} but its buffer view has {}",
                needed,
                offset,
                view.bytes.len()
            ))
        })?;
    Ok(&view.bytes[offset..end])
}

/// Size in bytes of `count` packed elements; oversized counts are malformed.
fn byte_len(count: usize, element_size: usize) -> Result<usize> {
    count
        .checked_mul(element_size)
        .filter(|&len| len <= isize::MAX as usize)
        .ok_or_else(|| {
            GraphError::format(format!(
                "Accessor of {} elements of {} bytes is too large",
                count, element_size
            ))
        })
}

fn view_at<'v, 'a>(views: &'v [ViewData<'a>], index: usize) -> Result<&'v ViewData<'a>> {
    views
        .get(index)
        .ok_or_else(|| GraphError::format(format!("Missing buffer view {}", index)))
}

/// Extracts the data described by `accessor`.
///
/// When `flatten` is set, strided data is copied into packed storage;
/// otherwise the result borrows the view bytes and keeps the stride. Sparse
/// accessors always produce packed, owned data.
///
/// # Errors
///
/// - `GraphError::Unsupported` for an unknown component type.
/// - `GraphError::Format` if the data does not fit its buffer view, a view
///   index is missing, or a sparse index lies outside the accessor.
pub fn extract<'a>(
    accessor: &Accessor,
    views: &[ViewData<'a>],
    flatten: bool,
) -> Result<NumericView<'a>> {
    let kind = ComponentKind::from_code(accessor.component_type)?;
    let components = accessor.element_type.components();
    let element_size = components * kind.size();
    let count = accessor.count;

    if let Some(sparse) = &accessor.sparse {
        let mut base = match accessor.buffer_view {
            Some(_) => {
                let dense = Accessor {
                    sparse: None,
                    ..accessor.clone()
                };
                extract(&dense, views, true)?.packed_bytes().into_owned()
            }
            None => vec![0u8; byte_len(count, element_size)?],
        };

        let index_kind = ComponentKind::from_code(sparse.indices.component_type)?;
        let index_view = view_at(views, sparse.indices.buffer_view)?;
        let index_bytes = window(
            index_view,
            sparse.indices.byte_offset,
            sparse.count,
            index_kind.size(),
            index_kind.size(),
        )?;
        let indices = NumericView::packed(index_kind, 1, sparse.count, index_bytes)?;

        let value_view = view_at(views, sparse.values.buffer_view)?;
        let values = window(
            value_view,
            sparse.values.byte_offset,
            sparse.count,
            element_size,
            element_size,
        )?;

        for i in 0..sparse.count {
            let target: u32 = indices.get(i, 0);
            let target = target as usize;
            if target >= count {
                return Err(GraphError::format(format!(
                    "Sparse index {} out of range for accessor of {} elements",
                    target, count
                )));
            }
            base[target * element_size..(target + 1) * element_size]
                .copy_from_slice(&values[i * element_size..(i + 1) * element_size]);
        }
        return NumericView::packed(kind, components, count, base);
    }

    let Some(view_index) = accessor.buffer_view else {
        let zeros = vec![0u8; byte_len(count, element_size)?];
        return NumericView::packed(kind, components, count, zeros);
    };
    let view = view_at(views, view_index)?;
    let stride = view.byte_stride.unwrap_or(element_size);
    let bytes = window(view, accessor.byte_offset, count, element_size, stride)?;

    let borrowed = NumericView {
        kind,
        components,
        count,
        stride,
        data: Cow::Borrowed(bytes),
        origin: Some(Origin {
            buffer: view.buffer,
            byte_offset: view.byte_offset + accessor.byte_offset,
        }),
    };
    if flatten && stride != element_size {
        let packed = borrowed.packed_bytes().into_owned();
        return NumericView::packed(kind, components, count, packed);
    }
    Ok(borrowed)
}

/// Axis-aligned bounds stored as centre and half extents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

impl BoundingBox {
    pub fn from_min_max(min: [f32; 3], max: [f32; 3]) -> Self {
        let mut center = [0.0; 3];
        let mut half_extents = [0.0; 3];
        for axis in 0..3 {
            center[axis] = (max[axis] + min[axis]) * 0.5;
            half_extents[axis] = (max[axis] - min[axis]) * 0.5;
        }
        Self {
            center,
            half_extents,
        }
    }

    pub fn min(&self) -> [f32; 3] {
        std::array::from_fn(|axis| self.center[axis] - self.half_extents[axis])
    }

    pub fn max(&self) -> [f32; 3] {
        std::array::from_fn(|axis| self.center[axis] + self.half_extents[axis])
    }
}

/// Reads the accessor's declared `min`/`max` as a bounding box.
///
/// Returns `None` if either array is missing. Bounds of normalized accessors
/// are dequantized.
pub fn bounding_box(accessor: &Accessor) -> Option<BoundingBox> {
    let (min, max) = (accessor.min.as_ref()?, accessor.max.as_ref()?);
    let kind = ComponentKind::from_code(accessor.component_type).ok();
    let read = |values: &[f64]| -> [f32; 3] {
        std::array::from_fn(|axis| {
            let value = values.get(axis).copied().unwrap_or(0.0) as f32;
            match kind {
                Some(kind) if accessor.normalized => kind.dequantize(value),
                _ => value,
            }
        })
    };
    Some(BoundingBox::from_min_max(read(min), read(max)))
}
