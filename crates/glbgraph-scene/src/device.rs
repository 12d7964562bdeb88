//! Graphics device abstraction.
//!
//! The builder never talks to a GPU directly. It asks a [`GraphicsDevice`]
//! for buffers sized for a [`VertexFormat`] or [`IndexFormat`], fills them
//! between `lock` and `unlock`, and keeps the handles.

use std::cell::Cell;
use std::fmt;

use glbgraph_core::ComponentKind;

/// Vertex attribute meaning, in canonical interleave order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semantic {
    Position,
    Normal,
    Tangent,
    Color,
    BlendIndices,
    BlendWeight,
    /// UV channel 0-7.
    TexCoord(u8),
}

impl Semantic {
    /// Maps a schema attribute name; `None` for names the builder ignores.
    pub fn from_attribute(name: &str) -> Option<Self> {
        let semantic = match name {
            "POSITION" => Semantic::Position,
            "NORMAL" => Semantic::Normal,
            "TANGENT" => Semantic::Tangent,
            "COLOR_0" => Semantic::Color,
            "JOINTS_0" => Semantic::BlendIndices,
            "WEIGHTS_0" => Semantic::BlendWeight,
            _ => {
                let channel: u8 = name.strip_prefix("TEXCOORD_")?.parse().ok()?;
                if channel > 7 {
                    return None;
                }
                Semantic::TexCoord(channel)
            }
        };
        Some(semantic)
    }

    /// Position in the interleaved vertex layout.
    pub fn order(self) -> u32 {
        match self {
            Semantic::Position => 0,
            Semantic::Normal => 1,
            Semantic::Tangent => 2,
            Semantic::Color => 3,
            Semantic::BlendIndices => 4,
            Semantic::BlendWeight => 5,
            Semantic::TexCoord(channel) => 6 + channel as u32,
        }
    }
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Semantic::Position => write!(f, "POSITION"),
            Semantic::Normal => write!(f, "NORMAL"),
            Semantic::Tangent => write!(f, "TANGENT"),
            Semantic::Color => write!(f, "COLOR"),
            Semantic::BlendIndices => write!(f, "BLENDINDICES"),
            Semantic::BlendWeight => write!(f, "BLENDWEIGHT"),
            Semantic::TexCoord(channel) => write!(f, "TEXCOORD{}", channel),
        }
    }
}

/// Requested vertex attribute before layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElementDesc {
    pub semantic: Semantic,
    pub components: usize,
    pub kind: ComponentKind,
    pub normalize: bool,
}

/// Vertex attribute placed inside an interleaved layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub semantic: Semantic,
    pub components: usize,
    pub kind: ComponentKind,
    pub normalize: bool,
    /// Byte offset within one vertex.
    pub offset: usize,
    /// Distance between vertices, equal to the format size.
    pub stride: usize,
    /// Unpadded size of the attribute data.
    pub size: usize,
}

/// Interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    pub elements: Vec<VertexElement>,
    /// Bytes per vertex.
    pub size: usize,
}

impl VertexFormat {
    /// Lays out `descs` in the given order, each element starting on a
    /// 4-byte boundary.
    pub fn interleaved(descs: &[VertexElementDesc]) -> Self {
        let mut offset = 0;
        let mut elements: Vec<VertexElement> = descs
            .iter()
            .map(|desc| {
                let size = desc.components * desc.kind.size();
                let element = VertexElement {
                    semantic: desc.semantic,
                    components: desc.components,
                    kind: desc.kind,
                    normalize: desc.normalize,
                    offset,
                    stride: 0,
                    size,
                };
                offset += size.next_multiple_of(4);
                element
            })
            .collect();
        for element in &mut elements {
            element.stride = offset;
        }
        Self {
            elements,
            size: offset,
        }
    }

    pub fn element(&self, semantic: Semantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }
}

/// Index element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U8,
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(self) -> usize {
        match self {
            IndexFormat::U8 => 1,
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// What the target device can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// 32-bit index buffers are addressable.
    pub u32_indices: bool,
    /// 8-bit index buffers are addressable.
    pub u8_indices: bool,
    /// Vertex elements must be 4-byte multiples; 3-component 8/16-bit
    /// attributes are widened to 4 components.
    pub aligned_vertex_elements: bool,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            u32_indices: true,
            u8_indices: true,
            aligned_vertex_elements: false,
        }
    }
}

impl DeviceCaps {
    /// Returns true if the device can fetch the element as described.
    pub fn supports_element(&self, desc: &VertexElementDesc) -> bool {
        !self.aligned_vertex_elements || (desc.components * desc.kind.size()) % 4 == 0
    }
}

/// Backing storage of a device buffer.
pub trait DeviceBuffer: fmt::Debug {
    /// Maps the buffer for writing.
    fn lock(&mut self) -> &mut [u8];

    /// Commits writes made since [`DeviceBuffer::lock`].
    fn unlock(&mut self);

    /// Bytes committed by the last unlock.
    fn contents(&self) -> &[u8];
}

/// Factory for device-resident buffers.
pub trait GraphicsDevice {
    fn caps(&self) -> DeviceCaps;

    fn create_vertex_buffer(
        &self,
        format: &VertexFormat,
        num_vertices: usize,
    ) -> Box<dyn DeviceBuffer>;

    fn create_index_buffer(&self, format: IndexFormat, num_indices: usize)
        -> Box<dyn DeviceBuffer>;
}

/// Vertex buffer handle.
#[derive(Debug)]
pub struct VertexBuffer {
    pub format: VertexFormat,
    pub num_vertices: usize,
    storage: Box<dyn DeviceBuffer>,
}

impl VertexBuffer {
    pub fn new(device: &dyn GraphicsDevice, format: VertexFormat, num_vertices: usize) -> Self {
        let storage = device.create_vertex_buffer(&format, num_vertices);
        Self {
            format,
            num_vertices,
            storage,
        }
    }

    pub fn lock(&mut self) -> &mut [u8] {
        self.storage.lock()
    }

    pub fn unlock(&mut self) {
        self.storage.unlock()
    }

    pub fn contents(&self) -> &[u8] {
        self.storage.contents()
    }
}

/// Index buffer handle.
#[derive(Debug)]
pub struct IndexBuffer {
    pub format: IndexFormat,
    pub num_indices: usize,
    storage: Box<dyn DeviceBuffer>,
}

impl IndexBuffer {
    pub fn new(device: &dyn GraphicsDevice, format: IndexFormat, num_indices: usize) -> Self {
        let storage = device.create_index_buffer(format, num_indices);
        Self {
            format,
            num_indices,
            storage,
        }
    }

    /// Creates the buffer and fills it with `indices` narrowed to `format`.
    pub fn with_indices(device: &dyn GraphicsDevice, format: IndexFormat, indices: &[u32]) -> Self {
        let mut buffer = Self::new(device, format, indices.len());
        let data = buffer.lock();
        for (i, &index) in indices.iter().enumerate() {
            match format {
                IndexFormat::U8 => data[i] = index as u8,
                IndexFormat::U16 => {
                    data[i * 2..i * 2 + 2].copy_from_slice(&(index as u16).to_le_bytes())
                }
                IndexFormat::U32 => data[i * 4..i * 4 + 4].copy_from_slice(&index.to_le_bytes()),
            }
        }
        buffer.unlock();
        buffer
    }

    pub fn lock(&mut self) -> &mut [u8] {
        self.storage.lock()
    }

    pub fn unlock(&mut self) {
        self.storage.unlock()
    }

    pub fn contents(&self) -> &[u8] {
        self.storage.contents()
    }

    /// Reads the indices back as `u32`.
    pub fn indices(&self) -> Vec<u32> {
        let data = self.contents();
        match self.format {
            IndexFormat::U8 => data.iter().map(|&i| i as u32).collect(),
            IndexFormat::U16 => data
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]) as u32)
                .collect(),
            IndexFormat::U32 => data
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }
    }
}

/// Heap-backed buffer with a staging copy while locked.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    committed: Vec<u8>,
    staging: Option<Vec<u8>>,
}

impl MemoryBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            committed: vec![0; size],
            staging: None,
        }
    }
}

impl DeviceBuffer for MemoryBuffer {
    fn lock(&mut self) -> &mut [u8] {
        let committed = &self.committed;
        self.staging.get_or_insert_with(|| committed.clone())
    }

    fn unlock(&mut self) {
        if let Some(staging) = self.staging.take() {
            self.committed = staging;
        }
    }

    fn contents(&self) -> &[u8] {
        &self.committed
    }
}

/// Device that keeps every buffer in host memory.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    caps: DeviceCaps,
    allocated: Cell<usize>,
}

impl MemoryDevice {
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            caps,
            allocated: Cell::new(0),
        }
    }

    /// Total bytes handed out so far.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.get()
    }

    fn allocate(&self, size: usize) -> Box<dyn DeviceBuffer> {
        self.allocated.set(self.allocated.get() + size);
        Box::new(MemoryBuffer::new(size))
    }
}

impl GraphicsDevice for MemoryDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_vertex_buffer(
        &self,
        format: &VertexFormat,
        num_vertices: usize,
    ) -> Box<dyn DeviceBuffer> {
        self.allocate(format.size * num_vertices)
    }

    fn create_index_buffer(
        &self,
        format: IndexFormat,
        num_indices: usize,
    ) -> Box<dyn DeviceBuffer> {
        self.allocate(format.size() * num_indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_mapping() {
        assert_eq!(Semantic::from_attribute("POSITION"), Some(Semantic::Position));
        assert_eq!(Semantic::from_attribute("TEXCOORD_7"), Some(Semantic::TexCoord(7)));
        assert_eq!(Semantic::from_attribute("TEXCOORD_8"), None);
        assert_eq!(Semantic::from_attribute("COLOR_1"), None);
        assert_eq!(Semantic::from_attribute("_CUSTOM"), None);
        assert!(Semantic::Color.order() < Semantic::TexCoord(0).order());
    }

    #[test]
    fn test_interleaved_layout_rounds_to_four() {
        let format = VertexFormat::interleaved(&[
            VertexElementDesc {
                semantic: Semantic::Position,
                components: 3,
                kind: ComponentKind::F32,
                normalize: false,
            },
            VertexElementDesc {
                semantic: Semantic::Color,
                components: 3,
                kind: ComponentKind::U8,
                normalize: true,
            },
            VertexElementDesc {
                semantic: Semantic::TexCoord(0),
                components: 2,
                kind: ComponentKind::U16,
                normalize: true,
            },
        ]);
        assert_eq!(format.size, 20);
        let color = format.element(Semantic::Color).unwrap();
        assert_eq!((color.offset, color.size, color.stride), (12, 3, 20));
        assert_eq!(format.element(Semantic::TexCoord(0)).unwrap().offset, 16);
    }

    #[test]
    fn test_supports_element() {
        let desc = VertexElementDesc {
            semantic: Semantic::Normal,
            components: 3,
            kind: ComponentKind::I16,
            normalize: true,
        };
        assert!(DeviceCaps::default().supports_element(&desc));
        let aligned = DeviceCaps {
            aligned_vertex_elements: true,
            ..DeviceCaps::default()
        };
        assert!(!aligned.supports_element(&desc));
    }

    #[test]
    fn test_memory_buffer_lock_unlock() {
        let device = MemoryDevice::default();
        let mut buffer = IndexBuffer::new(&device, IndexFormat::U16, 2);
        buffer.lock().copy_from_slice(&[1, 0, 2, 0]);
        assert_eq!(buffer.contents(), &[0, 0, 0, 0]);
        buffer.unlock();
        assert_eq!(buffer.indices(), vec![1, 2]);
        assert_eq!(device.allocated_bytes(), 4);
    }

    #[test]
    fn test_index_narrowing() {
        let device = MemoryDevice::default();
        let buffer = IndexBuffer::with_indices(&device, IndexFormat::U8, &[0, 1, 255]);
        assert_eq!(buffer.contents(), &[0, 1, 255]);
    }
}
