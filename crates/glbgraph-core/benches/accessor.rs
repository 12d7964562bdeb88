use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glbgraph_core::accessor::{extract, ViewData};
use glbgraph_core::schema::Accessor;
use glbgraph_core::ElementType;

const VERTICES: usize = 10_000;

fn accessor(component_type: u32, element_type: ElementType, byte_offset: usize) -> Accessor {
    Accessor {
        buffer_view: Some(0),
        byte_offset,
        component_type,
        normalized: component_type != 5126,
        count: VERTICES,
        element_type,
        min: None,
        max: None,
        sparse: None,
        name: None,
    }
}

fn bench_extract(c: &mut Criterion) {
    // Interleaved position (3 x f32) + uv (2 x u16) + padding = 20 bytes.
    let bytes: Vec<u8> = (0..VERTICES * 20).map(|i| i as u8).collect();
    let views = [ViewData {
        buffer: 0,
        byte_offset: 0,
        bytes: &bytes,
        byte_stride: Some(20),
    }];
    let position = accessor(5126, ElementType::Vec3, 0);
    let uv = accessor(5123, ElementType::Vec2, 12);

    c.bench_function("extract strided borrow", |b| {
        b.iter(|| extract(black_box(&position), &views, false))
    });
    c.bench_function("extract strided flatten", |b| {
        b.iter(|| extract(black_box(&position), &views, true))
    });
    c.bench_function("dequantize uv", |b| {
        b.iter(|| {
            extract(black_box(&uv), &views, true)
                .map(|view| view.to_float32(true).to_vec::<f32>())
        })
    });
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
