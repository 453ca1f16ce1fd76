use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rastly::math::{Vec2, Vec4};
use rastly::{
    rasterize_triangle, ImageView, ImageViewMut, Projection, RasterVertex, Rgb565, RgbF, Shader,
    Uniforms,
};

const LX: usize = 256;
const LY: usize = 256;

fn create_buffer() -> Vec<Rgb565> {
    vec![Rgb565::default(); LX * LY]
}

fn vertex(x: f32, y: f32, w: f32, color: RgbF, u: f32, v: f32) -> RasterVertex {
    RasterVertex {
        pos: Vec4::new(x, y, 0.0, w),
        color,
        tex: Vec2::new(u, v),
    }
}

fn small_triangle() -> [RasterVertex; 3] {
    [
        vertex(-0.1, -0.1, 1.0, RgbF::new(1.0, 0.0, 0.0), 0.0, 0.0),
        vertex(0.1, -0.1, 1.2, RgbF::new(0.0, 1.0, 0.0), 1.0, 0.0),
        vertex(0.0, 0.1, 1.4, RgbF::new(0.0, 0.0, 1.0), 0.0, 1.0),
    ]
}

fn medium_triangle() -> [RasterVertex; 3] {
    [
        vertex(-0.5, -0.5, 1.0, RgbF::new(1.0, 0.0, 0.0), 0.0, 0.0),
        vertex(0.5, -0.5, 1.5, RgbF::new(0.0, 1.0, 0.0), 1.0, 0.0),
        vertex(0.0, 0.5, 2.0, RgbF::new(0.0, 0.0, 1.0), 0.0, 1.0),
    ]
}

fn large_triangle() -> [RasterVertex; 3] {
    [
        vertex(-0.95, -0.95, 1.0, RgbF::new(1.0, 0.0, 0.0), 0.0, 0.0),
        vertex(0.95, -0.8, 1.5, RgbF::new(0.0, 1.0, 0.0), 1.0, 0.0),
        vertex(0.0, 0.95, 2.0, RgbF::new(0.0, 0.0, 1.0), 0.0, 1.0),
    ]
}

fn checkerboard() -> Vec<Rgb565> {
    (0..64 * 64)
        .map(|i| {
            if (i % 64 + i / 64) % 2 == 0 {
                Rgb565::from(RgbF::WHITE)
            } else {
                Rgb565::default()
            }
        })
        .collect()
}

fn benchmark_shading_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("shading_modes");

    let texels = checkerboard();

    for (name, tri) in [
        ("small", small_triangle()),
        ("medium", medium_triangle()),
        ("large", large_triangle()),
    ] {
        group.bench_with_input(BenchmarkId::new("flat", name), &tri, |b, tri| {
            let mut buffer = create_buffer();
            b.iter(|| {
                let mut img = ImageViewMut::new(&mut buffer, LX as i32, LY as i32);
                rasterize_triangle::<Rgb565, LX, LY>(
                    &mut img,
                    Shader::FLAT,
                    Projection::Perspective,
                    black_box(&tri[0]),
                    &tri[1],
                    &tri[2],
                    0,
                    0,
                    Uniforms::new(),
                );
            });
        });

        group.bench_with_input(BenchmarkId::new("gouraud", name), &tri, |b, tri| {
            let mut buffer = create_buffer();
            b.iter(|| {
                let mut img = ImageViewMut::new(&mut buffer, LX as i32, LY as i32);
                rasterize_triangle::<Rgb565, LX, LY>(
                    &mut img,
                    Shader::GOURAUD,
                    Projection::Perspective,
                    black_box(&tri[0]),
                    &tri[1],
                    &tri[2],
                    0,
                    0,
                    Uniforms::new(),
                );
            });
        });

        group.bench_with_input(BenchmarkId::new("texture", name), &tri, |b, tri| {
            let mut buffer = create_buffer();
            b.iter(|| {
                let mut img = ImageViewMut::new(&mut buffer, LX as i32, LY as i32);
                rasterize_triangle::<Rgb565, LX, LY>(
                    &mut img,
                    Shader::TEXTURE,
                    Projection::Perspective,
                    black_box(&tri[0]),
                    &tri[1],
                    &tri[2],
                    0,
                    0,
                    Uniforms {
                        face_color: RgbF::WHITE,
                        depth: None,
                        texture: Some(ImageView::new(&texels, 64, 64)),
                    },
                );
            });
        });
    }

    group.finish();
}

fn benchmark_depth_test(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth_test");

    let tri = large_triangle();

    group.bench_function("flat_zbuffer", |b| {
        let mut buffer = create_buffer();
        let mut zbuf = vec![0.0f32; LX * LY];
        b.iter(|| {
            let mut img = ImageViewMut::new(&mut buffer, LX as i32, LY as i32);
            rasterize_triangle::<Rgb565, LX, LY>(
                &mut img,
                Shader::FLAT,
                Projection::Perspective,
                black_box(&tri[0]),
                &tri[1],
                &tri[2],
                0,
                0,
                Uniforms {
                    face_color: RgbF::WHITE,
                    depth: Some(&mut zbuf),
                    texture: None,
                },
            );
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_shading_modes, benchmark_depth_test);
criterion_main!(benches);
