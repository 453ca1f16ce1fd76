//! Sub-pixel-accurate triangle rasterizer.
//!
//! [`rasterize_triangle`] draws one projected triangle into an image view.
//! Vertices arrive in normalized device coordinates with the viewport
//! `[0, LX) x [0, LY)` mapped to `[-1, 1]^2`; they are snapped to a grid
//! with 8 fractional bits and filled with three integer edge functions under
//! the top-left rule, so triangles sharing an edge rasterize it exactly once
//! (no cracks, no double writes).
//!
//! The image may be smaller than the viewport: `(offset_x, offset_y)` place
//! it inside the viewport and only the covered intersection is touched,
//! which allows rendering a large logical viewport through a small buffer
//! tile by tile (the same triangles submitted once per tile).
//!
//! Winding is normalized internally; back-face culling belongs to the
//! renderer, not here. Failure is always silent: an empty intersection, a
//! degenerate triangle or an unreachable row simply draw nothing.

mod edge;
mod scanline;
mod shader;

use bitflags::bitflags;

use self::edge::{edge_init, EdgeSet, SUBPIXEL, SUBPIXEL_HALF};
use self::scanline::scan;
use self::shader::{FlatSpan, FlatTexSpan, GouraudSpan, GouraudTexSpan, WPlane};
use crate::color::{Color, RgbF};
use crate::image::{ImageView, ImageViewMut};
use crate::math::{Vec2, Vec4};
use crate::render::Projection;

bitflags! {
    /// Shading mode of a draw. The flags combine: an empty set is flat
    /// shading, `GOURAUD | TEXTURE` is lit texture mapping.
    pub struct Shader: u8 {
        /// Uniform face color (the default when no flag is set).
        const FLAT = 0;
        /// Interpolate the three vertex colors across the triangle.
        const GOURAUD = 1;
        /// Sample a texture; vertex colors (or the face color) modulate the
        /// texels. Texture dimensions must be powers of two.
        const TEXTURE = 2;
    }
}

/// Per-vertex rasterizer input ("varying" attributes).
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterVertex {
    /// Projected position: `(x, y, z)` in NDC. The meaning of `w` depends on
    /// the projection mode: `1/z_eye` for perspective, `2 - z_ndc` for
    /// orthographic. Either way it grows toward the camera.
    pub pos: Vec4,
    /// Vertex color (Gouraud), or vertex light intensity when texturing.
    pub color: RgbF,
    /// Texture coordinates, normalized to `[0, 1]` per wrap period.
    pub tex: Vec2,
}

/// Per-draw rasterizer input ("uniform" parameters).
///
/// Depth testing is enabled by supplying `depth`: a slice covering the
/// target image extent, indexed with the *image* stride and the same offsets
/// as the pixel writes. The stored values compare as "greater is closer".
pub struct Uniforms<'u, C: Color> {
    /// Face color for flat shading; also the texel modulation factors for
    /// flat textured shading.
    pub face_color: RgbF,
    /// Depth buffer, if depth testing is wanted.
    pub depth: Option<&'u mut [f32]>,
    /// Texture image; required for the `TEXTURE` shader bit to take effect.
    pub texture: Option<ImageView<'u, C>>,
}

impl<C: Color> Uniforms<'_, C> {
    pub fn new() -> Self {
        Uniforms {
            face_color: RgbF::WHITE,
            depth: None,
            texture: None,
        }
    }
}

impl<C: Color> Default for Uniforms<'_, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Viewport dimensions are validated at monomorphization time: 2048 is the
/// largest size for which the 64-bit edge products cannot overflow with
/// 8 sub-pixel bits.
struct ViewportCheck<const LX: usize, const LY: usize>;

impl<const LX: usize, const LY: usize> ViewportCheck<LX, LY> {
    const VALID: () = assert!(
        LX >= 1 && LX <= 2048 && LY >= 1 && LY <= 2048,
        "viewport dimensions must lie in [1, 2048]"
    );
}

/// Rasterize one triangle into `img`.
///
/// `v0, v1, v2` are the projected vertices; their `(x, y)` should stay in a
/// safe range around the viewport (the renderer's clip test guarantees
/// `|coord| <= 2048 / max(LX, LY)`), but need not be inside it.
/// `(offset_x, offset_y)` position the image inside the viewport.
pub fn rasterize_triangle<C: Color, const LX: usize, const LY: usize>(
    img: &mut ImageViewMut<'_, C>,
    shader: Shader,
    projection: Projection,
    v0: &RasterVertex,
    v1: &RasterVertex,
    v2: &RasterVertex,
    offset_x: i32,
    offset_y: i32,
    uniforms: Uniforms<'_, C>,
) {
    let () = ViewportCheck::<LX, LY>::VALID;

    if !img.is_valid() {
        return;
    }

    let half_lx = (LX as i32) * SUBPIXEL_HALF;
    let half_ly = (LY as i32) * SUBPIXEL_HALF;
    let mx = half_lx as f32;
    let my = half_ly as f32;

    // snap to the sub-pixel grid
    let p0 = (
        (v0.pos.x * mx).floor() as i32,
        (v0.pos.y * my).floor() as i32,
    );
    let sp1 = (
        (v1.pos.x * mx).floor() as i32,
        (v1.pos.y * my).floor() as i32,
    );
    let sp2 = (
        (v2.pos.x * mx).floor() as i32,
        (v2.pos.y * my).floor() as i32,
    );

    // triangle bounding box in pixel units (true division, the operands can
    // be negative)
    let xmin = (p0.0.min(sp1.0).min(sp2.0) + half_lx) / SUBPIXEL;
    let xmax = (p0.0.max(sp1.0).max(sp2.0) + half_lx) / SUBPIXEL;
    let ymin = (p0.1.min(sp1.1).min(sp2.1) + half_ly) / SUBPIXEL;
    let ymax = (p0.1.max(sp1.1).max(sp2.1) + half_ly) / SUBPIXEL;

    // intersect the image rectangle with the bounding box
    let mut sx = img.width();
    let mut sy = img.height();
    let mut ox = offset_x;
    let mut oy = offset_y;
    if ox < xmin {
        sx -= xmin - ox;
        ox = xmin;
    }
    if ox + sx > xmax {
        sx = xmax - ox + 1;
    }
    if sx <= 0 {
        return;
    }
    if oy < ymin {
        sy -= ymin - oy;
        oy = ymin;
    }
    if oy + sy > ymax {
        sy = ymax - oy + 1;
    }
    if sy <= 0 {
        return;
    }

    // signed area in sub-pixel units; zero means degenerate
    let a = (sp2.0 - p0.0) as i64 * (sp1.1 - p0.1) as i64
        - (sp2.1 - p0.1) as i64 * (sp1.0 - p0.0) as i64;
    if a == 0 {
        return;
    }

    // normalize the winding by swapping the second and third vertex
    let (f1, f2, p1, p2) = if a > 0 {
        (v1, v2, sp1, sp2)
    } else {
        (v2, v1, sp2, sp1)
    };

    // sub-pixel position of the first scanned pixel center
    let us = ox * SUBPIXEL - half_lx + SUBPIXEL_HALF;
    let vs = oy * SUBPIXEL - half_ly + SUBPIXEL_HALF;

    // from here on the offsets are image-relative
    let mut ox = ox - offset_x;
    let mut oy = oy - offset_y;

    let (dx1, dy1, mut o1) = edge_init(p0, p1, us, vs);
    let (dx2, dy2, mut o2) = edge_init(p1, p2, us, vs);
    let (dx3, dy3, mut o3) = edge_init(p2, p0, us, vs);

    // collapsed intersection: the scan loop cannot advance in the collapsed
    // direction, so walk to the first covered pixel up front
    if sx == 1 {
        while (o1 | o2 | o3) < 0 && sy > 0 {
            sy -= 1;
            oy += 1;
            o1 += dy1;
            o2 += dy2;
            o3 += dy3;
        }
        if sy == 0 {
            return;
        }
    } else if sy == 1 {
        while (o1 | o2 | o3) < 0 && sx > 0 {
            sx -= 1;
            ox += 1;
            o1 += dx1;
            o2 += dx2;
            o3 += dx3;
        }
        if sx == 0 {
            return;
        }
    }

    // rotate the edge slots so edge 0 has dx > 0 (at least one does, or the
    // triangle would be degenerate). Each edge carries the vertex opposite
    // to it: the edge value is that vertex's barycentric weight.
    let (edges, pa, pb, pc) = if dx1 > 0 {
        (
            EdgeSet {
                dx: [dx1, dx2, dx3],
                dy: [dy1, dy2, dy3],
                o: [o1, o2, o3],
            },
            f2,
            v0,
            f1,
        )
    } else if dx2 > 0 {
        (
            EdgeSet {
                dx: [dx2, dx3, dx1],
                dy: [dy2, dy3, dy1],
                o: [o2, o3, o1],
            },
            v0,
            f1,
            f2,
        )
    } else {
        (
            EdgeSet {
                dx: [dx3, dx1, dx2],
                dy: [dy3, dy1, dy2],
                o: [o3, o1, o2],
            },
            f1,
            f2,
            v0,
        )
    };

    let stride = img.stride();
    let start = ox + stride * oy;

    let Uniforms {
        face_color,
        depth,
        texture,
    } = uniforms;

    let texture = if shader.contains(Shader::TEXTURE) {
        texture.filter(|t| t.is_valid())
    } else {
        None
    };
    let gouraud = shader.contains(Shader::GOURAUD);
    let persp = projection == Projection::Perspective;

    let extent = ((img.height() - 1) * stride + img.width()) as usize;
    let buf = img.pixels_mut();
    match depth {
        Some(zbuf) => {
            if zbuf.len() < extent {
                // cannot depth-test safely; the renderer validates this
                // before drawing, so only direct misuse lands here
                return;
            }
            dispatch::<C, true>(
                buf,
                zbuf,
                start,
                stride,
                sx,
                sy,
                edges,
                gouraud,
                persp,
                face_color,
                texture.as_ref(),
                [pa, pb, pc],
            );
        }
        None => dispatch::<C, false>(
            buf,
            &mut [],
            start,
            stride,
            sx,
            sy,
            edges,
            gouraud,
            persp,
            face_color,
            texture.as_ref(),
            [pa, pb, pc],
        ),
    }
}

/// Select the span shader and run the scan loop. One instantiation per
/// (shading mode, projection, depth) cell.
#[allow(clippy::too_many_arguments)]
fn dispatch<C: Color, const DEPTH: bool>(
    buf: &mut [C],
    zbuf: &mut [f32],
    start: i32,
    stride: i32,
    sx: i32,
    sy: i32,
    edges: EdgeSet,
    gouraud: bool,
    persp: bool,
    face_color: RgbF,
    texture: Option<&ImageView<'_, C>>,
    v: [&RasterVertex; 3],
) {
    let area = edges.area();
    if gouraud && area == 0 {
        // the color interpolators divide by the pixel-unit area, which can
        // collapse to zero for sub-pixel slivers
        return;
    }
    let inv_area = 1.0 / area as f32;
    let wp = WPlane::new([v[0].pos.w, v[1].pos.w, v[2].pos.w], inv_area, &edges);

    match (texture, gouraud) {
        (None, false) => {
            let mut s = FlatSpan::new(face_color, wp);
            scan::<C, _, DEPTH>(buf, zbuf, start, stride, sx, sy, edges, &mut s);
        }
        (None, true) => {
            let mut s = GouraudSpan::new(v, area, wp);
            scan::<C, _, DEPTH>(buf, zbuf, start, stride, sx, sy, edges, &mut s);
        }
        (Some(tex), false) => {
            if persp {
                let mut s = FlatTexSpan::<'_, C, true>::new(tex, face_color, v, inv_area, wp, &edges);
                scan::<C, _, DEPTH>(buf, zbuf, start, stride, sx, sy, edges, &mut s);
            } else {
                let mut s =
                    FlatTexSpan::<'_, C, false>::new(tex, face_color, v, inv_area, wp, &edges);
                scan::<C, _, DEPTH>(buf, zbuf, start, stride, sx, sy, edges, &mut s);
            }
        }
        (Some(tex), true) => {
            if persp {
                let mut s = GouraudTexSpan::<'_, C, true>::new(tex, v, area, inv_area, wp, &edges);
                scan::<C, _, DEPTH>(buf, zbuf, start, stride, sx, sy, edges, &mut s);
            } else {
                let mut s = GouraudTexSpan::<'_, C, false>::new(tex, v, area, inv_area, wp, &edges);
                scan::<C, _, DEPTH>(buf, zbuf, start, stride, sx, sy, edges, &mut s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb888;

    const RED: RgbF = RgbF::new(1.0, 0.0, 0.0);
    const BLUE: RgbF = RgbF::new(0.0, 0.0, 1.0);

    fn vtx(x: f32, y: f32) -> RasterVertex {
        RasterVertex {
            pos: Vec4::new(x, y, 0.0, 1.0),
            ..Default::default()
        }
    }

    fn vtx_w(x: f32, y: f32, w: f32) -> RasterVertex {
        RasterVertex {
            pos: Vec4::new(x, y, 0.0, w),
            ..Default::default()
        }
    }

    fn flat_uniforms<'u>(color: RgbF) -> Uniforms<'u, Rgb888> {
        Uniforms {
            face_color: color,
            depth: None,
            texture: None,
        }
    }

    fn draw_flat(
        buf: &mut [Rgb888; 16],
        color: RgbF,
        v0: RasterVertex,
        v1: RasterVertex,
        v2: RasterVertex,
    ) {
        let mut img = ImageViewMut::new(&mut buf[..], 4, 4);
        rasterize_triangle::<Rgb888, 4, 4>(
            &mut img,
            Shader::FLAT,
            Projection::Orthographic,
            &v0,
            &v1,
            &v2,
            0,
            0,
            flat_uniforms(color),
        );
    }

    fn lit_pixels(buf: &[Rgb888; 16], color: Rgb888) -> Vec<(i32, i32)> {
        (0..16)
            .filter(|i| buf[*i as usize] == color)
            .map(|i| (i % 4, i / 4))
            .collect()
    }

    #[test]
    fn test_half_square_pixel_set() {
        let mut buf = [Rgb888::default(); 16];
        draw_flat(&mut buf, RED, vtx(-1.0, -1.0), vtx(1.0, -1.0), vtx(-1.0, 1.0));
        // Pixel centers exactly on the hypotenuse belong to the triangle on
        // the other side of it (top-left rule), so the covered set is the
        // strict interior.
        assert_eq!(
            lit_pixels(&buf, RED.into()),
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (0, 2)]
        );
    }

    #[test]
    fn test_shared_edge_tiles_exactly() {
        // Two triangles tiling the full square: every pixel is written by
        // exactly one of them, the diagonal belonging to the second.
        let mut buf = [Rgb888::default(); 16];
        draw_flat(&mut buf, RED, vtx(-1.0, -1.0), vtx(1.0, -1.0), vtx(-1.0, 1.0));
        draw_flat(&mut buf, BLUE, vtx(1.0, -1.0), vtx(-1.0, 1.0), vtx(1.0, 1.0));

        let red = lit_pixels(&buf, RED.into());
        let blue = lit_pixels(&buf, BLUE.into());
        assert_eq!(red.len(), 6);
        assert_eq!(blue.len(), 10);
        assert!(buf.iter().all(|p| *p == RED.into() || *p == BLUE.into()));

        // Same tiling with the draw order reversed: the partition must not
        // change (no pixel is contested).
        let mut buf2 = [Rgb888::default(); 16];
        draw_flat(&mut buf2, BLUE, vtx(1.0, -1.0), vtx(-1.0, 1.0), vtx(1.0, 1.0));
        draw_flat(&mut buf2, RED, vtx(-1.0, -1.0), vtx(1.0, -1.0), vtx(-1.0, 1.0));
        assert_eq!(buf, buf2);
    }

    #[test]
    fn test_winding_is_normalized() {
        let mut a = [Rgb888::default(); 16];
        let mut b = [Rgb888::default(); 16];
        draw_flat(&mut a, RED, vtx(-1.0, -1.0), vtx(1.0, -1.0), vtx(-1.0, 1.0));
        draw_flat(&mut b, RED, vtx(-1.0, -1.0), vtx(-1.0, 1.0), vtx(1.0, -1.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_triangle_dropped() {
        let mut buf = [Rgb888::default(); 16];
        draw_flat(&mut buf, RED, vtx(-1.0, -1.0), vtx(0.0, 0.0), vtx(1.0, 1.0));
        assert_eq!(lit_pixels(&buf, RED.into()), vec![]);
    }

    #[test]
    fn test_outside_image_intersection_empty() {
        let mut buf = [Rgb888::default(); 16];
        // entirely right of the viewport window covered by the image
        draw_flat(&mut buf, RED, vtx(2.0, -1.0), vtx(3.0, -1.0), vtx(2.0, 1.0));
        assert_eq!(lit_pixels(&buf, RED.into()), vec![]);
    }

    // triangle large enough to cover the whole 2x2 viewport, with constant w
    fn draw_cover(buf: &mut [Rgb888; 4], zbuf: &mut [f32; 4], color: RgbF, w: f32) {
        let mut img = ImageViewMut::new(&mut buf[..], 2, 2);
        rasterize_triangle::<Rgb888, 2, 2>(
            &mut img,
            Shader::FLAT,
            Projection::Orthographic,
            &vtx_w(-1.0, -1.0, w),
            &vtx_w(3.0, -1.0, w),
            &vtx_w(-1.0, 3.0, w),
            0,
            0,
            Uniforms {
                face_color: color,
                depth: Some(&mut zbuf[..]),
                texture: None,
            },
        );
    }

    #[test]
    fn test_depth_test_closer_is_larger() {
        let mut buf = [Rgb888::default(); 4];
        let mut zbuf = [0.0f32; 4];

        draw_cover(&mut buf, &mut zbuf, RED, 0.3);
        assert!(buf.iter().all(|p| *p == RED.into()));
        assert!(zbuf.iter().all(|z| (*z - 0.3).abs() < 1e-4));

        // nearer draw wins
        draw_cover(&mut buf, &mut zbuf, BLUE, 0.7);
        assert!(buf.iter().all(|p| *p == BLUE.into()));
        assert!(zbuf.iter().all(|z| (*z - 0.7).abs() < 1e-4));

        // farther draw leaves everything untouched
        draw_cover(&mut buf, &mut zbuf, RED, 0.3);
        assert!(buf.iter().all(|p| *p == BLUE.into()));
        assert!(zbuf.iter().all(|z| (*z - 0.7).abs() < 1e-4));
    }

    #[test]
    fn test_gouraud_vertex_colors_reach_corners() {
        let mut buf = [Rgb888::default(); 64];
        let mut img = ImageViewMut::new(&mut buf[..], 8, 8);
        let mut v0 = vtx(-1.0, -1.0);
        let mut v1 = vtx(1.0, -1.0);
        let mut v2 = vtx(-1.0, 1.0);
        v0.color = RgbF::new(1.0, 0.0, 0.0);
        v1.color = RgbF::new(0.0, 1.0, 0.0);
        v2.color = RgbF::new(0.0, 0.0, 1.0);
        rasterize_triangle::<Rgb888, 8, 8>(
            &mut img,
            Shader::GOURAUD,
            Projection::Orthographic,
            &v0,
            &v1,
            &v2,
            0,
            0,
            Uniforms::new(),
        );
        // corner pixels sit closest to one vertex each
        let at = |x: usize, y: usize| buf[y * 8 + x];
        assert!(at(0, 0).r > 200 && at(0, 0).g < 40 && at(0, 0).b < 40);
        assert!(at(6, 0).g > 150 && at(6, 0).r < 80);
        assert!(at(0, 6).b > 150 && at(0, 6).r < 80);
    }

    #[test]
    fn test_texture_ortho_maps_texels_to_pixels() {
        // 4x4 texture, 4x4 viewport, texcoords spanning [0,1]: the covered
        // half must reproduce the texture texel for texel.
        let texels: Vec<Rgb888> = (0..16).map(|i| Rgb888::new(i as u8, 0, 0)).collect();
        let tex = ImageView::new(&texels, 4, 4);

        let mut buf = [Rgb888::new(99, 99, 99); 16];
        let mut img = ImageViewMut::new(&mut buf[..], 4, 4);
        let mut v0 = vtx(-1.0, -1.0);
        let mut v1 = vtx(1.0, -1.0);
        let mut v2 = vtx(-1.0, 1.0);
        v0.tex = Vec2::new(0.0, 0.0);
        v1.tex = Vec2::new(1.0, 0.0);
        v2.tex = Vec2::new(0.0, 1.0);
        rasterize_triangle::<Rgb888, 4, 4>(
            &mut img,
            Shader::TEXTURE,
            Projection::Orthographic,
            &v0,
            &v1,
            &v2,
            0,
            0,
            Uniforms {
                face_color: RgbF::WHITE,
                depth: None,
                texture: Some(tex),
            },
        );
        for (x, y) in [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (0, 2)] {
            assert_eq!(buf[y * 4 + x], texels[y * 4 + x], "pixel ({x},{y})");
        }
        assert_eq!(buf[15], Rgb888::new(99, 99, 99)); // untouched corner
    }

    #[test]
    fn test_texture_wraps_power_of_two() {
        // 2x2 checkerboard sampled over [0,2]^2: the pattern tiles.
        let w = Rgb888::new(255, 255, 255);
        let k = Rgb888::new(0, 0, 0);
        let texels = [w, k, k, w];
        let tex = ImageView::new(&texels, 2, 2);

        let mut buf = [Rgb888::new(99, 99, 99); 16];
        let mut img = ImageViewMut::new(&mut buf[..], 4, 4);
        let mut v0 = vtx(-1.0, -1.0);
        let mut v1 = vtx(1.0, -1.0);
        let mut v2 = vtx(-1.0, 1.0);
        v0.tex = Vec2::new(0.0, 0.0);
        v1.tex = Vec2::new(2.0, 0.0);
        v2.tex = Vec2::new(0.0, 2.0);
        rasterize_triangle::<Rgb888, 4, 4>(
            &mut img,
            Shader::TEXTURE,
            Projection::Orthographic,
            &v0,
            &v1,
            &v2,
            0,
            0,
            Uniforms {
                face_color: RgbF::WHITE,
                depth: None,
                texture: Some(tex),
            },
        );
        // one viewport pixel per texel, pattern repeated twice per axis
        for (x, y) in [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (0, 2)] {
            let expect = if (x + y) % 2 == 0 { w } else { k };
            assert_eq!(buf[y * 4 + x], expect, "pixel ({x},{y})");
        }
    }

    #[test]
    fn test_tile_rendering_matches_single_image() {
        let tri = (vtx(-0.6, -0.8), vtx(0.9, -0.1), vtx(-0.2, 0.9));

        // reference: one 4x4 image at offset (0,0)
        let mut whole = [Rgb888::default(); 16];
        {
            let mut img = ImageViewMut::new(&mut whole[..], 4, 4);
            rasterize_triangle::<Rgb888, 4, 4>(
                &mut img,
                Shader::FLAT,
                Projection::Orthographic,
                &tri.0,
                &tri.1,
                &tri.2,
                0,
                0,
                flat_uniforms(RED),
            );
        }

        // tiles: two 2x4 images at offsets (0,0) and (2,0)
        let mut tiled = [Rgb888::default(); 16];
        for tile in 0..2 {
            let mut half = [Rgb888::default(); 8];
            let mut img = ImageViewMut::new(&mut half[..], 2, 4);
            rasterize_triangle::<Rgb888, 4, 4>(
                &mut img,
                Shader::FLAT,
                Projection::Orthographic,
                &tri.0,
                &tri.1,
                &tri.2,
                tile * 2,
                0,
                flat_uniforms(RED),
            );
            for y in 0..4 {
                for x in 0..2 {
                    tiled[y * 4 + (tile as usize * 2 + x)] = half[y * 2 + x];
                }
            }
        }
        assert_eq!(whole, tiled);
    }
}
