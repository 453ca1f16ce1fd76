//! Span shaders: the per-pixel interpolation strategies of the rasterizer.
//!
//! The scan loop is fixed; what varies between the shading modes is the
//! state carried across a span and the work done per pixel. Each mode is a
//! small struct implementing [`SpanShader`], monomorphized into the scan
//! loop so the inner loop of every mode stays as tight as a hand-written
//! copy.
//!
//! All shaders receive their per-vertex inputs in the *rotated* edge order
//! produced by the setup code: vertex `i` is the one opposite edge `i`, so
//! edge value `c_i` is the (unnormalized) barycentric weight of vertex `i`.

use super::edge::EdgeSet;
use crate::color::{Color, RgbF};
use crate::image::ImageView;
use crate::math::Vec2;
use crate::render::rasterizer::RasterVertex;

pub(super) trait SpanShader<C: Color> {
    /// Start a new span whose first pixel has edge values `(c1, c2, c3)`.
    fn begin_span(&mut self, c1: i32, c2: i32, c3: i32);

    /// Color of the current pixel. `(c2, c3)` are the live edge values.
    fn shade(&mut self, c2: i32, c3: i32) -> C;

    /// Depth-test value of the current pixel (interpolated `w`).
    fn w(&self) -> f32;

    /// Advance the accumulators one pixel to the right.
    fn step_x(&mut self);
}

/// Screen-linear interpolation of the vertex `w` values, used for depth
/// testing in every mode (and for the perspective texture divide).
#[derive(Clone, Copy, Debug)]
pub(super) struct WPlane {
    fa: [f32; 3],
    dw: f32,
    cw: f32,
}

impl WPlane {
    pub(super) fn new(w: [f32; 3], inv_area: f32, edges: &EdgeSet) -> Self {
        let fa = [w[0] * inv_area, w[1] * inv_area, w[2] * inv_area];
        let dw = edges.dx[0] as f32 * fa[0]
            + edges.dx[1] as f32 * fa[1]
            + edges.dx[2] as f32 * fa[2];
        Self { fa, dw, cw: 0.0 }
    }

    #[inline]
    fn begin(&mut self, c1: i32, c2: i32, c3: i32) {
        self.cw = c1 as f32 * self.fa[0] + c2 as f32 * self.fa[1] + c3 as f32 * self.fa[2];
    }

    #[inline]
    fn step(&mut self) {
        self.cw += self.dw;
    }
}

/// Flat shading: one uniform color per triangle.
pub(super) struct FlatSpan<C> {
    col: C,
    wp: WPlane,
}

impl<C: Color> FlatSpan<C> {
    pub(super) fn new(face_color: RgbF, wp: WPlane) -> Self {
        Self {
            col: face_color.into(),
            wp,
        }
    }
}

impl<C: Color> SpanShader<C> for FlatSpan<C> {
    #[inline]
    fn begin_span(&mut self, c1: i32, c2: i32, c3: i32) {
        self.wp.begin(c1, c2, c3);
    }

    #[inline]
    fn shade(&mut self, _c2: i32, _c3: i32) -> C {
        self.col
    }

    #[inline]
    fn w(&self) -> f32 {
        self.wp.cw
    }

    #[inline]
    fn step_x(&mut self) {
        self.wp.step();
    }
}

/// Gouraud shading: barycentric blend of the three vertex colors, with the
/// edge values as weights.
pub(super) struct GouraudSpan<C> {
    col1: C,
    col2: C,
    col3: C,
    area: i32,
    wp: WPlane,
}

impl<C: Color> GouraudSpan<C> {
    pub(super) fn new(v: [&RasterVertex; 3], area: i32, wp: WPlane) -> Self {
        Self {
            col1: v[0].color.into(),
            col2: v[1].color.into(),
            col3: v[2].color.into(),
            area,
            wp,
        }
    }
}

impl<C: Color> SpanShader<C> for GouraudSpan<C> {
    #[inline]
    fn begin_span(&mut self, c1: i32, c2: i32, c3: i32) {
        self.wp.begin(c1, c2, c3);
    }

    #[inline]
    fn shade(&mut self, c2: i32, c3: i32) -> C {
        C::blend3(self.col2, c2, self.col3, c3, self.col1, self.area)
    }

    #[inline]
    fn w(&self) -> f32 {
        self.wp.cw
    }

    #[inline]
    fn step_x(&mut self) {
        self.wp.step();
    }
}

/// Interpolation state shared by the textured shaders: texture coordinates
/// premultiplied per vertex so that the inner loop only accumulates.
///
/// In perspective mode (`PERSP`) the vertex coordinates are scaled by
/// `w_i / area`; the running `(tx, ty)` then interpolate `T·w` and one
/// division by the interpolated `w` per pixel recovers the
/// perspective-correct coordinate. In orthographic mode the scale is
/// `1 / area` and no division happens.
struct TexPlane<'t, C> {
    tex: &'t [C],
    tex_stride: i32,
    mask_x: i32,
    mask_y: i32,
    t: [Vec2; 3],
    dtx: f32,
    dty: f32,
    tx: f32,
    ty: f32,
}

impl<'t, C: Color> TexPlane<'t, C> {
    fn new<const PERSP: bool>(
        texture: &ImageView<'t, C>,
        v: [&RasterVertex; 3],
        inv_area: f32,
        wp: &WPlane,
        edges: &EdgeSet,
    ) -> Self {
        let tw = texture.width();
        let th = texture.height();
        let scale = |i: usize| -> Vec2 {
            let s = if PERSP { wp.fa[i] } else { inv_area };
            Vec2::new(v[i].tex.x * s * tw as f32, v[i].tex.y * s * th as f32)
        };
        let t = [scale(0), scale(1), scale(2)];
        let dtx =
            t[0].x * edges.dx[0] as f32 + t[1].x * edges.dx[1] as f32 + t[2].x * edges.dx[2] as f32;
        let dty =
            t[0].y * edges.dx[0] as f32 + t[1].y * edges.dx[1] as f32 + t[2].y * edges.dx[2] as f32;
        Self {
            tex: texture.data(),
            tex_stride: texture.stride(),
            mask_x: tw - 1,
            mask_y: th - 1,
            t,
            dtx,
            dty,
            tx: 0.0,
            ty: 0.0,
        }
    }

    #[inline]
    fn begin(&mut self, c1: i32, c2: i32, c3: i32) {
        self.tx = self.t[0].x * c1 as f32 + self.t[1].x * c2 as f32 + self.t[2].x * c3 as f32;
        self.ty = self.t[0].y * c1 as f32 + self.t[1].y * c2 as f32 + self.t[2].y * c3 as f32;
    }

    /// Sample at the current accumulator position; `icw` is `1/w` in
    /// perspective mode and 1 in orthographic mode. Wrap-around is an
    /// integer mask, which is why texture dimensions must be powers of two.
    #[inline]
    fn texel(&self, icw: f32) -> C {
        let ttx = ((self.tx * icw) as i32) & self.mask_x;
        let tty = ((self.ty * icw) as i32) & self.mask_y;
        self.tex[(ttx + tty * self.tex_stride) as usize]
    }

    #[inline]
    fn step(&mut self) {
        self.tx += self.dtx;
        self.ty += self.dty;
    }
}

/// Texture mapping modulated by the uniform face color.
pub(super) struct FlatTexSpan<'t, C, const PERSP: bool> {
    plane: TexPlane<'t, C>,
    mr: i32,
    mg: i32,
    mb: i32,
    wp: WPlane,
}

impl<'t, C: Color, const PERSP: bool> FlatTexSpan<'t, C, PERSP> {
    pub(super) fn new(
        texture: &ImageView<'t, C>,
        face_color: RgbF,
        v: [&RasterVertex; 3],
        inv_area: f32,
        wp: WPlane,
        edges: &EdgeSet,
    ) -> Self {
        Self {
            plane: TexPlane::new::<PERSP>(texture, v, inv_area, &wp, edges),
            mr: (256.0 * face_color.r) as i32,
            mg: (256.0 * face_color.g) as i32,
            mb: (256.0 * face_color.b) as i32,
            wp,
        }
    }
}

impl<C: Color, const PERSP: bool> SpanShader<C> for FlatTexSpan<'_, C, PERSP> {
    #[inline]
    fn begin_span(&mut self, c1: i32, c2: i32, c3: i32) {
        self.wp.begin(c1, c2, c3);
        self.plane.begin(c1, c2, c3);
    }

    #[inline]
    fn shade(&mut self, _c2: i32, _c3: i32) -> C {
        let icw = if PERSP { 1.0 / self.wp.cw } else { 1.0 };
        let mut col = self.plane.texel(icw);
        col.mult256(self.mr, self.mg, self.mb);
        col
    }

    #[inline]
    fn w(&self) -> f32 {
        self.wp.cw
    }

    #[inline]
    fn step_x(&mut self) {
        self.wp.step();
        self.plane.step();
    }
}

/// Texture mapping modulated by Gouraud-interpolated vertex colors.
///
/// The vertex colors are carried as 8-bit fixed-point channel factors, with
/// per-pixel deltas relative to vertex 1 so the interpolation is two
/// multiply-adds and one division per channel.
pub(super) struct GouraudTexSpan<'t, C, const PERSP: bool> {
    plane: TexPlane<'t, C>,
    r1: i32,
    g1: i32,
    b1: i32,
    dr2: i32,
    dg2: i32,
    db2: i32,
    dr3: i32,
    dg3: i32,
    db3: i32,
    area: i32,
    wp: WPlane,
}

impl<'t, C: Color, const PERSP: bool> GouraudTexSpan<'t, C, PERSP> {
    pub(super) fn new(
        texture: &ImageView<'t, C>,
        v: [&RasterVertex; 3],
        area: i32,
        inv_area: f32,
        wp: WPlane,
        edges: &EdgeSet,
    ) -> Self {
        let f = |x: f32| (256.0 * x) as i32;
        let (c1, c2, c3) = (v[0].color, v[1].color, v[2].color);
        Self {
            plane: TexPlane::new::<PERSP>(texture, v, inv_area, &wp, edges),
            r1: f(c1.r),
            g1: f(c1.g),
            b1: f(c1.b),
            dr2: f(c2.r - c1.r),
            dg2: f(c2.g - c1.g),
            db2: f(c2.b - c1.b),
            dr3: f(c3.r - c1.r),
            dg3: f(c3.g - c1.g),
            db3: f(c3.b - c1.b),
            area,
            wp,
        }
    }
}

impl<C: Color, const PERSP: bool> SpanShader<C> for GouraudTexSpan<'_, C, PERSP> {
    #[inline]
    fn begin_span(&mut self, c1: i32, c2: i32, c3: i32) {
        self.wp.begin(c1, c2, c3);
        self.plane.begin(c1, c2, c3);
    }

    #[inline]
    fn shade(&mut self, c2: i32, c3: i32) -> C {
        let icw = if PERSP { 1.0 / self.wp.cw } else { 1.0 };
        let area = self.area as i64;
        let mix = |base: i32, d2: i32, d3: i32| {
            base + (((c2 as i64 * d2 as i64 + c3 as i64 * d3 as i64) / area) as i32)
        };
        let mut col = self.plane.texel(icw);
        col.mult256(
            mix(self.r1, self.dr2, self.dr3),
            mix(self.g1, self.dg2, self.dg3),
            mix(self.b1, self.db2, self.db3),
        );
        col
    }

    #[inline]
    fn w(&self) -> f32 {
        self.wp.cw
    }

    #[inline]
    fn step_x(&mut self) {
        self.wp.step();
        self.plane.step();
    }
}
