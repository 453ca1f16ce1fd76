//! Per-mesh pipeline driver: vertex transformation, lighting, culling and
//! rasterizer dispatch.
//!
//! The renderer owns no pixels. The caller binds an image view (and
//! optionally a depth buffer), sets the projection / view / model matrices
//! and the light parameters, then calls [`Renderer::draw`] per mesh. A draw
//! is self-contained; only the bound buffers and matrices persist between
//! calls, and the depth buffer is deliberately *not* cleared so multiple
//! meshes compose into one frame ([`Renderer::clear_depth`] starts a new
//! one).
//!
//! The viewport `(LX, LY)` is fixed at compile time, up to 2048x2048. The
//! bound image may be smaller than the viewport; [`Renderer::set_offset`]
//! positions it, enabling tile rendering of a large logical viewport
//! through a small buffer.

use std::error::Error;
use std::fmt;

use log::{debug, trace};

use crate::color::{Color, RgbF};
use crate::image::ImageViewMut;
use crate::math::{Mat4, Vec2, Vec3, Vec4};
use crate::mesh::{Box3, FaceCursor, Material, Mesh};
use crate::render::rasterizer::{rasterize_triangle, RasterVertex, Shader, Uniforms};
use crate::render::Projection;

/// Why a draw call was rejected. No pixel is touched when `draw` fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawError {
    /// No image view is bound, or the bound view is invalid.
    NoImage,
    /// Depth testing is enabled but the depth buffer is missing or shorter
    /// than the viewport (or image) requires.
    DepthBuffer,
    /// A mesh in the chain has no vertex array.
    EmptyMesh,
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawError::NoImage => write!(f, "no valid image view is bound"),
            DrawError::DepthBuffer => {
                write!(f, "depth test enabled but the depth buffer is missing or too small")
            }
            DrawError::EmptyMesh => write!(f, "mesh has no vertices"),
        }
    }
}

impl Error for DrawError {}

const MAX_OFFSET: i32 = 2048;

/// Entries of the specular power table; the specular term is evaluated by
/// linear interpolation in this table instead of a per-vertex `powf`.
const POW_TABLE_LEN: usize = 12;

/// The 3D renderer. `C` is the pixel format, `(LX, LY)` the fixed viewport.
pub struct Renderer<'a, C: Color, const LX: usize, const LY: usize> {
    image: Option<ImageViewMut<'a, C>>,
    zbuffer: Option<&'a mut [f32]>,
    depth_test: bool,
    projection: Projection,
    backface_culling: bool,
    offset: (i32, i32),

    proj: Mat4,
    view: Mat4,
    model: Mat4,

    light_dir: Vec3,
    ambient_color: RgbF,
    diffuse_color: RgbF,
    specular_color: RgbF,

    use_mesh_material: bool,
    material: Material,
}

impl<'a, C: Color, const LX: usize, const LY: usize> Default for Renderer<'a, C, LX, LY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, C: Color, const LX: usize, const LY: usize> Renderer<'a, C, LX, LY> {
    /// A renderer with no buffers bound and sensible scene defaults:
    /// perspective projection (45 degree fov, 4:3, z in 1..1000), identity
    /// view and model matrices, a white light shining from the
    /// right/above/front, mesh materials in effect.
    pub fn new() -> Self {
        Self {
            image: None,
            zbuffer: None,
            depth_test: false,
            projection: Projection::Perspective,
            backface_culling: true,
            offset: (0, 0),
            proj: Mat4::perspective(45.0, 1.5, 1.0, 1000.0),
            view: Mat4::identity(),
            model: Mat4::identity(),
            light_dir: Vec3::new(-1.0, -1.0, -1.0),
            ambient_color: RgbF::WHITE,
            diffuse_color: RgbF::WHITE,
            specular_color: RgbF::WHITE,
            use_mesh_material: true,
            material: Material::default(),
        }
    }

    /// Bind the image that will be drawn onto. It may be smaller than the
    /// viewport; see [`Renderer::set_offset`].
    pub fn set_image(&mut self, image: ImageViewMut<'a, C>) {
        self.image = Some(image);
    }

    /// Position of the image's upper-left corner inside the viewport
    /// (clamped to `[0, 2048]` per axis).
    ///
    /// Rendering the viewport through a smaller image several times with a
    /// different offset each time draws the full frame tile by tile; clear
    /// the depth buffer between tiles.
    pub fn set_offset(&mut self, ox: i32, oy: i32) {
        self.offset = (ox.clamp(0, MAX_OFFSET), oy.clamp(0, MAX_OFFSET));
    }

    /// Bind the depth buffer and enable depth testing. The buffer must hold
    /// at least `LX * LY` entries (more if the bound image is larger than
    /// the viewport).
    pub fn set_depth_buffer(&mut self, zbuffer: &'a mut [f32]) {
        self.zbuffer = Some(zbuffer);
        self.depth_test = true;
    }

    /// Toggle depth testing without rebinding the buffer.
    pub fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    /// Clear the depth buffer for a new frame. Stored values compare as
    /// "greater is closer", so far away is 0.
    pub fn clear_depth(&mut self) {
        if let Some(z) = self.zbuffer.as_deref_mut() {
            z.fill(0.0);
        }
    }

    /// Toggle back-face culling (on by default). Mesh winding must be
    /// consistent for this to be meaningful.
    pub fn set_backface_culling(&mut self, enabled: bool) {
        self.backface_culling = enabled;
    }

    /// Select the projection mode without touching the matrix.
    pub fn set_projection_mode(&mut self, projection: Projection) {
        self.projection = projection;
    }

    pub fn projection_mode(&self) -> Projection {
        self.projection
    }

    pub fn set_projection_matrix(&mut self, m: Mat4) {
        self.proj = m;
    }

    pub fn projection_matrix_mut(&mut self) -> &mut Mat4 {
        &mut self.proj
    }

    /// Perspective projection from a vertical field of view in degrees;
    /// switches to perspective mode.
    pub fn set_perspective(&mut self, fovy_deg: f32, aspect: f32, near: f32, far: f32) {
        self.proj = Mat4::perspective(fovy_deg, aspect, near, far);
        self.projection = Projection::Perspective;
    }

    /// Perspective projection from clipping-plane coordinates; switches to
    /// perspective mode.
    pub fn set_frustum(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.proj = Mat4::frustum(left, right, bottom, top, near, far);
        self.projection = Projection::Perspective;
    }

    /// Orthographic projection; switches to orthographic mode.
    pub fn set_ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.proj = Mat4::ortho(left, right, bottom, top, near, far);
        self.projection = Projection::Orthographic;
    }

    pub fn set_view_matrix(&mut self, m: Mat4) {
        self.view = m;
    }

    pub fn view_matrix_mut(&mut self) -> &mut Mat4 {
        &mut self.view
    }

    /// Place the camera at `eye` looking toward `center`.
    pub fn set_look_at(&mut self, eye: Vec3, center: Vec3, up: Vec3) {
        self.view = Mat4::look_at(eye, center, up);
    }

    pub fn set_model_matrix(&mut self, m: Mat4) {
        self.model = m;
    }

    pub fn model_matrix_mut(&mut self) -> &mut Mat4 {
        &mut self.model
    }

    /// Direction the light shines toward, in world coordinates.
    pub fn set_light_direction(&mut self, direction: Vec3) {
        self.light_dir = direction;
    }

    pub fn set_light_ambient(&mut self, color: RgbF) {
        self.ambient_color = color;
    }

    pub fn set_light_diffuse(&mut self, color: RgbF) {
        self.diffuse_color = color;
    }

    pub fn set_light_specular(&mut self, color: RgbF) {
        self.specular_color = color;
    }

    /// Set the whole light source at once.
    pub fn set_light(&mut self, direction: Vec3, ambient: RgbF, diffuse: RgbF, specular: RgbF) {
        self.light_dir = direction;
        self.ambient_color = ambient;
        self.diffuse_color = diffuse;
        self.specular_color = specular;
    }

    /// When true (the default), each mesh's own material is used; otherwise
    /// the override set with [`Renderer::set_material`] applies to every
    /// mesh.
    pub fn use_mesh_material(&mut self, use_mesh: bool) {
        self.use_mesh_material = use_mesh;
    }

    /// Material override, effective after `use_mesh_material(false)`.
    pub fn set_material(&mut self, material: Material) {
        self.material = material;
    }

    /// Transform, light, cull and rasterize every triangle of `mesh` (and
    /// of the meshes chained behind it when `follow_chain` is set) into the
    /// bound image.
    ///
    /// Shader features the mesh cannot provide degrade silently: `GOURAUD`
    /// needs normals, `TEXTURE` needs texture coordinates and a texture
    /// image. Misconfiguration is reported before anything is drawn.
    pub fn draw(
        &mut self,
        shader: Shader,
        mesh: &Mesh<'_, C>,
        follow_chain: bool,
    ) -> Result<(), DrawError> {
        let extent = match &self.image {
            Some(img) if img.is_valid() => {
                ((img.height() - 1) * img.stride() + img.width()) as usize
            }
            _ => return Err(DrawError::NoImage),
        };
        if self.depth_test {
            let needed = (LX * LY).max(extent);
            match &self.zbuffer {
                Some(z) if z.len() >= needed => {}
                _ => return Err(DrawError::DepthBuffer),
            }
        }
        // validate the whole chain before touching any pixel
        let mut walk = Some(mesh);
        while let Some(m) = walk {
            if m.vertices.is_empty() {
                return Err(DrawError::EmptyMesh);
            }
            walk = if follow_chain { m.next } else { None };
        }

        let mut current = Some(mesh);
        while let Some(m) = current {
            let mut effective = shader;
            if effective.contains(Shader::GOURAUD)
                && m.normals.map_or(true, |n| n.is_empty())
            {
                debug!("mesh has no normals; falling back to flat shading");
                effective.remove(Shader::GOURAUD);
            }
            if effective.contains(Shader::TEXTURE)
                && (m.texcoords.map_or(true, |t| t.is_empty())
                    || !m.texture.map_or(false, |t| t.is_valid()))
            {
                debug!("mesh has no texture data; disabling texturing");
                effective.remove(Shader::TEXTURE);
            }
            self.draw_mesh(effective, m);
            current = if follow_chain { m.next } else { None };
        }
        Ok(())
    }

    /// The vertex stage: everything between the face stream and the
    /// rasterizer, for one mesh.
    fn draw_mesh(&mut self, shader: Shader, mesh: &Mesh<'_, C>) {
        let gouraud = shader.contains(Shader::GOURAUD);
        let textured = shader.contains(Shader::TEXTURE);
        let ortho = self.projection == Projection::Orthographic;
        let (ox, oy) = self.offset;

        // screen y grows downward: bake the flip into the projection
        let mut proj = self.proj;
        proj.invert_y_axis();
        let model_view = self.view * self.model;
        let pm = proj * model_view;

        let (img_w, img_h) = {
            let Some(img) = self.image.as_ref() else { return };
            (img.width(), img.height())
        };

        // NDC bounds of the image rectangle, one pixel of slack
        let ilx = 2.0 / LX as f32;
        let ily = 2.0 / LY as f32;
        let bounds = [
            (ox - 1) as f32 * ilx - 1.0,
            (ox + img_w + 1) as f32 * ilx - 1.0,
            (oy - 1) as f32 * ily - 1.0,
            (oy + img_h + 1) as f32 * ily - 1.0,
        ];
        if discard_box(&mesh.bounding_box, &pm, ortho, &bounds) {
            debug!("mesh bounding box outside the view, mesh skipped");
            return;
        }

        // if the whole bounding box projects into the safe sub-pixel range,
        // the per-triangle clip test can be skipped
        let clip_bound = (2048 / LX.max(LY)) as f32;
        let clip_test_needed =
            clip_test_needed(clip_bound, &mesh.bounding_box, &pm, ortho);

        // light direction in eye space; stored as "shines toward", the
        // shading formulas want "toward the light"
        let light = -self.view.mult0(self.light_dir).normalize();
        // cheap renormalization factor for transformed normals (exact for
        // uniform scaling)
        let inorm = 1.0 / model_view.mult0(Vec3::new(0.0, 0.0, 1.0)).magnitude();

        let material = if self.use_mesh_material {
            mesh.material
        } else {
            self.material
        };
        let ctx = LightContext::new(
            &material,
            self.ambient_color,
            self.diffuse_color,
            self.specular_color,
            light,
            textured,
        );

        let vertices = mesh.vertices;
        let normals = mesh.normals.unwrap_or(&[]);
        let texcoords = mesh.texcoords.unwrap_or(&[]);
        // the stream layout depends on which arrays the mesh declares, not
        // on the active shader
        let mut cursor = FaceCursor::new(
            mesh.faces,
            mesh.texcoords.is_some(),
            mesh.normals.is_some(),
        );

        let Some(img) = self.image.as_mut() else { return };

        trace!(
            "draw_mesh: shader={:?} ortho={} cliptest={} offset=({},{})",
            shader,
            ortho,
            clip_test_needed,
            ox,
            oy
        );

        let mut slots = [PipelineVertex::default(); 3];

        while let Some(chain_len) = cursor.next_chain() {
            // bootstrap triangle of the chain
            let (Some((e0, _)), Some((e1, _)), Some((e2, _))) = (
                cursor.next_element(),
                cursor.next_element(),
                cursor.next_element(),
            ) else {
                return;
            };
            slots[0] = PipelineVertex::load(&model_view, vertices, e0.vertex, e0.texcoord, e0.normal);
            slots[1] = PipelineVertex::load(&model_view, vertices, e1.vertex, e1.texcoord, e1.normal);
            slots[2] = PipelineVertex::load(&model_view, vertices, e2.vertex, e2.texcoord, e2.normal);
            let (mut i0, mut i1, mut i2) = (0usize, 1usize, 2usize);

            let mut remaining = chain_len;
            loop {
                'triangle: {
                    let p0 = slots[i0].view_pos.xyz();
                    let p1 = slots[i1].view_pos.xyz();
                    let p2 = slots[i2].view_pos.xyz();
                    let face_normal = (p1 - p0).cross(p2 - p0);
                    let cull = if ortho {
                        face_normal.dot(Vec3::new(0.0, 0.0, -1.0))
                    } else {
                        face_normal.dot(p0)
                    };
                    if self.backface_culling && cull > 0.0 {
                        break 'triangle;
                    }

                    // project the vertices not inherited from the previous
                    // strip triangle
                    let mut needs_clip = false;
                    for i in [i2, i0, i1] {
                        if slots[i].stale {
                            let s = project_vertex(&proj, slots[i].view_pos, ortho);
                            slots[i].raster.pos = s;
                            if clip_test_needed {
                                needs_clip |= slots[i].view_pos.z >= 0.0
                                    || s.x < -clip_bound
                                    || s.x > clip_bound
                                    || s.y < -clip_bound
                                    || s.y > clip_bound
                                    || s.z < -1.0
                                    || s.z > 1.0;
                            }
                        }
                    }
                    // a triangle that would need frustum clipping is dropped
                    // whole rather than clipped and re-tessellated
                    if needs_clip {
                        break 'triangle;
                    }

                    let mut face_color = RgbF::WHITE;
                    if gouraud {
                        for i in [i0, i1, i2] {
                            if slots[i].stale {
                                let n = model_view.mult0(fetch3(normals, slots[i].normal_idx));
                                slots[i].raster.color = ctx.shade(n, inorm);
                            }
                        }
                    } else {
                        face_color = ctx.shade(face_normal.normalize(), 1.0);
                    }

                    if textured {
                        for i in [i0, i1, i2] {
                            if slots[i].stale {
                                slots[i].raster.tex = fetch2(texcoords, slots[i].tex_idx);
                            }
                        }
                    }

                    slots[i0].stale = false;
                    slots[i1].stale = false;
                    slots[i2].stale = false;

                    let uniforms = Uniforms {
                        face_color,
                        depth: if self.depth_test {
                            self.zbuffer.as_deref_mut()
                        } else {
                            None
                        },
                        texture: if textured { mesh.texture } else { None },
                    };
                    rasterize_triangle::<C, LX, LY>(
                        img,
                        shader,
                        self.projection,
                        &slots[i0].raster,
                        &slots[i1].raster,
                        &slots[i2].raster,
                        ox,
                        oy,
                        uniforms,
                    );
                }

                remaining -= 1;
                if remaining == 0 {
                    break;
                }

                // strip continuation: the direction bit selects which of the
                // two shared vertices keeps its slot
                let Some((e, dbit)) = cursor.next_element() else {
                    return;
                };
                if dbit {
                    std::mem::swap(&mut i0, &mut i2);
                } else {
                    std::mem::swap(&mut i1, &mut i2);
                }
                slots[i2] =
                    PipelineVertex::load(&model_view, vertices, e.vertex, e.texcoord, e.normal);
            }
        }
    }
}

/// A vertex travelling through the strip cache. `stale` marks attributes
/// (projection, lighting, texcoords) not yet computed for the current mesh;
/// vertices shared with the previous strip triangle keep theirs.
#[derive(Clone, Copy, Debug, Default)]
struct PipelineVertex {
    view_pos: Vec4,
    raster: RasterVertex,
    stale: bool,
    normal_idx: u16,
    tex_idx: u16,
}

impl PipelineVertex {
    #[inline]
    fn load(model_view: &Mat4, vertices: &[Vec3], vertex: u16, tex_idx: u16, normal_idx: u16) -> Self {
        PipelineVertex {
            view_pos: model_view.mult1(fetch3(vertices, vertex)),
            raster: RasterVertex::default(),
            stale: true,
            normal_idx,
            tex_idx,
        }
    }
}

/// Out-of-range indices in a malformed face stream read as zero vectors
/// (rendering output is unspecified, memory stays safe).
#[inline]
fn fetch3(arr: &[Vec3], idx: u16) -> Vec3 {
    arr.get(idx as usize).copied().unwrap_or_default()
}

#[inline]
fn fetch2(arr: &[Vec2], idx: u16) -> Vec2 {
    arr.get(idx as usize).copied().unwrap_or_default()
}

/// Projection of an eye-space position. Perspective replaces `w` by `1/w`
/// alongside the division; orthographic sets `w = 2 - z`. Both make `w`
/// grow toward the camera, which is what the depth test expects.
#[inline]
fn project_vertex(proj: &Mat4, view_pos: Vec4, ortho: bool) -> Vec4 {
    let mut s = *proj * view_pos;
    if ortho {
        s.w = 2.0 - s.z;
    } else {
        s.zdivide();
    }
    s
}

/// Test one bounding-box corner against the six frustum planes of the image
/// rectangle, clearing the mask bit of every plane the corner is inside of.
fn clip_corner(flags: &mut u32, p: Vec3, pm: &Mat4, ortho: bool, bounds: &[f32; 4]) {
    let mut s = pm.mult1(p);
    if !ortho {
        s.zdivide();
        if s.w <= 0.0 {
            s.z = -2.0;
        }
    }
    if s.x >= bounds[0] {
        *flags &= !1;
    }
    if s.x <= bounds[1] {
        *flags &= !2;
    }
    if s.y >= bounds[2] {
        *flags &= !4;
    }
    if s.y <= bounds[3] {
        *flags &= !8;
    }
    if s.z >= -1.0 {
        *flags &= !16;
    }
    if s.z <= 1.0 {
        *flags &= !32;
    }
}

/// A mesh is discarded when all eight corners of its bounding box lie
/// strictly outside the same frustum plane. The zero box means "no box
/// computed" and never discards.
fn discard_box(bb: &Box3, pm: &Mat4, ortho: bool, bounds: &[f32; 4]) -> bool {
    if bb.is_zero() {
        return false;
    }
    let mut flags = 63u32;
    for corner in bb.corners() {
        clip_corner(&mut flags, corner, pm, ortho, bounds);
        if flags == 0 {
            return false;
        }
    }
    true
}

fn corner_outside(bound: f32, p: Vec3, pm: &Mat4, ortho: bool) -> bool {
    let mut s = pm.mult1(p);
    if !ortho {
        s.zdivide();
        if s.w <= 0.0 {
            s.z = -2.0;
        }
    }
    s.x <= -bound || s.x >= bound || s.y <= -bound || s.y >= bound || s.z <= -1.0 || s.z >= 1.0
}

/// Whether any corner of the bounding box projects outside the safe
/// sub-pixel coordinate range, in which case every triangle must be
/// clip-tested individually.
fn clip_test_needed(bound: f32, bb: &Box3, pm: &Mat4, ortho: bool) -> bool {
    bb.corners()
        .iter()
        .any(|c| corner_outside(bound, *c, pm, ortho))
}

/// Precomputed per-mesh lighting state for the Phong model.
struct LightContext {
    ambient: RgbF,
    diffuse: RgbF,
    specular: RgbF,
    object: RgbF,
    exponent: i32,
    pow_tab: [f32; POW_TABLE_LEN],
    pow_factor: f32,
    light: Vec3,
    /// Halfway vector with the view direction taken as (0, 0, 1) instead of
    /// the per-vertex direction. Faster, near-identical highlights.
    half: Vec3,
    textured: bool,
}

impl LightContext {
    fn new(
        material: &Material,
        ambient_light: RgbF,
        diffuse_light: RgbF,
        specular_light: RgbF,
        light: Vec3,
        textured: bool,
    ) -> Self {
        let exponent = material.specular_exponent;
        let mut pow_tab = [0.0f32; POW_TABLE_LEN];
        let mut pow_factor = 0.0;
        if exponent > 0 {
            let se = exponent as f32;
            let bbsp = se.min(8.0);
            pow_factor = se * POW_TABLE_LEN as f32 / bbsp;
            for (k, slot) in pow_tab.iter_mut().enumerate() {
                let v = 1.0 - (bbsp * k as f32) / (se * POW_TABLE_LEN as f32);
                *slot = v.powf(se);
            }
        }
        Self {
            ambient: ambient_light * material.ambient_strength,
            diffuse: diffuse_light * material.diffuse_strength,
            specular: specular_light * material.specular_strength,
            object: material.color,
            exponent,
            pow_tab,
            pow_factor,
            light,
            half: (light + Vec3::new(0.0, 0.0, 1.0)).normalize(),
            textured,
        }
    }

    /// `x^exponent` by linear interpolation in the precomputed table. The
    /// shape differs slightly from an exact `powf`; the highlight falloff is
    /// defined in terms of this approximation.
    fn fast_pow(&self, x: f32) -> f32 {
        let indf = (1.0 - x) * self.pow_factor;
        let indi = (indf as i32).max(0);
        if indi >= POW_TABLE_LEN as i32 - 1 {
            return 0.0;
        }
        let i = indi as usize;
        self.pow_tab[i] + (indf - indi as f32) * (self.pow_tab[i + 1] - self.pow_tab[i])
    }

    /// Phong shading of one normal. `scale` renormalizes the transformed
    /// normal: 1 for unit face normals, the model-view `inorm` factor for
    /// vertex normals straight out of the matrix multiply.
    fn shade(&self, n: Vec3, scale: f32) -> RgbF {
        let mut col = self.ambient;
        let a = (n.dot(self.light) * scale).max(0.0);
        col += self.diffuse * a;
        if self.exponent > 0 {
            let b = self.fast_pow(n.dot(self.half) * scale);
            col += self.specular * b;
        }
        if !self.textured {
            col = col * self.object;
        }
        col.clamp01();
        col
    }
}
