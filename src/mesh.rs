//! Read-only mesh description and the compact face-stream decoder.
//!
//! A mesh references caller-owned arrays (vertices, optional normals and
//! texture coordinates) plus a face stream: a `u16` array laid out as chains
//! of triangles. Each chain starts with its triangle count, followed by
//! `count + 2` elements; a zero count terminates the stream. An element is
//! 1, 2 or 3 words, depending on whether the mesh carries texture
//! coordinates and normals:
//!
//! ```text
//! [DBIT | vertex index]  [texcoord index]  [normal index]
//!   1bit    15 bits         (if present)      (if present)
//! ```
//!
//! The first three elements of a chain form the bootstrap triangle (their
//! direction bits are ignored). Each following element extends the strip:
//! with the current triangle `(V0, V1, V2)` and new element `Vnew`,
//!
//! - `DBIT = 0` gives `(V0, V2, Vnew)`,
//! - `DBIT = 1` gives `(V2, V1, Vnew)`,
//!
//! which preserves winding order across the strip.

use crate::color::{Color, RgbF};
use crate::image::ImageView;
use crate::math::{Vec2, Vec3};

/// Vertex indices use 15 bits; the high bit of the first element word is the
/// strip direction bit.
pub const DIRECTION_BIT: u16 = 0x8000;

/// Maximum number of addressable vertices (15-bit index space).
pub const MAX_VERTICES: usize = 32767;

/// Surface reflection parameters under the Phong model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    /// Object color, used when texturing is disabled.
    pub color: RgbF,
    pub ambient_strength: f32,
    pub diffuse_strength: f32,
    pub specular_strength: f32,
    /// Specular exponent; 0 disables the specular term entirely.
    pub specular_exponent: i32,
}

impl Default for Material {
    fn default() -> Self {
        // silver-ish with mild highlights
        Material {
            color: RgbF::new(0.75, 0.75, 0.75),
            ambient_strength: 0.15,
            diffuse_strength: 0.7,
            specular_strength: 0.5,
            specular_exponent: 16,
        }
    }
}

/// Float axis-aligned bounding box.
///
/// The all-zero box means "not computed" and disables whole-mesh frustum
/// discarding.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Box3 {
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
    pub zmin: f32,
    pub zmax: f32,
}

impl Box3 {
    pub const fn new(xmin: f32, xmax: f32, ymin: f32, ymax: f32, zmin: f32, zmax: f32) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
            zmin,
            zmax,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Box3::default()
    }

    /// The eight corner points.
    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.xmin, self.ymin, self.zmin),
            Vec3::new(self.xmin, self.ymin, self.zmax),
            Vec3::new(self.xmin, self.ymax, self.zmin),
            Vec3::new(self.xmin, self.ymax, self.zmax),
            Vec3::new(self.xmax, self.ymin, self.zmin),
            Vec3::new(self.xmax, self.ymin, self.zmax),
            Vec3::new(self.xmax, self.ymax, self.zmin),
            Vec3::new(self.xmax, self.ymax, self.zmax),
        ]
    }
}

/// A mesh borrowed from caller-owned storage.
///
/// Meshes can be chained through [`Mesh::next`] for multi-part models; the
/// renderer follows the chain when asked to.
#[derive(Clone, Copy, Debug)]
pub struct Mesh<'a, C: Color> {
    pub vertices: &'a [Vec3],
    pub normals: Option<&'a [Vec3]>,
    pub texcoords: Option<&'a [Vec2]>,
    /// Face stream in the wire format described in the module docs.
    pub faces: &'a [u16],
    pub texture: Option<ImageView<'a, C>>,
    pub material: Material,
    pub bounding_box: Box3,
    pub next: Option<&'a Mesh<'a, C>>,
}

impl<'a, C: Color> Mesh<'a, C> {
    pub fn new(vertices: &'a [Vec3], faces: &'a [u16]) -> Self {
        Self {
            vertices,
            normals: None,
            texcoords: None,
            faces,
            texture: None,
            material: Material::default(),
            bounding_box: Box3::default(),
            next: None,
        }
    }

    /// Iterate the decoded triangles of the face stream.
    pub fn face_triangles(&self) -> FaceTriangles<'a> {
        FaceTriangles::new(
            self.faces,
            self.texcoords.is_some(),
            self.normals.is_some(),
        )
    }
}

/// One decoded face-stream element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaceVertex {
    pub vertex: u16,
    pub texcoord: u16,
    pub normal: u16,
}

/// Element-level cursor over a face stream.
///
/// All reads are bounds-checked: a truncated stream (missing words or a
/// missing terminator) ends the iteration instead of reading out of range.
#[derive(Clone, Debug)]
pub(crate) struct FaceCursor<'a> {
    words: &'a [u16],
    pos: usize,
    has_texcoords: bool,
    has_normals: bool,
}

impl<'a> FaceCursor<'a> {
    pub(crate) fn new(words: &'a [u16], has_texcoords: bool, has_normals: bool) -> Self {
        Self {
            words,
            pos: 0,
            has_texcoords,
            has_normals,
        }
    }

    #[inline]
    fn word(&mut self) -> Option<u16> {
        let w = self.words.get(self.pos).copied();
        self.pos += 1;
        w
    }

    /// Length of the next chain, or `None` at the terminator (or if the
    /// stream ran out of words).
    pub(crate) fn next_chain(&mut self) -> Option<usize> {
        match self.word() {
            None | Some(0) => None,
            Some(n) => Some(n as usize),
        }
    }

    /// Next element of the current chain; the direction bit is split off the
    /// vertex index.
    pub(crate) fn next_element(&mut self) -> Option<(FaceVertex, bool)> {
        let w = self.word()?;
        let texcoord = if self.has_texcoords { self.word()? } else { 0 };
        let normal = if self.has_normals { self.word()? } else { 0 };
        Some((
            FaceVertex {
                vertex: w & !DIRECTION_BIT,
                texcoord,
                normal,
            },
            w & DIRECTION_BIT != 0,
        ))
    }
}

/// Iterator over the triangles encoded in a face stream.
#[derive(Clone, Debug)]
pub struct FaceTriangles<'a> {
    cursor: FaceCursor<'a>,
    slots: [FaceVertex; 3],
    remaining: usize,
}

impl<'a> FaceTriangles<'a> {
    pub fn new(words: &'a [u16], has_texcoords: bool, has_normals: bool) -> Self {
        Self {
            cursor: FaceCursor::new(words, has_texcoords, has_normals),
            slots: [FaceVertex::default(); 3],
            remaining: 0,
        }
    }
}

impl Iterator for FaceTriangles<'_> {
    type Item = [FaceVertex; 3];

    fn next(&mut self) -> Option<[FaceVertex; 3]> {
        if self.remaining == 0 {
            self.remaining = self.cursor.next_chain()?;
            // bootstrap triangle: direction bits ignored
            let (v0, _) = self.cursor.next_element()?;
            let (v1, _) = self.cursor.next_element()?;
            let (v2, _) = self.cursor.next_element()?;
            self.slots = [v0, v1, v2];
        } else {
            let (vnew, dbit) = self.cursor.next_element()?;
            if dbit {
                self.slots = [self.slots[2], self.slots[1], vnew];
            } else {
                self.slots = [self.slots[0], self.slots[2], vnew];
            }
        }
        self.remaining -= 1;
        Some(self.slots)
    }
}
