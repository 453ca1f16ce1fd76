//! `rastly` — an embedded-grade software 3D renderer drawing into
//! caller-supplied pixel buffers.
//!
//! The crate never allocates: images, depth buffers, meshes and textures are
//! all borrowed views over memory the caller owns, which makes it usable on
//! microcontrollers and small SoCs with a framebuffer (or a fraction of one)
//! to spare.
//!
//! The core is a sub-pixel-accurate triangle [rasterizer](render::rasterizer)
//! (fixed-point edge functions, top-left fill rule, optional depth testing,
//! flat/Gouraud shading and perspective-correct texture mapping) driven by a
//! [`Renderer`] that handles vertex transformation, Phong lighting,
//! back-face culling, frustum rejection and decoding of compact triangle-
//! strip face streams.
//!
//! ```
//! use rastly::{ImageViewMut, Mesh, Renderer, Rgb565, Shader};
//! use rastly::math::Vec3;
//!
//! // a 64x48 framebuffer owned by the caller
//! let mut pixels = [Rgb565::default(); 64 * 48];
//! let image = ImageViewMut::new(&mut pixels, 64, 48);
//!
//! let vertices = [
//!     Vec3::new(-1.0, -1.0, -2.0),
//!     Vec3::new(1.0, -1.0, -2.0),
//!     Vec3::new(0.0, 1.0, -2.0),
//! ];
//! let faces = [1, 0, 1, 2, 0]; // one chain of one triangle
//! let mesh = Mesh::new(&vertices, &faces);
//!
//! let mut renderer: Renderer<'_, Rgb565, 64, 48> = Renderer::new();
//! renderer.set_image(image);
//! renderer.set_perspective(45.0, 64.0 / 48.0, 1.0, 100.0);
//! renderer.draw(Shader::FLAT, &mesh, true).unwrap();
//! ```

pub mod color;
pub mod image;
pub mod math;
pub mod mesh;
pub mod render;

// Re-export commonly needed types at crate root for convenience
pub use color::{Color, Rgb565, Rgb888, RgbF, Rgba16, Rgba8888};
pub use image::{Box2, ImageView, ImageViewMut};
pub use mesh::{Box3, FaceTriangles, FaceVertex, Material, Mesh};
pub use render::rasterizer::{rasterize_triangle, RasterVertex, Shader, Uniforms};
pub use render::{DrawError, Projection, Renderer};
